// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Hand-written recursive descent parser for rate expressions.
//!
//! Produces [`ast::Expr`] trees; identifier resolution and builtin
//! typing happen later in the compiler.  The grammar is deliberately
//! small: arithmetic, comparisons, boolean operators, if-then-else,
//! and calls to the allow-listed builtins.

use crate::ast::{BinaryOp, Expr, UnaryOp};
use crate::builtins::{Loc, UntypedBuiltinFn};
use crate::common::{ErrorCode, ExpressionError};
use crate::token::{Lexer, Spanned, Token};

/// TokenKind discriminant for efficient peek comparisons without payload matching
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TokenKind {
    If,
    Then,
    Else,
    Eq,
    Neq,
    Not,
    Mod,
    Exp,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    Plus,
    Minus,
    Mul,
    Div,
    LParen,
    RParen,
    Comma,
    Ident,
    Num,
}

impl<'a> From<&Token<'a>> for TokenKind {
    fn from(token: &Token<'a>) -> Self {
        match token {
            Token::If => TokenKind::If,
            Token::Then => TokenKind::Then,
            Token::Else => TokenKind::Else,
            Token::Eq => TokenKind::Eq,
            Token::Neq => TokenKind::Neq,
            Token::Not => TokenKind::Not,
            Token::Mod => TokenKind::Mod,
            Token::Exp => TokenKind::Exp,
            Token::Lt => TokenKind::Lt,
            Token::Lte => TokenKind::Lte,
            Token::Gt => TokenKind::Gt,
            Token::Gte => TokenKind::Gte,
            Token::And => TokenKind::And,
            Token::Or => TokenKind::Or,
            Token::Plus => TokenKind::Plus,
            Token::Minus => TokenKind::Minus,
            Token::Mul => TokenKind::Mul,
            Token::Div => TokenKind::Div,
            Token::LParen => TokenKind::LParen,
            Token::RParen => TokenKind::RParen,
            Token::Comma => TokenKind::Comma,
            Token::Ident(_) => TokenKind::Ident,
            Token::Num(_) => TokenKind::Num,
        }
    }
}

/// Parser state holding tokenized input
struct Parser<'input> {
    tokens: Vec<Spanned<Token<'input>>>,
    pos: usize,
}

impl<'input> Parser<'input> {
    /// Create a new parser from a lexer, collecting all tokens up front.
    /// Returns an error if the lexer produces any errors.
    fn new(lexer: Lexer<'input>) -> Result<Self, ExpressionError> {
        let mut tokens = Vec::new();
        for result in lexer {
            match result {
                Ok(tok) => tokens.push(tok),
                Err(e) => return Err(e),
            }
        }
        Ok(Parser { tokens, pos: 0 })
    }

    /// Peek at the current token without consuming it
    fn peek(&self) -> Option<&Spanned<Token<'input>>> {
        self.tokens.get(self.pos)
    }

    /// Peek at the kind of the current token
    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|(_, tok, _)| TokenKind::from(tok))
    }

    /// Advance to the next token and return the consumed token
    fn advance(&mut self) -> Option<&Spanned<Token<'input>>> {
        if self.pos < self.tokens.len() {
            let tok = &self.tokens[self.pos];
            self.pos += 1;
            Some(tok)
        } else {
            None
        }
    }

    /// Expect the current token to match the expected kind, returning an error if not
    fn expect(&mut self, expected: TokenKind) -> Result<&Spanned<Token<'input>>, ExpressionError> {
        if self.peek_kind() == Some(expected) {
            Ok(self.advance().unwrap())
        } else if let Some((start, _, end)) = self.peek() {
            Err(ExpressionError {
                start: *start as u16,
                end: *end as u16,
                code: ErrorCode::UnrecognizedToken,
            })
        } else {
            let pos = self.eof_position();
            Err(ExpressionError {
                start: pos as u16,
                end: (pos + 1) as u16,
                code: ErrorCode::UnrecognizedEof,
            })
        }
    }

    /// Get the position for EOF errors
    fn eof_position(&self) -> usize {
        if let Some((_, _, end)) = self.tokens.last() {
            *end
        } else {
            0
        }
    }

    /// Check if we've consumed all tokens
    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Parse a rate expression from the token stream.
    /// Returns Ok(None) for empty input.
    fn parse_rate(&mut self) -> Result<Option<Expr>, ExpressionError> {
        if self.is_at_end() {
            return Ok(None);
        }

        let expr = self.parse_expr()?;

        // anything left over is a hard error, not a prefix parse
        if let Some((start, _, end)) = self.peek() {
            return Err(ExpressionError {
                start: *start as u16,
                end: *end as u16,
                code: ErrorCode::ExtraToken,
            });
        }

        Ok(Some(expr))
    }

    /// Parse a top-level expression (includes if-then-else)
    fn parse_expr(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek_kind() == Some(TokenKind::If) {
            self.parse_if()
        } else {
            self.parse_logical()
        }
    }

    /// Parse if-then-else expression
    fn parse_if(&mut self) -> Result<Expr, ExpressionError> {
        let (lpos, _, _) = *self.expect(TokenKind::If)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::Then)?;
        let then_expr = self.parse_expr()?;
        self.expect(TokenKind::Else)?;
        let else_expr = self.parse_expr()?;
        let rpos = else_expr.get_loc().end as usize;
        Ok(Expr::If(
            Box::new(cond),
            Box::new(then_expr),
            Box::new(else_expr),
            Loc::new(lpos, rpos),
        ))
    }

    /// Parse logical operators (&&, ||, and, or) - lowest precedence binary ops
    fn parse_logical(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_equality()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::And) => BinaryOp::And,
                Some(TokenKind::Or) => BinaryOp::Or,
                _ => break,
            };
            self.advance();
            let right = self.parse_equality()?;
            let loc = Loc::new(left.get_loc().start as usize, right.get_loc().end as usize);
            left = Expr::Op2(op, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    /// Parse equality operators (=, <>, !=)
    fn parse_equality(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_comparison()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Eq) => BinaryOp::Eq,
                Some(TokenKind::Neq) => BinaryOp::Neq,
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            let loc = Loc::new(left.get_loc().start as usize, right.get_loc().end as usize);
            left = Expr::Op2(op, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    /// Parse comparison operators (<, <=, >, >=)
    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_additive()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Lt) => BinaryOp::Lt,
                Some(TokenKind::Lte) => BinaryOp::Lte,
                Some(TokenKind::Gt) => BinaryOp::Gt,
                Some(TokenKind::Gte) => BinaryOp::Gte,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            let loc = Loc::new(left.get_loc().start as usize, right.get_loc().end as usize);
            left = Expr::Op2(op, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    /// Parse additive operators (+, -)
    fn parse_additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            let loc = Loc::new(left.get_loc().start as usize, right.get_loc().end as usize);
            left = Expr::Op2(op, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    /// Parse multiplicative operators (*, /, mod)
    fn parse_multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Mul) => BinaryOp::Mul,
                Some(TokenKind::Div) => BinaryOp::Div,
                Some(TokenKind::Mod) => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            let loc = Loc::new(left.get_loc().start as usize, right.get_loc().end as usize);
            left = Expr::Op2(op, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    /// Parse unary operators (+, -, not)
    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Plus) => UnaryOp::Positive,
            Some(TokenKind::Minus) => UnaryOp::Negative,
            Some(TokenKind::Not) => UnaryOp::Not,
            _ => return self.parse_exponentiation(),
        };
        let (lpos, _, _) = *self.advance().unwrap();
        let operand = self.parse_unary()?;
        let rpos = operand.get_loc().end as usize;
        Ok(Expr::Op1(op, Box::new(operand), Loc::new(lpos, rpos)))
    }

    /// Parse exponentiation operator (^ or **) - left associative
    fn parse_exponentiation(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_app()?;

        while self.peek_kind() == Some(TokenKind::Exp) {
            self.advance();
            let right = self.parse_app()?;
            let loc = Loc::new(left.get_loc().start as usize, right.get_loc().end as usize);
            left = Expr::Op2(BinaryOp::Exp, Box::new(left), Box::new(right), loc);
        }

        Ok(left)
    }

    /// Parse function application: id(args)
    fn parse_app(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek_kind() == Some(TokenKind::Ident)
            && self.pos + 1 < self.tokens.len()
            && TokenKind::from(&self.tokens[self.pos + 1].1) == TokenKind::LParen
        {
            let (lpos, tok, _) = *self.advance().unwrap();
            let name = if let Token::Ident(s) = tok {
                s.to_lowercase()
            } else {
                unreachable!()
            };

            self.advance(); // consume '('
            let args = self.parse_comma_separated_exprs()?;
            let (_, _, rpos) = *self.expect(TokenKind::RParen)?;

            return Ok(Expr::App(
                UntypedBuiltinFn(name, args),
                Loc::new(lpos, rpos),
            ));
        }

        self.parse_atom()
    }

    /// Parse an atomic expression (number, identifier, parenthesized expression)
    fn parse_atom(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek_kind() {
            Some(TokenKind::Num) => {
                let (lpos, tok, rpos) = *self.advance().unwrap();
                if let Token::Num(s) = tok {
                    match s.parse::<f64>() {
                        Ok(n) => Ok(Expr::Const(s.to_string(), n, Loc::new(lpos, rpos))),
                        Err(_) => Err(ExpressionError {
                            start: lpos as u16,
                            end: rpos as u16,
                            code: ErrorCode::ExpectedNumber,
                        }),
                    }
                } else {
                    unreachable!()
                }
            }
            Some(TokenKind::Ident) => {
                let (lpos, tok, rpos) = *self.advance().unwrap();
                if let Token::Ident(s) = tok {
                    Ok(Expr::Var(s.to_string(), Loc::new(lpos, rpos)))
                } else {
                    unreachable!()
                }
            }
            Some(TokenKind::LParen) => {
                self.advance(); // consume '('
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            Some(_) => {
                let (start, _, end) = self.peek().unwrap();
                Err(ExpressionError {
                    start: *start as u16,
                    end: *end as u16,
                    code: ErrorCode::UnrecognizedToken,
                })
            }
            None => {
                let pos = self.eof_position();
                Err(ExpressionError {
                    start: pos as u16,
                    end: (pos + 1) as u16,
                    code: ErrorCode::UnrecognizedEof,
                })
            }
        }
    }

    /// Parse comma-separated expressions (for function arguments)
    fn parse_comma_separated_exprs(&mut self) -> Result<Vec<Expr>, ExpressionError> {
        let mut exprs = Vec::new();

        if self.peek_kind() == Some(TokenKind::RParen) {
            return Ok(exprs);
        }

        exprs.push(self.parse_expr()?);

        while self.peek_kind() == Some(TokenKind::Comma) {
            self.advance(); // consume ','

            // trailing comma
            if self.peek_kind() == Some(TokenKind::RParen) {
                break;
            }

            exprs.push(self.parse_expr()?);
        }

        Ok(exprs)
    }
}

/// Parse a rate expression string into an AST.
///
/// Returns:
/// - `Ok(Some(expr))` for valid expressions
/// - `Ok(None)` for empty input
/// - `Err(errors)` for lex or parse errors
pub fn parse(input: &str) -> Result<Option<Expr>, Vec<ExpressionError>> {
    let lexer = Lexer::new(input);
    let mut parser = match Parser::new(lexer) {
        Ok(p) => p,
        Err(e) => return Err(vec![e]),
    };

    parser.parse_rate().map_err(|e| vec![e])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp::*;
    use crate::ast::Expr::*;

    fn parse_ok(input: &str) -> Expr {
        parse(input).unwrap().unwrap().strip_loc()
    }

    fn parse_err(input: &str) -> ExpressionError {
        parse(input).unwrap_err().remove(0)
    }

    fn var(id: &str) -> Box<Expr> {
        Box::new(Var(id.to_string(), Loc::default()))
    }

    fn num(s: &str, n: f64) -> Box<Expr> {
        Box::new(Const(s.to_string(), n, Loc::default()))
    }

    #[test]
    fn parses_simple_rates() {
        assert_eq!(
            Op2(Mul, var("k"), var("S0"), Loc::default()),
            parse_ok("k * S0")
        );
        assert_eq!(
            Op2(
                Div,
                Box::new(Op2(
                    Mul,
                    Box::new(Op2(Mul, var("beta"), var("S"), Loc::default())),
                    var("I"),
                    Loc::default()
                )),
                var("N"),
                Loc::default()
            ),
            parse_ok("beta * S * I / N")
        );
    }

    #[test]
    fn precedence_mul_over_add() {
        assert_eq!(
            Op2(
                Add,
                var("a"),
                Box::new(Op2(Mul, var("b"), var("c"), Loc::default())),
                Loc::default()
            ),
            parse_ok("a + b * c")
        );
    }

    #[test]
    fn exponent_binds_tighter_than_unary_minus() {
        // -x^2 is -(x^2)
        assert_eq!(
            Op1(
                crate::ast::UnaryOp::Negative,
                Box::new(Op2(Exp, var("x"), num("2", 2.0), Loc::default())),
                Loc::default()
            ),
            parse_ok("-x^2")
        );
        assert_eq!(parse_ok("x ** 2"), parse_ok("x ^ 2"));
    }

    #[test]
    fn parses_calls() {
        assert_eq!(
            App(
                UntypedBuiltinFn(
                    "max".to_string(),
                    vec![
                        Const("0".to_string(), 0.0, Loc::default()),
                        Var("x".to_string(), Loc::default()),
                    ]
                ),
                Loc::default()
            ),
            parse_ok("MAX(0, x)")
        );
    }

    #[test]
    fn parses_if_then_else() {
        assert_eq!(
            If(
                Box::new(Op2(Gt, var("S"), num("100", 100.0), Loc::default())),
                var("a"),
                var("b"),
                Loc::default()
            ),
            parse_ok("if S > 100 then a else b")
        );
    }

    #[test]
    fn empty_input_is_none() {
        assert_eq!(None, parse("").unwrap());
        assert_eq!(None, parse("   ").unwrap());
    }

    #[test]
    fn reports_trailing_garbage() {
        let err = parse_err("a + b c");
        assert_eq!(ErrorCode::ExtraToken, err.code);
        assert_eq!(6, err.start);
    }

    #[test]
    fn reports_truncated_input() {
        let err = parse_err("a +");
        assert_eq!(ErrorCode::UnrecognizedEof, err.code);
        let err = parse_err("max(a,");
        assert_eq!(ErrorCode::UnrecognizedEof, err.code);
    }

    #[test]
    fn reports_unclosed_paren() {
        let err = parse_err("(a + b");
        assert_eq!(ErrorCode::UnrecognizedEof, err.code);
    }

    #[test]
    fn locs_track_source_spans() {
        let expr = parse("k * S0").unwrap().unwrap();
        assert_eq!(Loc::new(0, 6), expr.get_loc());
        if let Op2(_, l, r, _) = expr {
            assert_eq!(Loc::new(0, 1), l.get_loc());
            assert_eq!(Loc::new(4, 6), r.get_loc());
        } else {
            panic!("expected Op2");
        }
    }
}
