// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

// derived from the LALRPOP whitespace tokenizer and LALRPOP's
// internal tokenizer

use std::str::CharIndices;

use lazy_static::lazy_static;
use unicode_xid::UnicodeXID;

use self::Token::*;
use crate::common::ErrorCode::*;
use crate::common::{ErrorCode, ExpressionError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token<'input> {
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
    Ident(&'input str),
    Num(&'input str),
}

fn error<T>(code: ErrorCode, start: usize, end: usize) -> Result<T, ExpressionError> {
    Err(ExpressionError {
        start: start as u16,
        end: end as u16,
        code,
    })
}

pub type Spanned<T> = (usize, T, usize);

pub struct Lexer<'input> {
    text: &'input str,
    chars: CharIndices<'input>,
    lookahead: Option<(usize, char)>,
}

const KEYWORDS: &[(&str, Token<'static>)] = &[
    ("if", If),
    ("then", Then),
    ("else", Else),
    ("not", Not),
    ("mod", Mod),
    ("and", And),
    ("or", Or),
];

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        let mut t = Lexer {
            text: input,
            chars: input.char_indices(),
            lookahead: None,
        };
        t.bump();
        t
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        self.bump_n(1)
    }

    fn bump_n(&mut self, n: usize) -> Option<(usize, char)> {
        assert!(n > 0);
        self.lookahead = self.chars.nth(n - 1);
        self.lookahead
    }

    fn word(&mut self, idx0: usize) -> Spanned<&'input str> {
        match self.take_while(is_identifier_continue) {
            Some(end) => (idx0, &self.text[idx0..end], end),
            None => (idx0, &self.text[idx0..], self.text.len()),
        }
    }

    fn take_while<F>(&mut self, mut keep_going: F) -> Option<usize>
    where
        F: FnMut(char) -> bool,
    {
        self.take_until(|c| !keep_going(c))
    }

    fn take_until<F>(&mut self, mut terminate: F) -> Option<usize>
    where
        F: FnMut(char) -> bool,
    {
        loop {
            match self.lookahead {
                None => {
                    return None;
                }
                Some((idx1, c)) => {
                    if terminate(c) {
                        return Some(idx1);
                    } else {
                        self.bump();
                    }
                }
            }
        }
    }

    fn identifierish(&mut self, idx0: usize) -> Spanned<Token<'input>> {
        let (start, word, end) = self.word(idx0);
        let lower_word = word.to_lowercase();

        // keywords win; everything else is a bare identifier
        let tok = KEYWORDS
            .iter()
            .filter(|&&(w, _)| w == lower_word)
            .map(|(_, t)| *t)
            .next()
            .unwrap_or(Ident(word));

        (start, tok, end)
    }

    fn number(&mut self, idx0: usize) -> Spanned<Token<'input>> {
        use regex::{Match, Regex};

        lazy_static! {
            static ref NUMBER_RE: Regex =
                Regex::new(r"\d*(\.\d*)?([eE][-+]?(\d*(\.\d*)?)?)?").unwrap();
        }

        let m: Match = NUMBER_RE.find(&self.text[idx0..]).unwrap();

        self.bump_n(m.end());

        let end = idx0 + m.end();
        (idx0, Num(&self.text[idx0..end]), end)
    }

    #[allow(clippy::unnecessary_wraps)]
    fn consume(
        &mut self,
        i: usize,
        tok: Token<'input>,
        len: usize,
    ) -> Option<Result<Spanned<Token<'input>>, ExpressionError>> {
        self.bump();
        Some(Ok((i, tok, i + len)))
    }
}

impl<'input> Iterator for Lexer<'input> {
    type Item = Result<Spanned<Token<'input>>, ExpressionError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            return match self.lookahead {
                Some((i, '/')) => self.consume(i, Div, 1),
                Some((i, '=')) => self.consume(i, Eq, 1),
                Some((i, '^')) => self.consume(i, Exp, 1),
                Some((i, '<')) => {
                    match self.bump() {
                        Some((_, '>')) => self.consume(i, Neq, 2),
                        Some((_, '=')) => self.consume(i, Lte, 2),
                        // we've already bumped, don't consume
                        _ => Some(Ok((i, Lt, i + 1))),
                    }
                }
                Some((i, '>')) => {
                    match self.bump() {
                        Some((_, '=')) => self.consume(i, Gte, 2),
                        // we've already bumped, don't consume
                        _ => Some(Ok((i, Gt, i + 1))),
                    }
                }
                Some((i, '!')) => {
                    match self.bump() {
                        Some((_, '=')) => self.consume(i, Neq, 2),
                        // a bare '!' isn't an operator in this grammar
                        _ => Some(error(UnrecognizedToken, i, i + 1)),
                    }
                }
                Some((i, '&')) => {
                    match self.bump() {
                        Some((_, '&')) => self.consume(i, And, 2),
                        _ => Some(error(UnrecognizedToken, i, i + 2)),
                    }
                }
                Some((i, '|')) => {
                    match self.bump() {
                        Some((_, '|')) => self.consume(i, Or, 2),
                        _ => Some(error(UnrecognizedToken, i, i + 2)),
                    }
                }
                Some((i, '-')) => self.consume(i, Minus, 1),
                Some((i, '+')) => self.consume(i, Plus, 1),
                Some((i, '*')) => {
                    match self.bump() {
                        // Python-style exponentiation, kept because rates
                        // arrive authored both ways
                        Some((_, '*')) => self.consume(i, Exp, 2),
                        // we've already bumped, don't consume
                        _ => Some(Ok((i, Mul, i + 1))),
                    }
                }
                Some((i, '(')) => self.consume(i, LParen, 1),
                Some((i, ')')) => self.consume(i, RParen, 1),
                Some((i, ',')) => self.consume(i, Comma, 1),
                Some((i, c)) if is_identifier_start(c) => Some(Ok(self.identifierish(i))),
                Some((i, c)) if is_number_start(c) => Some(Ok(self.number(i))),
                Some((_, c)) if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                Some((i, _)) => {
                    self.bump(); // eat whatever is killing us
                    let end = match self.lookahead {
                        Some((end, _)) => end,
                        None => self.text.len(),
                    };
                    Some(error(UnrecognizedToken, i, end))
                }
                None => None,
            };
        }
    }
}

fn is_number_start(c: char) -> bool {
    is_digit(c) || c == '.'
}

fn is_digit(c: char) -> bool {
    c.is_ascii_digit()
}

fn is_identifier_start(c: char) -> bool {
    UnicodeXID::is_xid_start(c) || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    UnicodeXID::is_xid_continue(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<Token<'_>> {
        Lexer::new(input)
            .map(|t| t.unwrap().1)
            .collect::<Vec<Token<'_>>>()
    }

    #[test]
    fn lexes_simple_rate() {
        assert_eq!(vec![Ident("k"), Mul, Ident("S0")], lex("k * S0"));
        assert_eq!(
            vec![Ident("beta"), Mul, Ident("S"), Mul, Ident("I"), Div, Ident("N")],
            lex("beta * S * I / N")
        );
    }

    #[test]
    fn lexes_numbers() {
        assert_eq!(vec![Num("0.5")], lex("0.5"));
        assert_eq!(vec![Num("1e-3")], lex("1e-3"));
        assert_eq!(vec![Num(".25"), Plus, Num("2.")], lex(".25 + 2."));
    }

    #[test]
    fn exponent_spellings() {
        assert_eq!(vec![Ident("x"), Exp, Num("2")], lex("x ^ 2"));
        assert_eq!(vec![Ident("x"), Exp, Num("2")], lex("x ** 2"));
        assert_eq!(vec![Ident("x"), Mul, Ident("y")], lex("x * y"));
    }

    #[test]
    fn comparison_spellings() {
        assert_eq!(vec![Ident("a"), Neq, Ident("b")], lex("a <> b"));
        assert_eq!(vec![Ident("a"), Neq, Ident("b")], lex("a != b"));
        assert_eq!(vec![Ident("a"), Lte, Ident("b")], lex("a <= b"));
        assert_eq!(vec![Ident("a"), And, Ident("b")], lex("a && b"));
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(vec![If, Ident("a"), Then, Num("1"), Else, Num("0")], lex("IF a THEN 1 ELSE 0"));
        assert_eq!(vec![Not, Ident("done")], lex("not done"));
    }

    #[test]
    fn spans_are_byte_offsets() {
        let spanned: Vec<_> = Lexer::new("k * S0").map(|t| t.unwrap()).collect();
        assert_eq!((0, Ident("k"), 1), spanned[0]);
        assert_eq!((2, Mul, 3), spanned[1]);
        assert_eq!((4, Ident("S0"), 6), spanned[2]);
    }

    #[test]
    fn rejects_unknown_characters() {
        let result: Result<Vec<_>, _> = Lexer::new("a @ b").collect();
        let err = result.unwrap_err();
        assert_eq!(ErrorCode::UnrecognizedToken, err.code);
        assert_eq!(2, err.start);
    }

    #[test]
    fn rejects_attribute_access() {
        // '.' only starts a number; 'np.exp' style member access does
        // not tokenize as a single name
        let toks: Result<Vec<_>, _> = Lexer::new("np.exp").collect();
        let toks = toks.unwrap();
        assert_eq!(Ident("np"), toks[0].1);
        assert!(matches!(toks[1].1, Num(_)));
    }
}
