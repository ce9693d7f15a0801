// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;

/// Loc describes a location in a rate expression by starting and ending
/// byte offset.  Rates are short strings typed by humans -- u16 is long
/// enough.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Hash)]
pub struct Loc {
    pub start: u16,
    pub end: u16,
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl Loc {
    pub fn new(start: usize, end: usize) -> Self {
        Loc {
            start: start as u16,
            end: end as u16,
        }
    }

    /// union takes a second Loc and returns the inclusive range from the
    /// start of the earlier token to the end of the later token.
    pub fn union(&self, rhs: &Self) -> Self {
        Loc {
            start: self.start.min(rhs.start),
            end: self.end.max(rhs.end),
        }
    }
}

#[test]
fn test_loc_basics() {
    let a = Loc { start: 3, end: 7 };
    assert_eq!(a, Loc::new(3, 7));

    let b = Loc { start: 4, end: 11 };
    assert_eq!(Loc::new(3, 11), a.union(&b));

    let c = Loc { start: 1, end: 5 };
    assert_eq!(Loc::new(1, 7), a.union(&c));
}

/// A function call as parsed: name plus raw argument expressions.  The
/// compiler checks the name against the allow-list below and the arity
/// against the typed [`BuiltinFn`] shape.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct UntypedBuiltinFn<Expr>(pub String, pub Vec<Expr>);

/// The complete set of callable functions.  Rate expressions can reach
/// nothing outside this list; an unlisted name fails compilation.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum BuiltinFn<Expr> {
    Abs(Box<Expr>),
    Exp(Box<Expr>),
    Ln(Box<Expr>),
    Log10(Box<Expr>),
    Sqrt(Box<Expr>),
    Min(Box<Expr>, Box<Expr>),
    Max(Box<Expr>, Box<Expr>),
    // clip(x, lo, hi) limits x to the closed interval [lo, hi]
    Clip(Box<Expr>, Box<Expr>, Box<Expr>),
    // safediv(a, b) and safediv(a, b, default): 0 (or default) when b is 0
    SafeDiv(Box<Expr>, Box<Expr>, Option<Box<Expr>>),
}

impl<Expr> BuiltinFn<Expr> {
    pub fn name(&self) -> &'static str {
        use BuiltinFn::*;
        match self {
            Abs(_) => "abs",
            Exp(_) => "exp",
            Ln(_) => "ln",
            Log10(_) => "log10",
            Sqrt(_) => "sqrt",
            Min(_, _) => "min",
            Max(_, _) => "max",
            Clip(_, _, _) => "clip",
            SafeDiv(_, _, _) => "safediv",
        }
    }
}

pub fn is_builtin_fn(name: &str) -> bool {
    matches!(
        name,
        "abs" | "exp" | "ln" | "log10" | "sqrt" | "min" | "max" | "clip" | "safediv"
    )
}

#[test]
fn test_is_builtin_fn() {
    assert!(is_builtin_fn("abs"));
    assert!(is_builtin_fn("min"));
    assert!(is_builtin_fn("safediv"));
    assert!(!is_builtin_fn("lookup"));
    assert!(!is_builtin_fn("eval"));
    assert!(!is_builtin_fn("__import__"));
}
