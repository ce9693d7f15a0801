// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

/// Identifier of a stock, flow, parameter, loop or cluster.
///
/// Ids are matched exactly; there is no case folding or whitespace
/// normalization.  Whatever string the schema author picked is the id.
pub type Ident = String;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    DoesNotExist, // the named entity doesn't exist
    UnrecognizedToken,
    UnrecognizedEof,
    ExtraToken,
    ExpectedNumber,
    UnknownBuiltin,
    BadBuiltinArgs,
    EmptyEquation,
    UnknownDependency,
    DivisionByZero,
    DuplicateId,
    UnknownStockReference,
    UnknownFlowReference,
    UnknownLoopReference,
    BadInitialValue,
    BadRateExpression,
    BadSimSpecs,
    NotSimulatable,
    RateEvaluationFailed,
    MissingRequiredField,
    DuplicateLabel,
    TooManyVariants,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            DoesNotExist => "does_not_exist",
            UnrecognizedToken => "unrecognized_token",
            UnrecognizedEof => "unrecognized_eof",
            ExtraToken => "extra_token",
            ExpectedNumber => "expected_number",
            UnknownBuiltin => "unknown_builtin",
            BadBuiltinArgs => "bad_builtin_args",
            EmptyEquation => "empty_equation",
            UnknownDependency => "unknown_dependency",
            DivisionByZero => "division_by_zero",
            DuplicateId => "duplicate_id",
            UnknownStockReference => "unknown_stock_reference",
            UnknownFlowReference => "unknown_flow_reference",
            UnknownLoopReference => "unknown_loop_reference",
            BadInitialValue => "bad_initial_value",
            BadRateExpression => "bad_rate_expression",
            BadSimSpecs => "bad_sim_specs",
            NotSimulatable => "not_simulatable",
            RateEvaluationFailed => "rate_evaluation_failed",
            MissingRequiredField => "missing_required_field",
            DuplicateLabel => "duplicate_label",
            TooManyVariants => "too_many_variants",
            Generic => "generic",
        };

        write!(f, "{name}")
    }
}

/// An error located within a single rate expression.
///
/// `start` and `end` are byte offsets into the expression string.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExpressionError {
    pub start: u16,
    pub end: u16,
    pub code: ErrorCode,
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.start, self.end, self.code)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Schema,
    Patch,
    Simulation,
    Batch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Schema => "SchemaError",
            ErrorKind::Patch => "PatchError",
            ErrorKind::Simulation => "SimulationError",
            ErrorKind::Batch => "BatchError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;
pub type ExpressionResult<T> = result::Result<T, ExpressionError>;

#[macro_export]
macro_rules! eqn_err(
    ($code:tt, $start:expr, $end:expr) => {{
        use $crate::common::{ErrorCode, ExpressionError};
        Err(ExpressionError{ start: $start, end: $end, code: ErrorCode::$code})
    }}
);

#[macro_export]
macro_rules! schema_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Schema,
            ErrorCode::$code,
            Some($str),
        ))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Schema, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! patch_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Patch,
            ErrorCode::$code,
            Some($str),
        ))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Patch, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! sim_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Simulation,
            ErrorCode::$code,
            Some($str),
        ))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Simulation, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! batch_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Batch,
            ErrorCode::$code,
            Some($str),
        ))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Batch, ErrorCode::$code, None))
    }};
}

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Schema,
        ErrorCode::DuplicateId,
        Some("stock 'S0'".to_string()),
    );
    assert_eq!("SchemaError{duplicate_id: stock 'S0'}", format!("{err}"));

    let err = Error::new(ErrorKind::Batch, ErrorCode::TooManyVariants, None);
    assert_eq!("BatchError{too_many_variants}", format!("{err}"));

    let err = ExpressionError {
        start: 3,
        end: 7,
        code: ErrorCode::UnknownDependency,
    };
    assert_eq!("3:7:unknown_dependency", format!("{err}"));
}

#[test]
fn test_error_macros() {
    fn fails_schema() -> Result<()> {
        schema_err!(UnknownStockReference, "flow 'f1' from 'nope'".to_string())
    }
    let err = fails_schema().unwrap_err();
    assert_eq!(ErrorKind::Schema, err.kind);
    assert_eq!(ErrorCode::UnknownStockReference, err.code);

    fn fails_eqn() -> ExpressionResult<f64> {
        eqn_err!(EmptyEquation, 0, 0)
    }
    let err = fails_eqn().unwrap_err();
    assert_eq!(ErrorCode::EmptyEquation, err.code);
    assert_eq!(0, err.start);
}
