// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

mod ast;
mod batch;
pub mod builtins;
pub mod catalog;
pub mod common;
mod compiler;
pub mod datamodel;
mod parser;
mod patch;
mod results;
mod sim;
mod token;

mod testutils;

#[cfg(test)]
mod sim_proptest;

pub use self::batch::{BatchResult, MAX_BATCH_VARIANTS, Variant, run_batch};
pub use self::common::{Error, ErrorCode, ErrorKind, Ident, Result};
pub use self::compiler::OdeSystem;
pub use self::patch::{FlowPatch, ParameterPatch, SchemaPatch, StockPatch, apply_patch};
pub use self::results::Results;
pub use self::sim::{DIVERGENCE_THRESHOLD, SimSpecs, simulate};
