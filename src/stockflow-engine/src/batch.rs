// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Scenario batches: one schema, many parameter variants.
//!
//! Each variant is a labeled set of parameter overrides.  A variant run
//! is exactly `apply_patch` followed by `simulate`, so batch output for
//! a variant is bit-identical to patching and simulating by hand.
//! Variants are independent and run in parallel off wasm; results come
//! back in input order either way.

use std::collections::BTreeMap;

#[cfg(not(target_arch = "wasm32"))]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::batch_err;
use crate::common::{Ident, Result};
use crate::datamodel::Schema;
use crate::patch::{ParameterPatch, SchemaPatch};
use crate::results::Results;
use crate::sim::{SimSpecs, simulate};

/// Upper bound on variants per batch call.
pub const MAX_BATCH_VARIANTS: usize = 50;

/// A labeled scenario: parameter values to override before simulating.
/// An override naming no declared parameter appends one, mirroring
/// patch semantics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct Variant {
    pub label: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overrides: BTreeMap<Ident, f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BatchResult {
    pub label: String,
    pub results: Results,
}

fn overrides_patch(overrides: &BTreeMap<Ident, f64>) -> SchemaPatch {
    SchemaPatch {
        parameters: overrides
            .iter()
            .map(|(id, value)| ParameterPatch {
                id: id.clone(),
                value: Some(*value),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

fn run_variant(
    schema: &Schema,
    specs: &SimSpecs,
    excluded_mechanisms: &[String],
    variant: &Variant,
) -> Result<BatchResult> {
    let patched = crate::patch::apply_patch(schema, &overrides_patch(&variant.overrides))?;
    let results = simulate(&patched, specs, excluded_mechanisms)?;
    Ok(BatchResult {
        label: variant.label.clone(),
        results,
    })
}

/// Simulate every variant against `schema`, failing fast on duplicate
/// labels or an oversized batch.  Any variant failure fails the batch.
pub fn run_batch(
    schema: &Schema,
    specs: &SimSpecs,
    excluded_mechanisms: &[String],
    variants: &[Variant],
) -> Result<Vec<BatchResult>> {
    if variants.len() > MAX_BATCH_VARIANTS {
        return batch_err!(
            TooManyVariants,
            format!("{} variants, max is {MAX_BATCH_VARIANTS}", variants.len())
        );
    }
    let mut seen: Vec<&str> = Vec::with_capacity(variants.len());
    for variant in variants.iter() {
        if seen.contains(&variant.label.as_str()) {
            return batch_err!(
                DuplicateLabel,
                format!("variant label '{}' appears twice", variant.label)
            );
        }
        seen.push(&variant.label);
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        variants
            .par_iter()
            .map(|variant| run_variant(schema, specs, excluded_mechanisms, variant))
            .collect()
    }
    #[cfg(target_arch = "wasm32")]
    {
        variants
            .iter()
            .map(|variant| run_variant(schema, specs, excluded_mechanisms, variant))
            .collect()
    }
}
