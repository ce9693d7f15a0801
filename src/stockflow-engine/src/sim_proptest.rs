// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Property-based tests for patching, simulation, and batch runs.
//!
//! These tests verify that:
//! 1. Patches touch exactly the fragments they name, and are idempotent
//! 2. Simulation is a deterministic, conservation-respecting function
//! 3. A batch run is observationally equal to patch-then-simulate

use std::collections::BTreeMap;

use proptest::prelude::*;

use crate::batch::{Variant, run_batch};
use crate::datamodel::Schema;
use crate::patch::{ParameterPatch, SchemaPatch, apply_patch};
use crate::sim::{SimSpecs, simulate};
use crate::testutils::{transfer_schema, x_flow, x_param, x_schema, x_stock};

fn decay(s0: f64, k: f64) -> Schema {
    x_schema(
        vec![x_stock("S0", s0)],
        vec![x_flow("f0", Some("S0"), None, "k * S0")],
        vec![x_param("k", k)],
    )
}

fn param_patch(id: &str, value: f64) -> SchemaPatch {
    SchemaPatch {
        parameters: vec![ParameterPatch {
            id: id.to_string(),
            value: Some(value),
            ..Default::default()
        }],
        ..Default::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn patch_touches_only_named_parameters(value in -100.0..100.0f64) {
        let schema = decay(100.0, 0.1);
        let before = schema.clone();

        let patched = apply_patch(&schema, &param_patch("k", value)).unwrap();
        prop_assert_eq!(&before, &schema);
        prop_assert_eq!(value, patched.get_parameter("k").unwrap().value);
        prop_assert_eq!(&patched.stocks, &schema.stocks);
        prop_assert_eq!(&patched.flows, &schema.flows);
    }

    #[test]
    fn patching_twice_equals_patching_once(value in -100.0..100.0f64) {
        let schema = decay(100.0, 0.1);
        let patch = param_patch("k", value);

        let once = apply_patch(&schema, &patch).unwrap();
        let twice = apply_patch(&once, &patch).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn unknown_parameter_ids_append(id in "[a-z][a-z0-9_]{0,11}", value in -100.0..100.0f64) {
        let schema = decay(100.0, 0.1);
        let patched = apply_patch(&schema, &param_patch(&id, value)).unwrap();

        prop_assert_eq!(value, patched.get_parameter(&id).unwrap().value);
        let expected_len = if id == "k" { 1 } else { 2 };
        prop_assert_eq!(expected_len, patched.parameters.len());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn simulation_is_deterministic(s0 in 1.0..1000.0f64, k in 0.01..0.5f64) {
        let schema = decay(s0, k);
        let specs = SimSpecs::new(10.0);

        let a = simulate(&schema, &specs, &[]).unwrap();
        let b = simulate(&schema, &specs, &[]).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn decay_tracks_the_analytic_solution(s0 in 1.0..1000.0f64, k in 0.01..0.5f64) {
        let schema = decay(s0, k);
        let results = simulate(&schema, &SimSpecs::new(10.0), &[]).unwrap();

        for (t, value) in results.series("S0").unwrap() {
            let exact = s0 * (-k * t).exp();
            prop_assert!(
                (value - exact).abs() <= 0.02 * s0,
                "t={} value={} exact={}",
                t, value, exact
            );
        }
    }

    #[test]
    fn transfers_conserve_the_total(r in 0.01..1.0f64) {
        let schema = apply_patch(&transfer_schema(), &param_patch("r", r)).unwrap();
        let results = simulate(&schema, &SimSpecs::new(20.0), &[]).unwrap();

        let a = results.series("A").unwrap();
        let b = results.series("B").unwrap();
        for ((t, va), (_, vb)) in a.zip(b) {
            prop_assert!(
                (va + vb - 100.0).abs() <= 1e-9 * 100.0,
                "t={} total={}",
                t, va + vb
            );
        }
    }

    #[test]
    fn batch_equals_patch_then_simulate(ks in prop::collection::vec(0.01..0.5f64, 1..4)) {
        let schema = decay(100.0, 0.1);
        let specs = SimSpecs::new(5.0);

        let variants: Vec<Variant> = ks
            .iter()
            .enumerate()
            .map(|(i, k)| Variant {
                label: format!("v{i}"),
                overrides: BTreeMap::from([("k".to_string(), *k)]),
            })
            .collect();

        let batch = run_batch(&schema, &specs, &[], &variants).unwrap();
        prop_assert_eq!(ks.len(), batch.len());
        for (result, k) in batch.iter().zip(ks.iter()) {
            let patched = apply_patch(&schema, &param_patch("k", *k)).unwrap();
            let direct = simulate(&patched, &specs, &[]).unwrap();
            prop_assert_eq!(&direct, &result.results);
        }
    }
}
