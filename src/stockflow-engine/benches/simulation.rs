// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeMap;
use std::time::Duration;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use stockflow_engine::datamodel::{Flow, Parameter, Schema, Stock};
use stockflow_engine::{
    OdeSystem, ParameterPatch, SchemaPatch, SimSpecs, Variant, apply_patch, run_batch, simulate,
};

fn stock(id: &str, initial: f64) -> Stock {
    Stock {
        id: id.to_string(),
        name: id.to_string(),
        initial,
        unit: None,
        source: None,
    }
}

fn flow(id: &str, from: Option<&str>, to: Option<&str>, rate: &str) -> Flow {
    Flow {
        id: id.to_string(),
        name: id.to_string(),
        from: from.map(str::to_string),
        to: to.map(str::to_string),
        rate: rate.to_string(),
        mechanism: None,
        loop_type: None,
        delay: None,
        unit: None,
        source: None,
        loop_ids: vec![],
    }
}

fn param(id: &str, value: f64) -> Parameter {
    Parameter {
        id: id.to_string(),
        name: id.to_string(),
        value,
        unit: None,
    }
}

fn population_schema() -> Schema {
    Schema {
        meta: None,
        stocks: vec![stock("population", 1000.0)],
        flows: vec![
            flow("births", None, Some("population"), "population * birth_rate"),
            flow("deaths", Some("population"), None, "population / lifespan"),
        ],
        parameters: vec![param("birth_rate", 0.01), param("lifespan", 80.0)],
        loops: vec![],
        clusters: vec![],
    }
}

fn bench_build(c: &mut Criterion) {
    let schema = population_schema();

    c.bench_function("build_ode", |b| {
        b.iter(|| OdeSystem::new(&schema, &[]).unwrap())
    });
}

fn bench_simulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulate");
    group.measurement_time(Duration::from_secs(10));

    let schema = population_schema();
    for &horizon in &[100, 1_000, 10_000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(horizon),
            &SimSpecs::new(horizon as f64),
            |b, specs| b.iter(|| simulate(&schema, specs, &[]).unwrap()),
        );
    }
    group.finish();
}

fn bench_patch_and_simulate(c: &mut Criterion) {
    let schema = population_schema();
    let specs = SimSpecs::new(100.0);
    let patch = SchemaPatch {
        parameters: vec![ParameterPatch {
            id: "birth_rate".to_string(),
            value: Some(0.012),
            ..Default::default()
        }],
        ..Default::default()
    };

    c.bench_function("patch_and_simulate", |b| {
        b.iter(|| {
            let patched = apply_patch(&schema, &patch).unwrap();
            simulate(&patched, &specs, &[]).unwrap()
        })
    });
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    group.measurement_time(Duration::from_secs(10));

    let schema = population_schema();
    let specs = SimSpecs::new(100.0);
    for &n in &[1usize, 8, 32] {
        let variants: Vec<Variant> = (0..n)
            .map(|i| Variant {
                label: format!("v{i}"),
                overrides: BTreeMap::from([(
                    "birth_rate".to_string(),
                    0.005 + 0.0005 * i as f64,
                )]),
            })
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(n), &variants, |b, variants| {
            b.iter(|| run_batch(&schema, &specs, &[], variants).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_build,
    bench_simulate,
    bench_patch_and_simulate,
    bench_batch,
);
criterion_main!(benches);
