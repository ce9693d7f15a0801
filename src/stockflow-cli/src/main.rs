// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fs::File;
use std::io::BufReader;

use clap::{Parser, ValueEnum};
use serde_json::json;

use stockflow_engine::datamodel::Schema;
use stockflow_engine::{
    ParameterPatch, Results, SchemaPatch, SimSpecs, apply_patch, catalog, simulate,
};

const EXIT_FAILURE: i32 = 1;

#[macro_export]
macro_rules! die(
    ($($arg:tt)*) => { {
        eprintln!($($arg)*);
        std::process::exit(EXIT_FAILURE)
    } }
);

#[derive(Parser, Debug)]
#[command(name = "flow")]
#[command(about = "Simulate stock-and-flow models")]
struct Args {
    /// Built-in model id or path to a JSON schema file
    model: Option<String>,

    /// Simulation horizon in model time units.
    /// Defaults to the schema's own horizon, or 50.
    #[arg(long)]
    horizon: Option<f64>,

    /// Spacing of saved samples
    #[arg(long = "save-step", default_value = "1.0")]
    save_step: f64,

    /// Mechanism tags to exclude before simulation (comma-separated or repeated)
    #[arg(long = "exclude", value_delimiter = ',', value_name = "MECHANISM")]
    exclude: Vec<String>,

    /// Parameter override, applied as a patch before simulation (repeatable)
    #[arg(long = "set", value_name = "ID=VALUE")]
    set: Vec<String>,

    /// List built-in models and exit
    #[arg(long)]
    list: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Tsv)]
    output: OutputFormat,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Tsv,
    Json,
}

fn load_schema(model: &str) -> Schema {
    if let Some(schema) = catalog::get(model) {
        return schema;
    }

    let file = match File::open(model) {
        Ok(file) => file,
        Err(err) => die!("error: '{model}' is not a built-in model or a readable file: {err}"),
    };
    let mut schema: Schema = match serde_json::from_reader(BufReader::new(file)) {
        Ok(schema) => schema,
        Err(err) => die!("error: parsing '{model}': {err}"),
    };
    schema.normalize();
    schema
}

fn overrides_patch(sets: &[String]) -> SchemaPatch {
    let mut patch = SchemaPatch::default();
    for entry in sets {
        let Some((id, value)) = entry.split_once('=') else {
            die!("error: --set expects ID=VALUE, got '{entry}'");
        };
        let Ok(value) = value.trim().parse::<f64>() else {
            die!("error: --set '{entry}': value is not a number");
        };
        patch.parameters.push(ParameterPatch {
            id: id.trim().to_string(),
            value: Some(value),
            ..Default::default()
        });
    }
    patch
}

fn print_json(results: &Results) {
    let t: Vec<f64> = results.times().collect();
    let y: Vec<Vec<f64>> = results
        .stock_ids
        .iter()
        .map(|id| {
            results
                .series(id)
                .unwrap()
                .map(|(_, value)| value)
                .collect()
        })
        .collect();

    let mut response = json!({
        "t": t,
        "stock_ids": results.stock_ids,
        "Y": y,
    });
    if !results.warnings.is_empty() {
        response["warnings"] = json!(results.warnings);
    }
    println!("{response}");
}

fn main() {
    let args = Args::parse();

    if args.list {
        for model in catalog::models() {
            println!("{}\t{}\t{}", model.id, model.name, model.description);
        }
        return;
    }

    let Some(ref model) = args.model else {
        die!("error: a model id or schema path is required (try --list)");
    };
    let schema = load_schema(model);

    let patch = overrides_patch(&args.set);
    let schema = if patch.is_empty() {
        schema
    } else {
        match apply_patch(&schema, &patch) {
            Ok(schema) => schema,
            Err(err) => die!("error: {err}"),
        }
    };

    let horizon = args
        .horizon
        .or_else(|| schema.meta.as_ref().and_then(|m| m.horizon))
        .unwrap_or(50.0);
    let specs = SimSpecs {
        horizon,
        save_step: args.save_step,
        ..Default::default()
    };

    let results = match simulate(&schema, &specs, &args.exclude) {
        Ok(results) => results,
        Err(err) => die!("error: {err}"),
    };

    for warning in results.warnings.iter() {
        eprintln!("warning: {warning}");
    }

    match args.output {
        OutputFormat::Tsv => results.print_tsv(),
        OutputFormat::Json => print_json(&results),
    }
}
