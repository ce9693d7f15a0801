// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#[cfg(test)]
use crate::datamodel::{Flow, Parameter, Schema, Stock};

#[cfg(test)]
pub(crate) fn x_stock(id: &str, initial: f64) -> Stock {
    Stock {
        id: id.to_string(),
        name: id.to_string(),
        initial,
        unit: None,
        source: None,
    }
}

#[cfg(test)]
pub(crate) fn x_flow(id: &str, from: Option<&str>, to: Option<&str>, rate: &str) -> Flow {
    Flow {
        id: id.to_string(),
        name: id.to_string(),
        from: from.map(|s| s.to_string()),
        to: to.map(|s| s.to_string()),
        rate: rate.to_string(),
        mechanism: None,
        loop_type: None,
        delay: None,
        unit: None,
        source: None,
        loop_ids: vec![],
    }
}

#[cfg(test)]
pub(crate) fn x_flow_mech(
    id: &str,
    from: Option<&str>,
    to: Option<&str>,
    rate: &str,
    mechanism: &str,
) -> Flow {
    Flow {
        mechanism: Some(mechanism.to_string()),
        ..x_flow(id, from, to, rate)
    }
}

#[cfg(test)]
pub(crate) fn x_param(id: &str, value: f64) -> Parameter {
    Parameter {
        id: id.to_string(),
        name: id.to_string(),
        value,
        unit: None,
    }
}

#[cfg(test)]
pub(crate) fn x_schema(stocks: Vec<Stock>, flows: Vec<Flow>, parameters: Vec<Parameter>) -> Schema {
    Schema {
        meta: None,
        stocks,
        flows,
        parameters,
        loops: vec![],
        clusters: vec![],
    }
}

/// Single-stock exponential decay: S0 starts at 100 and drains at `k * S0`.
#[cfg(test)]
pub(crate) fn decay_schema() -> Schema {
    x_schema(
        vec![x_stock("S0", 100.0)],
        vec![x_flow("f0", Some("S0"), None, "k * S0")],
        vec![x_param("k", 0.1)],
    )
}

/// Two stocks with a conserved transfer between them.
#[cfg(test)]
pub(crate) fn transfer_schema() -> Schema {
    x_schema(
        vec![x_stock("A", 80.0), x_stock("B", 20.0)],
        vec![x_flow("t0", Some("A"), Some("B"), "r * A")],
        vec![x_param("r", 0.25)],
    )
}
