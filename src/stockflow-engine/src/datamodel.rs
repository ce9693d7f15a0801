// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The in-memory representation of a stock-and-flow model.
//!
//! A [`Schema`] is plain data: ordered stocks, flows, parameters, and
//! descriptive metadata (loops, clusters) the engine carries but never
//! interprets numerically.  Schemas serialize to and from flat JSON
//! records; callers own schema values and every engine operation is a
//! pure function of them.

use std::collections::{HashMap, HashSet};

#[cfg(feature = "schema")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::common::{Ident, Result};
use crate::schema_err;

fn is_none<T>(val: &Option<T>) -> bool {
    val.is_none()
}

/// A named accumulating quantity; one state variable of the ODE system.
///
/// The position of a stock in [`Schema::stocks`] fixes its slot in the
/// state vector, so stock order is significant and patches never reorder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct Stock {
    pub id: Ident,
    #[serde(default)]
    pub name: String,
    pub initial: f64,
    #[serde(skip_serializing_if = "is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "is_none")]
    pub source: Option<String>,
}

/// Direction of a feedback loop: reinforcing or balancing.
/// Descriptive only; the solver never reads it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub enum LoopType {
    #[serde(rename = "R")]
    Reinforcing,
    #[serde(rename = "B")]
    Balancing,
}

/// A named rate moving quantity into, out of, or between stocks.
///
/// `from`/`to` are stock ids; an absent `from` makes the flow an external
/// inflow, an absent `to` an external outflow.  `rate` is a free-form
/// expression over stock and parameter ids, parsed and evaluated by this
/// crate's own grammar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct Flow {
    pub id: Ident,
    #[serde(default)]
    pub name: String,
    #[serde(skip_serializing_if = "is_none")]
    pub from: Option<Ident>,
    #[serde(skip_serializing_if = "is_none")]
    pub to: Option<Ident>,
    pub rate: String,
    #[serde(skip_serializing_if = "is_none")]
    pub mechanism: Option<String>,
    #[serde(skip_serializing_if = "is_none")]
    pub loop_type: Option<LoopType>,
    #[serde(skip_serializing_if = "is_none")]
    pub delay: Option<String>,
    #[serde(skip_serializing_if = "is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loop_ids: Vec<Ident>,
}

/// A named constant usable inside rate expressions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct Parameter {
    pub id: Ident,
    #[serde(default)]
    pub name: String,
    pub value: f64,
    #[serde(skip_serializing_if = "is_none")]
    pub unit: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct Meta {
    #[serde(skip_serializing_if = "is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "is_none")]
    pub question: Option<String>,
    #[serde(skip_serializing_if = "is_none")]
    pub horizon: Option<f64>,
}

/// Feedback-loop annotation: which flows realize a loop and whether it
/// reinforces or balances.  Carried for display and cross-checked by
/// [`Schema::validate`], otherwise inert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct Loop {
    pub id: Ident,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "is_none")]
    #[cfg_attr(feature = "schema", schemars(rename = "type"))]
    pub kind: Option<LoopType>,
    #[serde(skip_serializing_if = "is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flow_ids: Vec<Ident>,
    #[serde(skip_serializing_if = "is_none")]
    pub delay: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct Cluster {
    pub id: Ident,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stock_ids: Vec<Ident>,
}

/// The complete description of one model.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(JsonSchema))]
pub struct Schema {
    #[serde(skip_serializing_if = "is_none")]
    pub meta: Option<Meta>,
    #[serde(default)]
    pub stocks: Vec<Stock>,
    #[serde(default)]
    pub flows: Vec<Flow>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loops: Vec<Loop>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clusters: Vec<Cluster>,
}

impl Schema {
    pub fn get_stock(&self, id: &str) -> Option<&Stock> {
        self.stocks.iter().find(|s| s.id == id)
    }

    pub fn get_flow(&self, id: &str) -> Option<&Flow> {
        self.flows.iter().find(|f| f.id == id)
    }

    pub fn get_parameter(&self, id: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    /// Stock id to state-vector slot, in declaration order.
    pub fn stock_offsets(&self) -> HashMap<Ident, usize> {
        self.stocks
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect()
    }

    /// Structural validation: id uniqueness, finite numeric seeds, and
    /// loop/cluster cross-references.  Dangling flow endpoints are also
    /// reported here; the ODE builder re-checks them so they surface
    /// before integration even for schemas that skipped validation.
    pub fn validate(&self) -> Result<()> {
        let mut stock_ids: HashSet<&str> = HashSet::new();
        for stock in self.stocks.iter() {
            if !stock_ids.insert(&stock.id) {
                return schema_err!(DuplicateId, format!("stock '{}'", stock.id));
            }
            if !stock.initial.is_finite() {
                return schema_err!(
                    BadInitialValue,
                    format!("stock '{}' initial {}", stock.id, stock.initial)
                );
            }
        }

        let mut flow_ids: HashSet<&str> = HashSet::new();
        for flow in self.flows.iter() {
            if !flow_ids.insert(&flow.id) {
                return schema_err!(DuplicateId, format!("flow '{}'", flow.id));
            }
            if let Some(ref from) = flow.from {
                if !stock_ids.contains(from.as_str()) {
                    return schema_err!(
                        UnknownStockReference,
                        format!("flow '{}' from '{}'", flow.id, from)
                    );
                }
            }
            if let Some(ref to) = flow.to {
                if !stock_ids.contains(to.as_str()) {
                    return schema_err!(
                        UnknownStockReference,
                        format!("flow '{}' to '{}'", flow.id, to)
                    );
                }
            }
        }

        let mut param_ids: HashSet<&str> = HashSet::new();
        for param in self.parameters.iter() {
            if !param_ids.insert(&param.id) {
                return schema_err!(DuplicateId, format!("parameter '{}'", param.id));
            }
            if !param.value.is_finite() {
                return schema_err!(
                    BadInitialValue,
                    format!("parameter '{}' value {}", param.id, param.value)
                );
            }
        }

        let mut loop_ids: HashSet<&str> = HashSet::new();
        for l in self.loops.iter() {
            if !loop_ids.insert(&l.id) {
                return schema_err!(DuplicateId, format!("loop '{}'", l.id));
            }
            for fid in l.flow_ids.iter() {
                if !flow_ids.contains(fid.as_str()) {
                    return schema_err!(
                        UnknownFlowReference,
                        format!("loop '{}' flow '{}'", l.id, fid)
                    );
                }
            }
        }
        for flow in self.flows.iter() {
            for lid in flow.loop_ids.iter() {
                if !loop_ids.contains(lid.as_str()) {
                    return schema_err!(
                        UnknownLoopReference,
                        format!("flow '{}' loop '{}'", flow.id, lid)
                    );
                }
            }
        }
        for cluster in self.clusters.iter() {
            for sid in cluster.stock_ids.iter() {
                if !stock_ids.contains(sid.as_str()) {
                    return schema_err!(
                        UnknownStockReference,
                        format!("cluster '{}' stock '{}'", cluster.id, sid)
                    );
                }
            }
        }

        Ok(())
    }

    /// Stamp unattributed stocks and flows as user-authored.  Applied at
    /// the service edge when ingesting hand-written files; core
    /// operations never call this implicitly.
    pub fn normalize(&mut self) {
        for stock in self.stocks.iter_mut() {
            if stock.source.is_none() {
                stock.source = Some("user".to_string());
            }
        }
        for flow in self.flows.iter_mut() {
            if flow.source.is_none() {
                flow.source = Some("user".to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ErrorCode, ErrorKind};

    fn decay_schema() -> Schema {
        Schema {
            meta: None,
            stocks: vec![Stock {
                id: "S0".to_string(),
                name: "Stock".to_string(),
                initial: 100.0,
                unit: None,
                source: None,
            }],
            flows: vec![Flow {
                id: "f1".to_string(),
                name: "decay".to_string(),
                from: Some("S0".to_string()),
                to: None,
                rate: "k * S0".to_string(),
                mechanism: None,
                loop_type: None,
                delay: None,
                unit: None,
                source: None,
                loop_ids: vec![],
            }],
            parameters: vec![Parameter {
                id: "k".to_string(),
                name: "k".to_string(),
                value: 0.1,
                unit: None,
            }],
            loops: vec![],
            clusters: vec![],
        }
    }

    #[test]
    fn validates_clean_schema() {
        assert!(decay_schema().validate().is_ok());
    }

    #[test]
    fn rejects_duplicate_stock_id() {
        let mut schema = decay_schema();
        let dup = schema.stocks[0].clone();
        schema.stocks.push(dup);
        let err = schema.validate().unwrap_err();
        assert_eq!(ErrorKind::Schema, err.kind);
        assert_eq!(ErrorCode::DuplicateId, err.code);
    }

    #[test]
    fn rejects_dangling_flow_endpoint() {
        let mut schema = decay_schema();
        schema.flows[0].to = Some("missing".to_string());
        let err = schema.validate().unwrap_err();
        assert_eq!(ErrorCode::UnknownStockReference, err.code);
        assert!(err.get_details().unwrap().contains("missing"));
    }

    #[test]
    fn rejects_non_finite_initial() {
        let mut schema = decay_schema();
        schema.stocks[0].initial = f64::NAN;
        let err = schema.validate().unwrap_err();
        assert_eq!(ErrorCode::BadInitialValue, err.code);
    }

    #[test]
    fn cross_checks_loop_references() {
        let mut schema = decay_schema();
        schema.loops.push(Loop {
            id: "R1".to_string(),
            name: "growth".to_string(),
            kind: Some(LoopType::Reinforcing),
            description: None,
            flow_ids: vec!["nope".to_string()],
            delay: None,
        });
        let err = schema.validate().unwrap_err();
        assert_eq!(ErrorCode::UnknownFlowReference, err.code);

        let mut schema = decay_schema();
        schema.flows[0].loop_ids = vec!["R9".to_string()];
        let err = schema.validate().unwrap_err();
        assert_eq!(ErrorCode::UnknownLoopReference, err.code);
    }

    #[test]
    fn stock_offsets_follow_declaration_order() {
        let mut schema = decay_schema();
        schema.stocks.push(Stock {
            id: "S1".to_string(),
            name: String::new(),
            initial: 0.0,
            unit: None,
            source: None,
        });
        let offsets = schema.stock_offsets();
        assert_eq!(0, offsets["S0"]);
        assert_eq!(1, offsets["S1"]);
    }

    #[test]
    fn json_field_names_round_trip() {
        let json = r#"{
            "stocks": [{"id": "S", "name": "Stock", "initial": 990.0}],
            "flows": [
                {"id": "f", "name": "f", "from": "S", "rate": "k * S",
                 "mechanism": "visibility", "loop_type": "R", "loop_ids": ["R1"]}
            ],
            "parameters": [{"id": "k", "name": "k", "value": 0.3}],
            "loops": [{"id": "R1", "name": "loop", "type": "R", "flow_ids": ["f"]}]
        }"#;
        let schema: Schema = serde_json::from_str(json).unwrap();
        assert_eq!(Some("S".to_string()), schema.flows[0].from);
        assert_eq!(None, schema.flows[0].to);
        assert_eq!(Some(LoopType::Reinforcing), schema.flows[0].loop_type);
        assert_eq!(Some(LoopType::Reinforcing), schema.loops[0].kind);
        assert!(schema.validate().is_ok());

        let text = serde_json::to_string(&schema).unwrap();
        assert!(text.contains("\"from\":\"S\""));
        assert!(text.contains("\"type\":\"R\""));
        assert!(!text.contains("\"to\""));
        let back: Schema = serde_json::from_str(&text).unwrap();
        assert_eq!(schema, back);
    }

    #[test]
    fn normalize_stamps_user_provenance() {
        let mut schema = decay_schema();
        schema.flows[0].source = Some("ai".to_string());
        schema.normalize();
        assert_eq!(Some("user".to_string()), schema.stocks[0].source);
        assert_eq!(Some("ai".to_string()), schema.flows[0].source);
    }
}
