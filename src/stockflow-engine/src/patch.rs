// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Non-destructive schema patches.
//!
//! A patch is a sparse bundle of per-entity fragments keyed by id.
//! Fields left as `None` are untouched on the target entity; ids that
//! match nothing are appended as new entities, which requires the
//! fragment to carry the entity's defining field (a stock's `initial`,
//! a flow's `rate`, a parameter's `value`).  Patches merge field by
//! field and never validate cross-references; building the ODE system
//! is where dangling ids surface.

use serde::{Deserialize, Serialize};

use crate::common::{Ident, Result};
use crate::datamodel::{Flow, LoopType, Parameter, Schema, Stock};
use crate::patch_err;

fn is_none<T>(value: &Option<T>) -> bool {
    value.is_none()
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct StockPatch {
    pub id: Ident,
    #[serde(default, skip_serializing_if = "is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub initial: Option<f64>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub source: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct FlowPatch {
    pub id: Ident,
    #[serde(default, skip_serializing_if = "is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub from: Option<Ident>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub to: Option<Ident>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub rate: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub mechanism: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub loop_type: Option<LoopType>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub delay: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub source: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ParameterPatch {
    pub id: Ident,
    #[serde(default, skip_serializing_if = "is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "is_none")]
    pub unit: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct SchemaPatch {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stocks: Vec<StockPatch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flows: Vec<FlowPatch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ParameterPatch>,
}

impl SchemaPatch {
    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty() && self.flows.is_empty() && self.parameters.is_empty()
    }
}

macro_rules! merge_field {
    ($target:expr, $fragment:expr, $field:tt) => {
        if let Some(value) = $fragment.$field.as_ref() {
            $target.$field = value.clone();
        }
    };
}

macro_rules! merge_optional_field {
    ($target:expr, $fragment:expr, $field:tt) => {
        if let Some(value) = $fragment.$field.as_ref() {
            $target.$field = Some(value.clone());
        }
    };
}

/// Apply `patch` to `schema`, returning the merged schema.  The input
/// schema is never modified.
pub fn apply_patch(schema: &Schema, patch: &SchemaPatch) -> Result<Schema> {
    let mut staged = schema.clone();

    for fragment in patch.stocks.iter() {
        if fragment.id.is_empty() {
            return patch_err!(
                MissingRequiredField,
                "stock patch entry has no id".to_string()
            );
        }
        match staged.stocks.iter_mut().find(|s| s.id == fragment.id) {
            Some(stock) => {
                merge_field!(stock, fragment, name);
                merge_field!(stock, fragment, initial);
                merge_optional_field!(stock, fragment, unit);
                merge_optional_field!(stock, fragment, source);
            }
            None => {
                let Some(initial) = fragment.initial else {
                    return patch_err!(
                        MissingRequiredField,
                        format!("new stock '{}' needs an initial value", fragment.id)
                    );
                };
                staged.stocks.push(Stock {
                    id: fragment.id.clone(),
                    name: fragment.name.clone().unwrap_or_else(|| fragment.id.clone()),
                    initial,
                    unit: fragment.unit.clone(),
                    source: fragment.source.clone(),
                });
            }
        }
    }

    for fragment in patch.flows.iter() {
        if fragment.id.is_empty() {
            return patch_err!(
                MissingRequiredField,
                "flow patch entry has no id".to_string()
            );
        }
        match staged.flows.iter_mut().find(|f| f.id == fragment.id) {
            Some(flow) => {
                merge_field!(flow, fragment, name);
                merge_field!(flow, fragment, rate);
                merge_optional_field!(flow, fragment, from);
                merge_optional_field!(flow, fragment, to);
                merge_optional_field!(flow, fragment, mechanism);
                merge_optional_field!(flow, fragment, loop_type);
                merge_optional_field!(flow, fragment, delay);
                merge_optional_field!(flow, fragment, unit);
                merge_optional_field!(flow, fragment, source);
            }
            None => {
                let Some(rate) = fragment.rate.clone() else {
                    return patch_err!(
                        MissingRequiredField,
                        format!("new flow '{}' needs a rate", fragment.id)
                    );
                };
                staged.flows.push(Flow {
                    id: fragment.id.clone(),
                    name: fragment.name.clone().unwrap_or_else(|| fragment.id.clone()),
                    from: fragment.from.clone(),
                    to: fragment.to.clone(),
                    rate,
                    mechanism: fragment.mechanism.clone(),
                    loop_type: fragment.loop_type,
                    delay: fragment.delay.clone(),
                    unit: fragment.unit.clone(),
                    source: fragment.source.clone(),
                    loop_ids: vec![],
                });
            }
        }
    }

    for fragment in patch.parameters.iter() {
        if fragment.id.is_empty() {
            return patch_err!(
                MissingRequiredField,
                "parameter patch entry has no id".to_string()
            );
        }
        match staged.parameters.iter_mut().find(|p| p.id == fragment.id) {
            Some(parameter) => {
                merge_field!(parameter, fragment, name);
                merge_field!(parameter, fragment, value);
                merge_optional_field!(parameter, fragment, unit);
            }
            None => {
                let Some(value) = fragment.value else {
                    return patch_err!(
                        MissingRequiredField,
                        format!("new parameter '{}' needs a value", fragment.id)
                    );
                };
                staged.parameters.push(Parameter {
                    id: fragment.id.clone(),
                    name: fragment.name.clone().unwrap_or_else(|| fragment.id.clone()),
                    value,
                    unit: fragment.unit.clone(),
                });
            }
        }
    }

    Ok(staged)
}
