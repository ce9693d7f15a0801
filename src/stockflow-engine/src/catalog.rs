// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Built-in demonstration models behind a process-wide read-only registry.
//!
//! The registry is populated once, on first access, and never mutated.
//! Core operations (compile, simulate, patch, batch) never consult it;
//! callers clone a [`Schema`] out with [`get`] and pass it in explicitly
//! like any other model.

use lazy_static::lazy_static;

use crate::datamodel::{Cluster, Flow, Loop, LoopType, Meta, Parameter, Schema, Stock};

/// Listing entry for one built-in model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModelSummary {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

lazy_static! {
    static ref CATALOG: Vec<(ModelSummary, Schema)> = vec![
        (
            ModelSummary {
                id: "sir",
                name: "SIR (epidemic)",
                description: "Classic Susceptible–Infected–Recovered; learning and validation.",
            },
            sir(),
        ),
        (
            ModelSummary {
                id: "aerodyn_pipeline",
                name: "AeroDyn — Pipeline & trust",
                description: "R&D → Integration → Certification → Delivery; ministerial trust.",
            },
            aerodyn_pipeline(),
        ),
        (
            ModelSummary {
                id: "aerodyn_lethal_ai",
                name: "AeroDyn — Lethal AI & long-term business",
                description: "Backlash ↔ Regulation ↔ Reputation ↔ Contracts over 5–10 years.",
            },
            aerodyn_lethal_ai(),
        ),
    ];
}

/// Summaries of every built-in model, in registry order.
pub fn models() -> Vec<ModelSummary> {
    CATALOG.iter().map(|(summary, _)| *summary).collect()
}

/// Look up a built-in model by id.  The schema is cloned out of the
/// registry; the registry itself is never handed to callers.
pub fn get(id: &str) -> Option<Schema> {
    CATALOG
        .iter()
        .find(|(summary, _)| summary.id == id)
        .map(|(_, schema)| schema.clone())
}

fn stock(id: &str, name: &str, initial: f64) -> Stock {
    Stock {
        id: id.to_owned(),
        name: name.to_owned(),
        initial,
        unit: None,
        source: None,
    }
}

fn flow(id: &str, name: &str, from: Option<&str>, to: Option<&str>, rate: &str) -> Flow {
    Flow {
        id: id.to_owned(),
        name: name.to_owned(),
        from: from.map(str::to_owned),
        to: to.map(str::to_owned),
        rate: rate.to_owned(),
        mechanism: None,
        loop_type: None,
        delay: None,
        unit: None,
        source: None,
        loop_ids: vec![],
    }
}

fn param(id: &str, name: &str, value: f64) -> Parameter {
    Parameter {
        id: id.to_owned(),
        name: name.to_owned(),
        value,
        unit: None,
    }
}

fn cluster(id: &str, name: &str, stock_ids: &[&str]) -> Cluster {
    Cluster {
        id: id.to_owned(),
        name: name.to_owned(),
        stock_ids: stock_ids.iter().map(|s| (*s).to_owned()).collect(),
    }
}

fn feedback(
    id: &str,
    name: &str,
    kind: LoopType,
    description: &str,
    flow_ids: &[&str],
    delay: &str,
) -> Loop {
    Loop {
        id: id.to_owned(),
        name: name.to_owned(),
        kind: Some(kind),
        description: Some(description.to_owned()),
        flow_ids: flow_ids.iter().map(|s| (*s).to_owned()).collect(),
        delay: Some(delay.to_owned()),
    }
}

/// Classic three-compartment epidemic model.  Time unit: days.
fn sir() -> Schema {
    Schema {
        meta: None,
        stocks: vec![
            stock("S", "Susceptible", 990.0),
            stock("I", "Infected", 10.0),
            stock("R", "Recovered", 0.0),
        ],
        flows: vec![
            flow("infection", "infection", Some("S"), Some("I"), "beta * S * I / N"),
            flow("recovery", "recovery", Some("I"), Some("R"), "gamma * I"),
        ],
        parameters: vec![
            param("N", "Population", 1000.0),
            param("beta", "Transmission", 0.3),
            param("gamma", "Recovery rate", 0.1),
        ],
        loops: vec![],
        clusters: vec![],
    }
}

/// Defense program pipeline with a ministerial-trust side channel.
/// Time unit: months.  The flow `new_programs` reads the parameter of
/// the same id; flow and parameter ids are separate namespaces.
fn aerodyn_pipeline() -> Schema {
    Schema {
        meta: Some(Meta {
            id: Some("aerodyn_pipeline".to_owned()),
            name: Some("AeroDyn — Pipeline & Ministerial Trust".to_owned()),
            question: None,
            horizon: Some(60.0),
        }),
        stocks: [
            ("R", "R&D pipeline", 20.0),
            ("I", "Integration", 5.0),
            ("C", "Certification queue", 3.0),
            ("D", "Delivered", 0.0),
            ("T", "Ministerial trust", 60.0),
        ]
        .into_iter()
        .map(|(id, name, initial)| Stock {
            source: Some("aerodyn_system_dynamics.py".to_owned()),
            ..stock(id, name, initial)
        })
        .collect(),
        flows: vec![
            flow("new_programs", "New programs", None, Some("R"), "new_programs"),
            flow("rd_completion", "R&D completion", Some("R"), Some("I"), "k_rd * R"),
            flow(
                "integration_completion",
                "Integration completion",
                Some("I"),
                Some("C"),
                "k_int * I",
            ),
            flow(
                "cert_rate",
                "Certification → delivery",
                Some("C"),
                Some("D"),
                "k_cert * C / oversight",
            ),
            Flow {
                loop_type: Some(LoopType::Balancing),
                ..flow(
                    "trust_gain",
                    "Trust gain",
                    None,
                    Some("T"),
                    "trust_gain_per_delivery * k_cert * C / oversight * (1 + non_lethal_bonus * frac_nl)",
                )
            },
            Flow {
                loop_type: Some(LoopType::Balancing),
                ..flow(
                    "trust_decay",
                    "Trust decay",
                    Some("T"),
                    None,
                    "trust_decay * max(T - trust_floor, 0)",
                )
            },
        ]
        .into_iter()
        .map(|f| Flow {
            source: Some("script".to_owned()),
            ..f
        })
        .collect(),
        parameters: vec![
            param("new_programs", "New programs/month", 1.2),
            param("k_rd", "R&D completion rate", 0.08),
            param("k_int", "Integration rate", 0.12),
            param("k_cert", "Cert rate (base)", 0.15),
            param("oversight", "Oversight factor", 1.0),
            param("trust_gain_per_delivery", "Trust gain per delivery", 1.5),
            param("non_lethal_bonus", "Non-lethal bonus", 0.4),
            param("frac_nl", "Fraction non-lethal", 0.3),
            param("trust_decay", "Trust decay", 0.02),
            param("trust_floor", "Trust floor", 20.0),
        ],
        loops: vec![],
        clusters: vec![],
    }
}

/// The large demo: five stocks, eleven mechanism-tagged flows, and the
/// full R/B loop annotation set.  Time unit: months.  Every flow carries
/// a mechanism tag, so excluding all five mechanisms freezes the model.
fn aerodyn_lethal_ai() -> Schema {
    let tagged = |f: Flow, mechanism: &str, kind: LoopType, delay: &str, loop_id: &str| Flow {
        mechanism: Some(mechanism.to_owned()),
        loop_type: Some(kind),
        delay: Some(delay.to_owned()),
        source: Some("task force".to_owned()),
        loop_ids: vec![loop_id.to_owned()],
        ..f
    };

    Schema {
        meta: Some(Meta {
            id: Some("aerodyn_lethal_ai".to_owned()),
            name: Some("AeroDyn — Lethal AI & long-term business".to_owned()),
            question: Some(
                "What happens to our long-term business if we heavily invest in lethal AI?"
                    .to_owned(),
            ),
            horizon: Some(120.0),
        }),
        stocks: [
            ("LethalAIVis", "Lethal AI visibility", 20.0),
            ("Backlash", "Public / ethical backlash", 15.0),
            ("Regulation", "Regulatory pressure", 25.0),
            ("Reputation", "Reputation (license to operate)", 55.0),
            ("Contracts", "Contract pipeline (value at stake)", 40.0),
        ]
        .into_iter()
        .map(|(id, name, initial)| Stock {
            source: Some("task force".to_owned()),
            ..stock(id, name, initial)
        })
        .collect(),
        flows: vec![
            tagged(
                flow(
                    "invest_visibility",
                    "Investment → visibility",
                    None,
                    Some("LethalAIVis"),
                    "invest_rate",
                ),
                "visibility",
                LoopType::Reinforcing,
                "6–12 mo",
                "R1",
            ),
            tagged(
                flow(
                    "visibility_decay",
                    "Visibility decay (diversification)",
                    Some("LethalAIVis"),
                    None,
                    "decay_vis * LethalAIVis",
                ),
                "visibility",
                LoopType::Balancing,
                "12–24 mo",
                "B1",
            ),
            tagged(
                flow(
                    "visibility_backlash",
                    "Visibility → backlash",
                    Some("LethalAIVis"),
                    Some("Backlash"),
                    "k_vis_back * LethalAIVis * (1 - Backlash / 100)",
                ),
                "backlash_loop",
                LoopType::Reinforcing,
                "3–6 mo",
                "R1",
            ),
            tagged(
                flow(
                    "backlash_decay",
                    "Backlash decay (media cycle)",
                    Some("Backlash"),
                    None,
                    "decay_back * Backlash",
                ),
                "backlash_loop",
                LoopType::Balancing,
                "6–12 mo",
                "B2",
            ),
            tagged(
                flow(
                    "backlash_regulation",
                    "Backlash → regulation",
                    Some("Backlash"),
                    Some("Regulation"),
                    "k_back_reg * Backlash * (1 - Regulation / 100)",
                ),
                "regulation_loop",
                LoopType::Reinforcing,
                "12–24 mo",
                "R1",
            ),
            tagged(
                flow(
                    "regulation_decay",
                    "Regulation decay (policy cycle)",
                    Some("Regulation"),
                    None,
                    "decay_reg * Regulation",
                ),
                "regulation_loop",
                LoopType::Balancing,
                "24+ mo",
                "B3",
            ),
            tagged(
                flow(
                    "backlash_reputation",
                    "Backlash erodes reputation",
                    Some("Reputation"),
                    None,
                    "k_back_rep * Backlash * Reputation / 100",
                ),
                "reputation_loop",
                LoopType::Reinforcing,
                "3–6 mo",
                "R2",
            ),
            tagged(
                flow(
                    "reputation_recovery",
                    "Reputation recovery (transparency, compliance)",
                    None,
                    Some("Reputation"),
                    "recovery_rate * (100 - Reputation) / 100",
                ),
                "reputation_loop",
                LoopType::Balancing,
                "12–24 mo",
                "B4",
            ),
            tagged(
                flow(
                    "reputation_contracts",
                    "Reputation → contract pipeline",
                    None,
                    Some("Contracts"),
                    "k_rep_cont * Reputation / 100 * base_contracts * ai_performance_sufficient",
                ),
                "contracts_loop",
                LoopType::Reinforcing,
                "6–12 mo",
                "R3",
            ),
            tagged(
                flow(
                    "regulation_contracts",
                    "Regulation constrains contracts",
                    Some("Contracts"),
                    None,
                    "k_reg_cont * Regulation / 100 * Contracts / 100",
                ),
                "regulation_loop",
                LoopType::Reinforcing,
                "12–24 mo",
                "R1",
            ),
            tagged(
                flow(
                    "contracts_fulfill",
                    "Contracts fulfilled (delivery)",
                    Some("Contracts"),
                    None,
                    "fulfill_rate * Contracts / 100",
                ),
                "contracts_loop",
                LoopType::Balancing,
                "24+ mo",
                "B5",
            ),
        ],
        parameters: vec![
            param("invest_rate", "Investment → visibility", 1.2),
            param("decay_vis", "Visibility decay", 0.03),
            param("k_vis_back", "Visibility → backlash", 0.15),
            param("decay_back", "Backlash decay", 0.05),
            param("k_back_reg", "Backlash → regulation", 0.12),
            param("decay_reg", "Regulation decay", 0.02),
            param("k_back_rep", "Backlash → reputation erosion", 0.08),
            param("recovery_rate", "Reputation recovery", 2.0),
            param("k_rep_cont", "Reputation → contracts", 0.5),
            param("k_reg_cont", "Regulation → contract loss", 0.06),
            param("base_contracts", "Base contract inflow", 15.0),
            param("fulfill_rate", "Contract fulfillment", 0.04),
            param(
                "ai_performance_sufficient",
                "AI performance sufficient (0–1)",
                1.0,
            ),
        ],
        loops: vec![
            feedback(
                "R1",
                "Backlash spiral",
                LoopType::Reinforcing,
                "More lethal AI visibility → more public backlash → stricter regulation → constraints on contracts (and pressure toward secrecy). Reinforcing: amplifies over time.",
                &[
                    "invest_visibility",
                    "visibility_backlash",
                    "backlash_regulation",
                    "regulation_contracts",
                ],
                "3–24 mo (visibility to backlash fast; backlash to regulation slower).",
            ),
            feedback(
                "R2",
                "Backlash erodes reputation",
                LoopType::Reinforcing,
                "More backlash → reputation falls → less license to operate. Reinforcing: vicious cycle.",
                &["backlash_reputation"],
                "3–6 mo.",
            ),
            feedback(
                "R3",
                "Reputation builds contracts",
                LoopType::Reinforcing,
                "Better reputation → more contract pipeline (scaled by AI performance sufficiency). Reinforcing: success breeds success.",
                &["reputation_contracts"],
                "6–12 mo.",
            ),
            feedback(
                "B1",
                "Diversification (visibility decay)",
                LoopType::Balancing,
                "Diversify portfolio → lethal AI visibility decays. Balancing: dampens the backlash spiral.",
                &["visibility_decay"],
                "12–24 mo.",
            ),
            feedback(
                "B2",
                "Media cycle (backlash decay)",
                LoopType::Balancing,
                "Public attention fades → backlash decays. Balancing: limits sustained pressure.",
                &["backlash_decay"],
                "6–12 mo.",
            ),
            feedback(
                "B3",
                "Policy cycle (regulation decay)",
                LoopType::Balancing,
                "Policy cycle turns → regulation eases over time. Balancing: limits permanent constraint.",
                &["regulation_decay"],
                "24+ mo.",
            ),
            feedback(
                "B4",
                "Reputation recovery",
                LoopType::Balancing,
                "Transparency, compliance, public education → reputation recovers. Balancing: counters backlash erosion.",
                &["reputation_recovery"],
                "12–24 mo.",
            ),
            feedback(
                "B5",
                "Contract fulfillment",
                LoopType::Balancing,
                "Delivery → contract pipeline drains. Balancing: normal business flow.",
                &["contracts_fulfill"],
                "24+ mo.",
            ),
        ],
        clusters: vec![
            cluster("C1", "Visibility & backlash", &["LethalAIVis", "Backlash"]),
            cluster("C2", "Regulatory pressure", &["Regulation"]),
            cluster(
                "C3",
                "Reputation & contracts",
                &["Reputation", "Contracts"],
            ),
        ],
    }
}
