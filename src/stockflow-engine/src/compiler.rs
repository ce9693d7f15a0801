// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Lowers parsed rate expressions into slot-addressed form and bundles a
//! schema's active flows into the right-hand side of an ODE system.
//!
//! Lowering is where name resolution and builtin checking happen: after
//! [`OdeSystem::new`] returns, every identifier is an offset into either
//! the state vector or the parameter table, and the only errors left to
//! surface at evaluation time are numeric ones like division by zero.

use std::collections::HashMap;

use float_cmp::approx_eq;

use crate::ast;
use crate::ast::{BinaryOp, UnaryOp};
use crate::builtins::{BuiltinFn, Loc, UntypedBuiltinFn};
use crate::common::{ExpressionResult, Ident, Result};
use crate::datamodel::Schema;
use crate::parser;
use crate::{eqn_err, schema_err, sim_err};

pub(crate) fn is_truthy(n: f64) -> bool {
    let is_false = approx_eq!(f64, n, 0.0);
    !is_false
}

/// A rate expression with every identifier resolved to a table offset.
///
/// `Stock` offsets index the state vector passed to [`OdeSystem::deriv`];
/// `Param` offsets index the constant table captured at build time.
#[derive(PartialEq, Clone, Debug)]
pub(crate) enum Expr {
    Const(f64),
    Stock(usize),
    Param(usize),
    App(BuiltinFn<Expr>),
    Op1(UnaryOp, Box<Expr>),
    Op2(BinaryOp, Box<Expr>, Box<Expr>, Loc),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
}

struct ExprContext<'a> {
    stock_offsets: &'a HashMap<Ident, usize>,
    param_offsets: &'a HashMap<Ident, usize>,
}

impl ExprContext<'_> {
    fn lower(&self, expr: ast::Expr) -> ExpressionResult<Expr> {
        let expr = match expr {
            ast::Expr::Const(_, n, _loc) => Expr::Const(n),
            ast::Expr::Var(id, loc) => {
                if let Some(off) = self.stock_offsets.get(&id) {
                    Expr::Stock(*off)
                } else if let Some(off) = self.param_offsets.get(&id) {
                    Expr::Param(*off)
                } else {
                    return eqn_err!(UnknownDependency, loc.start, loc.end);
                }
            }
            ast::Expr::App(UntypedBuiltinFn(func, orig_args), loc) => {
                let args: ExpressionResult<Vec<Expr>> =
                    orig_args.into_iter().map(|arg| self.lower(arg)).collect();
                let mut args = args?;

                macro_rules! check_arity {
                    ($builtin_fn:tt, 1) => {{
                        if args.len() != 1 {
                            return eqn_err!(BadBuiltinArgs, loc.start, loc.end);
                        }

                        let a = args.remove(0);
                        BuiltinFn::$builtin_fn(Box::new(a))
                    }};
                    ($builtin_fn:tt, 2) => {{
                        if args.len() != 2 {
                            return eqn_err!(BadBuiltinArgs, loc.start, loc.end);
                        }

                        let b = args.remove(1);
                        let a = args.remove(0);
                        BuiltinFn::$builtin_fn(Box::new(a), Box::new(b))
                    }};
                    ($builtin_fn:tt, 3) => {{
                        if args.len() != 3 {
                            return eqn_err!(BadBuiltinArgs, loc.start, loc.end);
                        }

                        let c = args.remove(2);
                        let b = args.remove(1);
                        let a = args.remove(0);
                        BuiltinFn::$builtin_fn(Box::new(a), Box::new(b), Box::new(c))
                    }};
                    ($builtin_fn:tt, 2, 3) => {{
                        if args.len() == 2 {
                            let b = args.remove(1);
                            let a = args.remove(0);
                            BuiltinFn::$builtin_fn(Box::new(a), Box::new(b), None)
                        } else if args.len() == 3 {
                            let c = args.remove(2);
                            let b = args.remove(1);
                            let a = args.remove(0);
                            BuiltinFn::$builtin_fn(Box::new(a), Box::new(b), Some(Box::new(c)))
                        } else {
                            return eqn_err!(BadBuiltinArgs, loc.start, loc.end);
                        }
                    }};
                }

                let builtin = match func.as_str() {
                    "abs" => check_arity!(Abs, 1),
                    "exp" => check_arity!(Exp, 1),
                    "ln" => check_arity!(Ln, 1),
                    "log10" => check_arity!(Log10, 1),
                    "sqrt" => check_arity!(Sqrt, 1),
                    "min" => check_arity!(Min, 2),
                    "max" => check_arity!(Max, 2),
                    "clip" => check_arity!(Clip, 3),
                    "safediv" => check_arity!(SafeDiv, 2, 3),
                    _ => {
                        return eqn_err!(UnknownBuiltin, loc.start, loc.end);
                    }
                };
                Expr::App(builtin)
            }
            ast::Expr::Op1(op, l, _loc) => Expr::Op1(op, Box::new(self.lower(*l)?)),
            ast::Expr::Op2(op, l, r, loc) => Expr::Op2(
                op,
                Box::new(self.lower(*l)?),
                Box::new(self.lower(*r)?),
                loc,
            ),
            ast::Expr::If(cond, t, f, _loc) => Expr::If(
                Box::new(self.lower(*cond)?),
                Box::new(self.lower(*t)?),
                Box::new(self.lower(*f)?),
            ),
        };
        Ok(expr)
    }
}

fn eval(expr: &Expr, y: &[f64], params: &[f64]) -> ExpressionResult<f64> {
    let result = match expr {
        Expr::Const(n) => *n,
        Expr::Stock(off) => y[*off],
        Expr::Param(off) => params[*off],
        Expr::App(builtin) => match builtin {
            BuiltinFn::Abs(a) => eval(a, y, params)?.abs(),
            BuiltinFn::Exp(a) => eval(a, y, params)?.exp(),
            BuiltinFn::Ln(a) => eval(a, y, params)?.ln(),
            BuiltinFn::Log10(a) => eval(a, y, params)?.log10(),
            BuiltinFn::Sqrt(a) => eval(a, y, params)?.sqrt(),
            BuiltinFn::Min(a, b) => {
                let a = eval(a, y, params)?;
                let b = eval(b, y, params)?;
                // can't use std::cmp::min, f64 is only PartialOrd
                if a < b { a } else { b }
            }
            BuiltinFn::Max(a, b) => {
                let a = eval(a, y, params)?;
                let b = eval(b, y, params)?;
                if a > b { a } else { b }
            }
            BuiltinFn::Clip(x, lo, hi) => {
                let x = eval(x, y, params)?;
                let lo = eval(lo, y, params)?;
                let hi = eval(hi, y, params)?;
                let x = if x < lo { lo } else { x };
                if x > hi { hi } else { x }
            }
            BuiltinFn::SafeDiv(a, b, default) => {
                let a = eval(a, y, params)?;
                let b = eval(b, y, params)?;
                if b != 0.0 {
                    a / b
                } else if let Some(c) = default {
                    eval(c, y, params)?
                } else {
                    0.0
                }
            }
        },
        Expr::Op1(op, l) => {
            let l = eval(l, y, params)?;
            match op {
                UnaryOp::Positive => l,
                UnaryOp::Negative => -l,
                UnaryOp::Not => (!is_truthy(l)) as i8 as f64,
            }
        }
        Expr::Op2(op, l, r, loc) => {
            let l = eval(l, y, params)?;
            let r = eval(r, y, params)?;
            match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Exp => l.powf(r),
                BinaryOp::Mul => l * r,
                BinaryOp::Div => {
                    if r == 0.0 {
                        return eqn_err!(DivisionByZero, loc.start, loc.end);
                    }
                    l / r
                }
                BinaryOp::Mod => {
                    if r == 0.0 {
                        return eqn_err!(DivisionByZero, loc.start, loc.end);
                    }
                    l.rem_euclid(r)
                }
                BinaryOp::Gt => (l > r) as i8 as f64,
                BinaryOp::Lt => (l < r) as i8 as f64,
                BinaryOp::Gte => (l >= r) as i8 as f64,
                BinaryOp::Lte => (l <= r) as i8 as f64,
                BinaryOp::Eq => approx_eq!(f64, l, r) as i8 as f64,
                BinaryOp::Neq => (!approx_eq!(f64, l, r)) as i8 as f64,
                BinaryOp::And => (is_truthy(l) && is_truthy(r)) as i8 as f64,
                BinaryOp::Or => (is_truthy(l) || is_truthy(r)) as i8 as f64,
            }
        }
        Expr::If(cond, t, f) => {
            let cond = eval(cond, y, params)?;
            if is_truthy(cond) {
                eval(t, y, params)?
            } else {
                eval(f, y, params)?
            }
        }
    };
    Ok(result)
}

/// A flow whose rate has been lowered and whose endpoints are state slots.
#[derive(PartialEq, Clone, Debug)]
struct CompiledFlow {
    id: Ident,
    rate: String,
    from: Option<usize>,
    to: Option<usize>,
    expr: Expr,
}

/// A validated, compiled schema: initial conditions plus a derivative
/// function over the stock vector.
///
/// Stocks occupy state slots in declaration order.  Each active flow is
/// evaluated exactly once per derivative call and its rate is applied
/// signed: subtracted at `from`, added at `to`.  Rates are never clamped,
/// so a negative rate moves material backwards along the arc.
#[derive(PartialEq, Clone, Debug)]
pub struct OdeSystem {
    stock_ids: Vec<Ident>,
    initials: Vec<f64>,
    params: Vec<f64>,
    flows: Vec<CompiledFlow>,
}

impl OdeSystem {
    /// Validate `schema` and compile its flows, skipping any flow whose
    /// mechanism tag appears in `excluded_mechanisms`.
    ///
    /// Excluded flows are dropped before parsing, so the resulting system
    /// is indistinguishable from one built from a schema with those flows
    /// removed.
    pub fn new(schema: &Schema, excluded_mechanisms: &[String]) -> Result<OdeSystem> {
        schema.validate()?;

        if schema.stocks.is_empty() {
            return schema_err!(NotSimulatable, "schema has no stocks".to_string());
        }

        let stock_offsets = schema.stock_offsets();
        let param_offsets: HashMap<Ident, usize> = schema
            .parameters
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();
        let ctx = ExprContext {
            stock_offsets: &stock_offsets,
            param_offsets: &param_offsets,
        };

        let mut flows: Vec<CompiledFlow> = Vec::with_capacity(schema.flows.len());
        for flow in schema.flows.iter() {
            if let Some(mechanism) = flow.mechanism.as_deref() {
                if excluded_mechanisms.iter().any(|m| m.as_str() == mechanism) {
                    continue;
                }
            }

            let ast = match parser::parse(&flow.rate) {
                Ok(Some(ast)) => ast,
                Ok(None) => {
                    return schema_err!(
                        EmptyEquation,
                        format!("flow '{}' has an empty rate", flow.id)
                    );
                }
                Err(errors) => {
                    let errors: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
                    return schema_err!(
                        BadRateExpression,
                        format!("flow '{}': {} in '{}'", flow.id, errors.join("; "), flow.rate)
                    );
                }
            };
            let expr = match ctx.lower(ast) {
                Ok(expr) => expr,
                Err(err) => {
                    return schema_err!(
                        BadRateExpression,
                        format!("flow '{}': {} in '{}'", flow.id, err, flow.rate)
                    );
                }
            };

            let from = flow.from.as_ref().map(|id| stock_offsets[id.as_str()]);
            let to = flow.to.as_ref().map(|id| stock_offsets[id.as_str()]);
            // both endpoints unattached: the rate was worth checking above,
            // but the flow can't move anything
            if from.is_none() && to.is_none() {
                continue;
            }

            flows.push(CompiledFlow {
                id: flow.id.clone(),
                rate: flow.rate.clone(),
                from,
                to,
                expr,
            });
        }

        Ok(OdeSystem {
            stock_ids: schema.stocks.iter().map(|s| s.id.clone()).collect(),
            initials: schema.stocks.iter().map(|s| s.initial).collect(),
            params: schema.parameters.iter().map(|p| p.value).collect(),
            flows,
        })
    }

    pub fn n_stocks(&self) -> usize {
        self.initials.len()
    }

    /// Stock ids in state-slot order.
    pub fn stock_ids(&self) -> &[Ident] {
        &self.stock_ids
    }

    /// The initial condition vector, one slot per stock.
    pub fn initials(&self) -> &[f64] {
        &self.initials
    }

    /// Evaluate dy/dt at `(t, y)` into `dydt`.
    ///
    /// A rate expression that fails to evaluate aborts the whole call; no
    /// partial derivative vector is ever returned.
    pub fn deriv(&self, t: f64, y: &[f64], dydt: &mut [f64]) -> Result<()> {
        debug_assert_eq!(self.initials.len(), y.len());
        debug_assert_eq!(self.initials.len(), dydt.len());

        dydt.fill(0.0);
        for flow in self.flows.iter() {
            let rate = match eval(&flow.expr, y, &self.params) {
                Ok(rate) => rate,
                Err(err) => {
                    return sim_err!(
                        RateEvaluationFailed,
                        format!("flow '{}' at t≈{}: {} in '{}'", flow.id, t, err, flow.rate)
                    );
                }
            };
            if let Some(from) = flow.from {
                dydt[from] -= rate;
            }
            if let Some(to) = flow.to {
                dydt[to] += rate;
            }
        }
        Ok(())
    }
}
