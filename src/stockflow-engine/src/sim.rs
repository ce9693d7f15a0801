// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Adaptive integration of a compiled [`OdeSystem`] over a save grid.
//!
//! The stepper is the Dormand-Prince 5(4) embedded Runge-Kutta pair.
//! Steps are clipped so the solver lands exactly on every save point;
//! saved values are solver states, never interpolants.  The step
//! sequence is fully deterministic for fixed inputs.

use smallvec::{SmallVec, smallvec};

use crate::common::{Ident, Result};
use crate::compiler::OdeSystem;
use crate::datamodel::Schema;
use crate::results::{Results, TIME_OFF};
use crate::sim_err;

/// Stage buffers live on the stack for models up to this many stocks.
type StateVec = SmallVec<[f64; 16]>;

/// Magnitude past which a stock's series is reported as divergent.
pub const DIVERGENCE_THRESHOLD: f64 = 1e10;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.0;

// guards against degenerate specs like a microscopic save_step over a
// huge horizon
const MAX_GRID_POINTS: usize = 1 << 20;

/// Integration settings.  `horizon` and `save_step` fix the output grid;
/// the tolerances and `max_step` steer the adaptive stepper.
#[derive(PartialEq, Clone, Copy, Debug)]
pub struct SimSpecs {
    pub horizon: f64,
    pub save_step: f64,
    pub rel_tol: f64,
    pub abs_tol: f64,
    pub max_step: f64,
}

impl Default for SimSpecs {
    fn default() -> SimSpecs {
        SimSpecs {
            horizon: 100.0,
            save_step: 1.0,
            rel_tol: 1e-3,
            abs_tol: 1e-6,
            max_step: 1.0,
        }
    }
}

impl SimSpecs {
    pub fn new(horizon: f64) -> SimSpecs {
        SimSpecs {
            horizon,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("horizon", self.horizon),
            ("save_step", self.save_step),
            ("rel_tol", self.rel_tol),
            ("abs_tol", self.abs_tol),
            ("max_step", self.max_step),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return sim_err!(
                    BadSimSpecs,
                    format!("{name} must be positive and finite, got {value}")
                );
            }
        }
        // the ratio may overflow to +Inf; compare in f64 before any cast
        let ratio = (self.horizon / self.save_step).floor();
        if ratio >= MAX_GRID_POINTS as f64 {
            return sim_err!(
                BadSimSpecs,
                format!(
                    "save grid for horizon {} at save_step {} is over {MAX_GRID_POINTS} points",
                    self.horizon, self.save_step
                )
            );
        }
        Ok(())
    }

    /// Number of rows in the save grid: every multiple of `save_step`
    /// in `[0, horizon]`, never a point past the horizon.  In range
    /// whenever [`Self::validate`] passes; saturates rather than wraps
    /// for specs it would reject.
    pub fn n_points(&self) -> usize {
        ((self.horizon / self.save_step).floor() as usize).saturating_add(1)
    }
}

/// Dormand-Prince 5(4) stepper with preallocated stage buffers.
struct Rk45 {
    k1: StateVec,
    k2: StateVec,
    k3: StateVec,
    k4: StateVec,
    k5: StateVec,
    k6: StateVec,
    k7: StateVec,
    y_new: StateVec,
    tmp: StateVec,
}

impl Rk45 {
    fn new(dim: usize) -> Self {
        Self {
            k1: smallvec![0.0; dim],
            k2: smallvec![0.0; dim],
            k3: smallvec![0.0; dim],
            k4: smallvec![0.0; dim],
            k5: smallvec![0.0; dim],
            k6: smallvec![0.0; dim],
            k7: smallvec![0.0; dim],
            y_new: smallvec![0.0; dim],
            tmp: smallvec![0.0; dim],
        }
    }

    /// Attempt a single step of size `dt` from `(t, y)`.
    ///
    /// On success the candidate state is left in `self.y_new` and the
    /// scaled error norm is returned; the caller decides acceptance.
    /// A rate evaluation failure in any stage aborts the step.
    fn step(
        &mut self,
        system: &OdeSystem,
        t: f64,
        y: &[f64],
        dt: f64,
        rel_tol: f64,
        abs_tol: f64,
    ) -> Result<f64> {
        // Dormand-Prince coefficients
        let c2 = 1.0 / 5.0;
        let c3 = 3.0 / 10.0;
        let c4 = 4.0 / 5.0;
        let c5 = 8.0 / 9.0;

        let a21 = 1.0 / 5.0;

        let a31 = 3.0 / 40.0;
        let a32 = 9.0 / 40.0;

        let a41 = 44.0 / 45.0;
        let a42 = -56.0 / 15.0;
        let a43 = 32.0 / 9.0;

        let a51 = 19372.0 / 6561.0;
        let a52 = -25360.0 / 2187.0;
        let a53 = 64448.0 / 6561.0;
        let a54 = -212.0 / 729.0;

        let a61 = 9017.0 / 3168.0;
        let a62 = -355.0 / 33.0;
        let a63 = 46732.0 / 5247.0;
        let a64 = 49.0 / 176.0;
        let a65 = -5103.0 / 18656.0;

        // 5th order solution weights (also the k7 stage row)
        let b1 = 35.0 / 384.0;
        let b3 = 500.0 / 1113.0;
        let b4 = 125.0 / 192.0;
        let b5 = -2187.0 / 6784.0;
        let b6 = 11.0 / 84.0;

        // difference between the 5th and embedded 4th order weights
        let e1 = 71.0 / 57_600.0;
        let e3 = -71.0 / 16_695.0;
        let e4 = 71.0 / 1_920.0;
        let e5 = -17_253.0 / 339_200.0;
        let e6 = 22.0 / 525.0;
        let e7 = -1.0 / 40.0;

        // k1 = f(t, y)
        system.deriv(t, y, &mut self.k1)?;

        // k2
        for i in 0..y.len() {
            self.tmp[i] = y[i] + dt * (a21 * self.k1[i]);
        }
        system.deriv(t + c2 * dt, &self.tmp, &mut self.k2)?;

        // k3
        for i in 0..y.len() {
            self.tmp[i] = y[i] + dt * (a31 * self.k1[i] + a32 * self.k2[i]);
        }
        system.deriv(t + c3 * dt, &self.tmp, &mut self.k3)?;

        // k4
        for i in 0..y.len() {
            self.tmp[i] = y[i] + dt * (a41 * self.k1[i] + a42 * self.k2[i] + a43 * self.k3[i]);
        }
        system.deriv(t + c4 * dt, &self.tmp, &mut self.k4)?;

        // k5
        for i in 0..y.len() {
            self.tmp[i] = y[i]
                + dt * (a51 * self.k1[i] + a52 * self.k2[i] + a53 * self.k3[i] + a54 * self.k4[i]);
        }
        system.deriv(t + c5 * dt, &self.tmp, &mut self.k5)?;

        // k6
        for i in 0..y.len() {
            self.tmp[i] = y[i]
                + dt * (a61 * self.k1[i]
                    + a62 * self.k2[i]
                    + a63 * self.k3[i]
                    + a64 * self.k4[i]
                    + a65 * self.k5[i]);
        }
        system.deriv(t + dt, &self.tmp, &mut self.k6)?;

        // 5th order candidate
        for i in 0..y.len() {
            self.y_new[i] = y[i]
                + dt * (b1 * self.k1[i]
                    + b3 * self.k3[i]
                    + b4 * self.k4[i]
                    + b5 * self.k5[i]
                    + b6 * self.k6[i]);
        }
        system.deriv(t + dt, &self.y_new, &mut self.k7)?;

        // scaled RMS norm of the embedded error estimate
        let mut err_sq = 0.0;
        for i in 0..y.len() {
            let err_i = dt
                * (e1 * self.k1[i]
                    + e3 * self.k3[i]
                    + e4 * self.k4[i]
                    + e5 * self.k5[i]
                    + e6 * self.k6[i]
                    + e7 * self.k7[i]);
            let scale = abs_tol + rel_tol * y[i].abs().max(self.y_new[i].abs());
            let ratio = err_i / scale;
            err_sq += ratio * ratio;
        }
        Ok((err_sq / y.len() as f64).sqrt())
    }
}

/// Integrate `schema` from t=0 to `specs.horizon`, sampling every
/// `specs.save_step` time units.
///
/// Divergence never fails a run: non-finite or runaway values are left
/// in the series untouched and reported through [`Results::warnings`].
/// When the step controller underflows (a finite-time blow-up, say),
/// the remaining grid rows repeat the last computed state so the output
/// shape stays fixed.  Hard failures are invalid schemas or specs, and
/// rate expressions that fail to evaluate mid-integration.
pub fn simulate(
    schema: &Schema,
    specs: &SimSpecs,
    excluded_mechanisms: &[String],
) -> Result<Results> {
    specs.validate()?;
    let system = OdeSystem::new(schema, excluded_mechanisms)?;

    let n_points = specs.n_points();
    let dim = system.n_stocks();
    let step_size = dim + 1;
    let mut data = vec![0.0; n_points * step_size];
    let mut warnings: Vec<String> = vec![];

    let mut y = system.initials().to_vec();
    let mut t = 0.0_f64;
    let mut dt = specs.max_step.min(specs.save_step);
    let mut rk = Rk45::new(dim);

    let row = &mut data[0..step_size];
    row[TIME_OFF] = 0.0;
    row[1..].copy_from_slice(&y);

    let mut stalled_at: Option<f64> = None;
    for point in 1..n_points {
        let t_target = point as f64 * specs.save_step;

        while t < t_target {
            let min_step = 10.0 * f64::EPSILON * t.abs().max(1.0);
            let remaining = t_target - t;
            if remaining <= min_step {
                // sub-epsilon sliver left over from clipped steps
                t = t_target;
                break;
            }

            let dt_attempt = dt.min(specs.max_step).min(remaining);
            if dt_attempt <= min_step {
                stalled_at = Some(t);
                break;
            }

            let err_norm = rk.step(&system, t, &y, dt_attempt, specs.rel_tol, specs.abs_tol)?;
            if err_norm <= 1.0 {
                t += dt_attempt;
                y.copy_from_slice(&rk.y_new);
                let factor = (SAFETY * err_norm.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR);
                dt = dt_attempt * factor;
            } else {
                // a NaN error norm also lands here and shrinks hard
                let factor = if err_norm.is_finite() {
                    (SAFETY * err_norm.powf(-0.2)).clamp(MIN_FACTOR, 1.0)
                } else {
                    MIN_FACTOR
                };
                dt = dt_attempt * factor;
            }
        }

        if let Some(t_stall) = stalled_at {
            warnings.push(format!(
                "integration stalled at t≈{t_stall}; later samples repeat the last state"
            ));
            for p in point..n_points {
                let row = &mut data[p * step_size..(p + 1) * step_size];
                row[TIME_OFF] = p as f64 * specs.save_step;
                row[1..].copy_from_slice(&y);
            }
            break;
        }

        let row = &mut data[point * step_size..(point + 1) * step_size];
        row[TIME_OFF] = t_target;
        row[1..].copy_from_slice(&y);
    }

    let stock_ids: Vec<Ident> = system.stock_ids().to_vec();
    warnings.extend(scan_divergence(&stock_ids, &data, step_size));

    Ok(Results::new(
        stock_ids,
        data.into_boxed_slice(),
        n_points,
        warnings,
    ))
}

/// Scan saved series for non-finite or runaway values, one warning per
/// offending stock naming the earliest bad sample.  The data itself is
/// never modified.
pub(crate) fn scan_divergence(stock_ids: &[Ident], data: &[f64], step_size: usize) -> Vec<String> {
    let mut warnings = vec![];
    for (i, id) in stock_ids.iter().enumerate() {
        let off = i + 1;
        for row in data.chunks(step_size) {
            let t = row[TIME_OFF];
            let val = row[off];
            if val.is_nan() {
                warnings.push(format!("stock '{id}' diverged (NaN) at t≈{t}"));
                break;
            } else if val.is_infinite() {
                warnings.push(format!("stock '{id}' diverged (Inf) at t≈{t}"));
                break;
            } else if val.abs() > DIVERGENCE_THRESHOLD {
                warnings.push(format!(
                    "stock '{id}' exceeded {DIVERGENCE_THRESHOLD:e} at t≈{t}"
                ));
                break;
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ErrorCode, ErrorKind};
    use crate::testutils::{decay_schema, x_flow, x_param, x_schema, x_stock};

    #[test]
    fn decay_matches_analytic() {
        let specs = SimSpecs::new(10.0);
        let results = simulate(&decay_schema(), &specs, &[]).unwrap();

        assert_eq!(11, results.step_count);
        assert!(results.warnings.is_empty());

        let series: Vec<(f64, f64)> = results.series("S0").unwrap().collect();
        assert_eq!(0.0, series[0].0);
        assert_eq!(100.0, series[0].1);
        assert_eq!(10.0, series[10].0);

        let expected = 100.0 * (-1.0_f64).exp();
        assert!(
            (series[10].1 - expected).abs() < 0.05,
            "S0(10) = {}, expected ≈ {expected}",
            series[10].1
        );

        for pair in series.windows(2) {
            assert!(pair[1].1 < pair[0].1, "decay must be monotone");
        }
    }

    #[test]
    fn grid_never_passes_the_horizon() {
        let mut specs = SimSpecs::new(10.0);
        specs.save_step = 2.5;
        let results = simulate(&decay_schema(), &specs, &[]).unwrap();
        assert_eq!(
            vec![0.0, 2.5, 5.0, 7.5, 10.0],
            results.times().collect::<Vec<f64>>()
        );

        specs.save_step = 3.0;
        let results = simulate(&decay_schema(), &specs, &[]).unwrap();
        assert_eq!(
            vec![0.0, 3.0, 6.0, 9.0],
            results.times().collect::<Vec<f64>>()
        );

        specs.save_step = 20.0;
        let results = simulate(&decay_schema(), &specs, &[]).unwrap();
        assert_eq!(vec![0.0], results.times().collect::<Vec<f64>>());
    }

    #[test]
    fn repeated_runs_are_identical() {
        let specs = SimSpecs::new(25.0);
        let a = simulate(&decay_schema(), &specs, &[]).unwrap();
        let b = simulate(&decay_schema(), &specs, &[]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn runaway_growth_warns_without_failing() {
        let schema = x_schema(
            vec![x_stock("S0", 1000.0)],
            vec![x_flow("f1", None, Some("S0"), "k * S0 * S0")],
            vec![x_param("k", 0.01)],
        );
        let specs = SimSpecs::new(10.0);
        let results = simulate(&schema, &specs, &[]).unwrap();

        // dy/dt = 0.01 y^2 from 1000 blows up near t = 0.1
        assert_eq!(11, results.step_count);
        assert!(!results.warnings.is_empty());
        assert!(
            results.warnings.iter().any(|w| w.contains("'S0'")),
            "warnings should cite the diverging stock: {:?}",
            results.warnings
        );

        // the series itself is reported untouched
        let series: Vec<(f64, f64)> = results.series("S0").unwrap().collect();
        assert!(series[10].1 > DIVERGENCE_THRESHOLD);
    }

    #[test]
    fn stall_fills_remaining_grid_with_last_state() {
        // dy/dt = 0.01 y^2 from 1000 has a pole at t = 0.1; step
        // control underflows just short of it and the run stalls
        let schema = x_schema(
            vec![x_stock("S0", 1000.0)],
            vec![x_flow("f1", None, Some("S0"), "k * S0 * S0")],
            vec![x_param("k", 0.01)],
        );
        let specs = SimSpecs::new(10.0);
        let results = simulate(&schema, &specs, &[]).unwrap();

        assert_eq!(2, results.warnings.len());
        assert!(
            results.warnings[0].starts_with("integration stalled at t≈0."),
            "unexpected stall warning: {}",
            results.warnings[0]
        );
        assert!(results.warnings[0].ends_with("; later samples repeat the last state"));
        assert_eq!("stock 'S0' exceeded 1e10 at t≈1", results.warnings[1]);

        // the grid keeps its full shape, times included
        assert_eq!(
            (0..=10).map(|p| p as f64).collect::<Vec<f64>>(),
            results.times().collect::<Vec<f64>>()
        );

        // every row past the stall repeats the last accepted state
        let series: Vec<(f64, f64)> = results.series("S0").unwrap().collect();
        assert_eq!(1000.0, series[0].1);
        let last = series[10].1;
        assert!(last.is_finite() && last > DIVERGENCE_THRESHOLD);
        for (p, sample) in series.iter().enumerate().skip(1) {
            assert_eq!(last, sample.1, "row {p} should repeat the stalled state");
        }
    }

    #[test]
    fn bad_specs_are_rejected() {
        let schema = decay_schema();
        for specs in [
            SimSpecs::new(-1.0),
            SimSpecs::new(f64::NAN),
            SimSpecs {
                save_step: 0.0,
                ..SimSpecs::new(10.0)
            },
            SimSpecs {
                rel_tol: -1e-3,
                ..SimSpecs::new(10.0)
            },
        ] {
            let err = simulate(&schema, &specs, &[]).unwrap_err();
            assert_eq!(ErrorKind::Simulation, err.kind);
            assert_eq!(ErrorCode::BadSimSpecs, err.code);
        }
    }

    #[test]
    fn oversized_grid_is_rejected_not_built() {
        let schema = decay_schema();
        // positive and finite, so the per-field checks alone pass these
        for specs in [
            SimSpecs::new(1e20),
            SimSpecs {
                save_step: 1e-12,
                ..SimSpecs::new(10.0)
            },
            SimSpecs {
                horizon: 1e300,
                save_step: 1e-300,
                ..SimSpecs::default()
            },
        ] {
            let err = simulate(&schema, &specs, &[]).unwrap_err();
            assert_eq!(ErrorKind::Simulation, err.kind);
            assert_eq!(ErrorCode::BadSimSpecs, err.code);
        }

        // the count itself saturates instead of wrapping past the cast
        assert_eq!(usize::MAX, SimSpecs::new(1e20).n_points());
    }

    #[test]
    fn grid_cap_allows_exactly_max_points() {
        let just_under = SimSpecs {
            horizon: (MAX_GRID_POINTS - 1) as f64,
            ..SimSpecs::default()
        };
        just_under.validate().unwrap();
        assert_eq!(MAX_GRID_POINTS, just_under.n_points());

        let at_cap = SimSpecs {
            horizon: MAX_GRID_POINTS as f64,
            ..SimSpecs::default()
        };
        let err = at_cap.validate().unwrap_err();
        assert_eq!(ErrorCode::BadSimSpecs, err.code);
    }

    #[test]
    fn eval_failure_aborts_the_run() {
        let schema = x_schema(
            vec![x_stock("S0", 1.0)],
            vec![x_flow("f1", Some("S0"), None, "S0 / zero")],
            vec![x_param("zero", 0.0)],
        );
        let err = simulate(&schema, &SimSpecs::new(5.0), &[]).unwrap_err();
        assert_eq!(ErrorKind::Simulation, err.kind);
        assert_eq!(ErrorCode::RateEvaluationFailed, err.code);
    }

    #[test]
    fn exclusion_matches_removal_end_to_end() {
        let mut full = decay_schema();
        full.flows.push(crate::testutils::x_flow_mech(
            "f_extra",
            Some("S0"),
            None,
            "0.5 * S0",
            "visibility",
        ));
        let specs = SimSpecs::new(10.0);

        let excluded = vec!["visibility".to_string()];
        let with_exclusion = simulate(&full, &specs, &excluded).unwrap();
        let removed = simulate(&decay_schema(), &specs, &[]).unwrap();
        assert_eq!(removed, with_exclusion);

        // and the extra drain changes the answer when not excluded
        let with_extra = simulate(&full, &specs, &[]).unwrap();
        assert_ne!(removed, with_extra);

        // a tag no flow carries excludes nothing
        let unknown = vec!["no_such_mechanism".to_string()];
        assert_eq!(with_extra, simulate(&full, &specs, &unknown).unwrap());
    }

    #[test]
    fn scan_flags_earliest_offending_sample() {
        let ids = vec!["A".to_string(), "B".to_string()];
        #[rustfmt::skip]
        let data = vec![
            0.0, 1.0, 1.0,
            1.0, f64::NAN, 2e10,
            2.0, f64::NAN, f64::INFINITY,
        ];
        let warnings = scan_divergence(&ids, &data, 3);
        assert_eq!(2, warnings.len());
        assert_eq!("stock 'A' diverged (NaN) at t≈1", warnings[0]);
        assert_eq!("stock 'B' exceeded 1e10 at t≈1", warnings[1]);
    }

    #[test]
    fn scan_is_quiet_for_tame_series() {
        let ids = vec!["A".to_string()];
        let data = vec![0.0, 5.0, 1.0, -9.9e9];
        assert!(scan_divergence(&ids, &data, 2).is_empty());
    }
}
