//! Global search for joint fits where the local chain gets stuck in a poor
//! basin.
//!
//! Two strategies share the batch objective: basin-hopping (random jump,
//! local L-BFGS-B, Metropolis acceptance) and CMA-ES seeded at the initial
//! guess followed by an L-BFGS-B polish.

use crate::calibration::config::{CalibrationConfig, GlobalMethod};
use crate::calibration::objective::{QuoteObjective, INVALID_OBJECTIVE};
use crate::calibration::pipeline::{batch_result, lbfgsb_minimize, StageOutcome};
use crate::calibration::types::{BatchCalibration, OptionQuote, Optimizer, ParameterBounds};
use crate::error::StageError;
use crate::model_params::HestonParameters;
use crate::models::traits::PricingEngine;
use crate::optim::{project, projected_gradient, LocalConfig};
use cmaes_lbfgsb::cmaes::{canonical_cmaes_optimize, CmaesCanonicalConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Joint calibrator driven by [`GlobalConfig`](crate::calibration::config::GlobalConfig).
pub struct GlobalCalibrator<'e> {
    engine: &'e dyn PricingEngine,
    config: CalibrationConfig,
}

impl<'e> GlobalCalibrator<'e> {
    pub fn new(engine: &'e dyn PricingEngine, config: CalibrationConfig) -> Self {
        Self { engine, config }
    }

    /// Fit one shared parameter vector to `quotes`.
    pub fn calibrate(&self, quotes: &[OptionQuote], initial: &HestonParameters) -> BatchCalibration {
        let bounds = self.config.bounds.bounds_for(initial);
        let objective = QuoteObjective::new(self.engine, quotes);
        let obj_fn = |x: &[f64]| objective.value(x);

        let mut x0 = initial.to_vec();
        bounds.project(&mut x0);

        let (optimizer, run) = match self.config.global.method {
            GlobalMethod::BasinHopping => (
                Optimizer::BasinHopping,
                basin_hopping(&obj_fn, &x0, &bounds, &self.config),
            ),
            GlobalMethod::CmaEs => (
                Optimizer::CmaEs,
                cmaes_search(&obj_fn, &x0, &bounds, &self.config),
            ),
        };

        match run {
            Ok(outcome) => {
                tracing::info!(
                    %optimizer,
                    objective = outcome.objective,
                    quotes = quotes.len(),
                    "global calibration finished"
                );
                batch_result(self.engine, quotes, optimizer, &outcome)
            }
            Err(e) => {
                tracing::warn!(%optimizer, error = %e, "global calibration failed");
                BatchCalibration::failed(quotes)
            }
        }
    }
}

/// Basin-hopping over the box.
///
/// Each hop perturbs the current point uniformly by up to `step_size` times
/// the bound width per coordinate, minimizes locally and accepts the new
/// minimum with probability `min(1, exp(-(f_new - f_cur) / temperature))`.
pub fn basin_hopping<F>(
    objective: &F,
    x0: &[f64],
    bounds: &ParameterBounds,
    config: &CalibrationConfig,
) -> Result<StageOutcome, StageError>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    let global = &config.global;
    let box_vec = bounds.to_vec();
    let mut rng = StdRng::seed_from_u64(global.seed);

    let (mut current_x, mut current_f) = local_minimum(objective, x0, &box_vec, config);
    let (mut best_x, mut best_f) = (current_x.clone(), current_f);
    let mut hops = 0;

    for hop in 0..global.iterations {
        if best_f <= config.objective_floor {
            break;
        }
        hops = hop + 1;

        let trial: Vec<f64> = current_x
            .iter()
            .zip(&box_vec)
            .map(|(x, (lo, hi))| {
                let jump = rng.gen_range(-1.0..=1.0) * global.step_size * (hi - lo);
                (x + jump).clamp(*lo, *hi)
            })
            .collect();
        let (trial_x, trial_f) = local_minimum(objective, &trial, &box_vec, config);

        let accept = trial_f < current_f || {
            let u: f64 = rng.gen();
            u < (-(trial_f - current_f) / global.temperature).exp()
        };
        tracing::trace!(hop, trial = trial_f, current = current_f, best = best_f, accept, "basin hop");

        if accept {
            current_x = trial_x;
            current_f = trial_f;
            if current_f < best_f {
                best_x = current_x.clone();
                best_f = current_f;
            }
        }
    }

    if !best_f.is_finite() || best_f >= INVALID_OBJECTIVE {
        return Err(StageError::Infeasible { objective: best_f });
    }
    Ok(StageOutcome {
        x: best_x,
        objective: best_f,
        iterations: Some(hops),
    })
}

/// Local step of basin-hopping and the CMA-ES polish: L-BFGS-B, continued
/// with projected gradient when the backend errors or stops short of a
/// stationary point. Always returns a point inside the box.
fn local_minimum<F>(objective: &F, x0: &[f64], bounds: &[(f64, f64)], config: &CalibrationConfig) -> (Vec<f64>, f64)
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    let local = LocalConfig {
        max_iterations: config.global.local_max_iterations,
        tolerance: config.tolerance,
        objective_floor: config.objective_floor,
        fd_step: config.fd_step,
        ..LocalConfig::default()
    };

    let start = match lbfgsb_minimize(objective, x0, bounds, &local) {
        Ok(minimum) if minimum.converged => return (minimum.x, minimum.objective),
        Ok(minimum) => {
            tracing::trace!(objective = minimum.objective, "local L-BFGS-B stopped early, continuing");
            minimum.x
        }
        Err(e) => {
            tracing::debug!(error = %e, "local L-BFGS-B failed, using projected gradient");
            x0.to_vec()
        }
    };

    let minimum = projected_gradient(objective, &start, bounds, &local);
    let mut x = minimum.x;
    project(&mut x, bounds);
    let mut value = objective(&x);

    let mut fallback = start;
    project(&mut fallback, bounds);
    let fallback_value = objective(&fallback);
    if fallback_value < value || !value.is_finite() {
        x = fallback;
        value = fallback_value;
    }
    (x, value)
}

/// CMA-ES centred on `x0`, then local refinement of its best point.
pub fn cmaes_search<F>(
    objective: &F,
    x0: &[f64],
    bounds: &ParameterBounds,
    config: &CalibrationConfig,
) -> Result<StageOutcome, StageError>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    let global = &config.global;
    let box_vec = bounds.to_vec();

    let cmaes_config = CmaesCanonicalConfig {
        population_size: global.pop_size,
        max_generations: global.max_gen,
        seed: global.seed,
        c1: None,
        c_mu: None,
        c_sigma: None,
        d_sigma: None,
        parallel_eval: config.parallel,
        verbosity: 0,
        ipop_restarts: 0,
        ipop_increase_factor: 2.0,
        bipop_restarts: global.bipop_restarts,
        total_evals_budget: global.total_evals_budget,
        use_subrun_budgeting: false,
        alpha_mu: None,
        hsig_threshold_factor: None,
        bipop_small_population_factor: None,
        bipop_small_budget_factor: None,
        bipop_large_budget_factor: None,
        bipop_large_pop_increase_factor: None,
        max_bound_iterations: None,
        eig_precision_threshold: None,
        min_eig_value: None,
        matrix_op_threshold: None,
        stagnation_limit: None,
        min_sigma: None,
    };

    let search = catch_unwind(AssertUnwindSafe(|| {
        canonical_cmaes_optimize(
            |x: &[f64]| objective(x),
            &box_vec,
            cmaes_config,
            Some(x0.to_vec()),
        )
    }))
    .map_err(|_| StageError::Backend("CMA-ES panicked".to_string()))?;

    let (_, mut best_x) = search.best_solution;
    bounds.project(&mut best_x);
    let mut best_f = objective(&best_x);
    tracing::debug!(objective = best_f, "CMA-ES finished, refining with L-BFGS-B");

    let (x, value) = local_minimum(objective, &best_x, &box_vec, config);
    if value < best_f || !best_f.is_finite() {
        tracing::debug!(before = best_f, after = value, "local refinement improved objective");
        best_x = x;
        best_f = value;
    }

    if !best_f.is_finite() || best_f >= INVALID_OBJECTIVE {
        return Err(StageError::Infeasible { objective: best_f });
    }
    Ok(StageOutcome {
        x: best_x,
        objective: best_f,
        iterations: Some(global.max_gen),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::config::GlobalConfig;

    fn bounds() -> ParameterBounds {
        ParameterBounds::for_initial_guess(&HestonParameters::seeded(0.2))
    }

    /// Two basins in v0: a shallow one near 0.15 and the global one at 0.8.
    fn double_well(x: &[f64]) -> f64 {
        let v = x[0];
        let wells = 50.0 * (v - 0.15).powi(2) * (v - 0.8).powi(2) + 0.05 * (v - 0.8).powi(2);
        wells + (x[1] - 1.0).powi(2) + (x[3] - 0.3).powi(2) + (x[4] + 0.5).powi(2)
    }

    fn config(method: GlobalMethod) -> CalibrationConfig {
        CalibrationConfig {
            global: GlobalConfig {
                method,
                iterations: 40,
                step_size: 0.5,
                ..GlobalConfig::default()
            },
            ..CalibrationConfig::default()
        }
    }

    #[test]
    fn test_basin_hopping_is_reproducible() {
        let x0 = [0.05, 0.1, 0.04, 0.1, 0.1];
        let cfg = config(GlobalMethod::BasinHopping);
        let a = basin_hopping(&double_well, &x0, &bounds(), &cfg).unwrap();
        let b = basin_hopping(&double_well, &x0, &bounds(), &cfg).unwrap();
        assert_eq!(a, b, "same seed must give the same search path");
    }

    #[test]
    fn test_basin_hopping_stays_in_bounds() {
        let x0 = [0.05, 0.1, 0.04, 0.1, 0.1];
        let outcome = basin_hopping(&double_well, &x0, &bounds(), &config(GlobalMethod::BasinHopping)).unwrap();
        assert!(bounds().violation(&outcome.x).is_none(), "{:?}", outcome.x);
        assert!(outcome.objective <= double_well(&x0));
    }

    #[test]
    fn test_infeasible_everywhere() {
        let x0 = [0.05, 0.1, 0.04, 0.1, 0.1];
        let flat = |_: &[f64]| INVALID_OBJECTIVE;
        let mut cfg = config(GlobalMethod::BasinHopping);
        cfg.global.iterations = 3;
        let err = basin_hopping(&flat, &x0, &bounds(), &cfg).unwrap_err();
        assert!(matches!(err, StageError::Infeasible { .. }));
    }
}
