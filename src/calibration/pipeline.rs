use crate::calibration::config::{CalibrationConfig, StageDescriptor};
use crate::calibration::objective::{self, QuoteObjective, INVALID_OBJECTIVE};
use crate::calibration::types::{BatchCalibration, CalibrationResult, OptionQuote, Optimizer, ParameterBounds};
use crate::error::StageError;
use crate::model_params::HestonParameters;
use crate::models::traits::PricingEngine;
use crate::optim::{
    bounded_sqp, gradient, kkt_residual, nelder_mead, project, projected_gradient, stalled, LocalConfig, Minimum,
};
use cmaes_lbfgsb::lbfgsb_optimize::{lbfgsb_optimize, LbfgsbConfig};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Box used when a stage runs with its bounds dropped.
const UNBOUNDED: (f64, f64) = (f64::MIN, f64::MAX);

/// Solution accepted from one fallback stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub x: Vec<f64>,
    pub objective: f64,
    /// Iterations used, when the backend reports them
    pub iterations: Option<usize>,
}

/// Fits Heston parameters by walking the configured fallback chain.
///
/// The calibrator never fails for numerical reasons: pricing faults become
/// the objective sentinel, stage faults advance the chain, and an exhausted
/// chain yields a result with `success == false`.
pub struct BoundedCalibrator<'e> {
    engine: &'e dyn PricingEngine,
    config: CalibrationConfig,
}

impl<'e> BoundedCalibrator<'e> {
    pub fn new(engine: &'e dyn PricingEngine, config: CalibrationConfig) -> Self {
        Self { engine, config }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Calibrate to a single quote starting from `initial`.
    pub fn calibrate(&self, quote: &OptionQuote, initial: &HestonParameters) -> CalibrationResult {
        let bounds = self.config.bounds.bounds_for(initial);
        let objective = QuoteObjective::single(self.engine, quote);
        let obj_fn = |x: &[f64]| objective.value(x);

        let mut x0 = initial.to_vec();
        bounds.project(&mut x0);

        let Some((optimizer, outcome)) = run_chain(&self.config, &obj_fn, &x0, &bounds) else {
            tracing::warn!(strike = quote.strike_price, t = quote.time_to_maturity, "all optimizers failed");
            return CalibrationResult::failed(quote);
        };

        let Some(params) = HestonParameters::from_slice(&outcome.x) else {
            return CalibrationResult::failed(quote);
        };
        match self.engine.price(&params, quote) {
            Ok(price) => CalibrationResult::succeeded(quote, params, optimizer, outcome.objective, price),
            Err(e) => {
                tracing::warn!(strike = quote.strike_price, error = %e, "calibrated parameters cannot be priced");
                CalibrationResult::failed(quote)
            }
        }
    }

    /// Calibrate every quote independently, returning results in input order.
    ///
    /// Runs on the rayon pool when the `parallel` feature is compiled in and
    /// the config enables it.
    pub fn calibrate_quotes(&self, quotes: &[OptionQuote], initial: &HestonParameters) -> Vec<CalibrationResult> {
        tracing::info!(quotes = quotes.len(), engine = self.engine.name(), "calibrating quotes");

        #[cfg(feature = "parallel")]
        let results: Vec<CalibrationResult> = if self.config.parallel {
            use rayon::prelude::*;
            quotes.par_iter().map(|q| self.calibrate(q, initial)).collect()
        } else {
            quotes.iter().map(|q| self.calibrate(q, initial)).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let results: Vec<CalibrationResult> = quotes.iter().map(|q| self.calibrate(q, initial)).collect();

        let failures = results.iter().filter(|r| !r.success).count();
        tracing::info!(quotes = quotes.len(), failures, "calibration finished");
        results
    }

    /// Fit one shared parameter vector to all `quotes` through the fallback chain.
    pub fn calibrate_joint(&self, quotes: &[OptionQuote], initial: &HestonParameters) -> BatchCalibration {
        let bounds = self.config.bounds.bounds_for(initial);
        let objective = QuoteObjective::new(self.engine, quotes);
        let obj_fn = |x: &[f64]| objective.value(x);

        let mut x0 = initial.to_vec();
        bounds.project(&mut x0);

        match run_chain(&self.config, &obj_fn, &x0, &bounds) {
            Some((optimizer, outcome)) => batch_result(self.engine, quotes, optimizer, &outcome),
            None => {
                tracing::warn!(quotes = quotes.len(), "all optimizers failed on the joint fit");
                BatchCalibration::failed(quotes)
            }
        }
    }
}

/// Runs the stages of `config` in order and returns the first success.
pub fn run_chain<F>(
    config: &CalibrationConfig,
    objective: &F,
    x0: &[f64],
    bounds: &ParameterBounds,
) -> Option<(Optimizer, StageOutcome)>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    for stage in &config.stages {
        tracing::debug!(
            optimizer = %stage.optimizer,
            bounded = stage.bounded,
            max_iterations = stage.max_iterations,
            "attempting stage"
        );
        match attempt_stage(stage, config, objective, x0, bounds) {
            Ok(outcome) => {
                tracing::debug!(optimizer = %stage.optimizer, objective = outcome.objective, "stage succeeded");
                return Some((stage.optimizer, outcome));
            }
            Err(e) => tracing::debug!(optimizer = %stage.optimizer, error = %e, "stage failed"),
        }
    }
    None
}

/// Runs one stage from `x0` and checks its solution.
pub fn attempt_stage<F>(
    stage: &StageDescriptor,
    config: &CalibrationConfig,
    objective: &F,
    x0: &[f64],
    bounds: &ParameterBounds,
) -> Result<StageOutcome, StageError>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    let box_vec = if stage.bounded {
        bounds.to_vec()
    } else {
        vec![UNBOUNDED; x0.len()]
    };
    let local = LocalConfig {
        max_iterations: stage.max_iterations,
        tolerance: config.tolerance,
        objective_floor: config.objective_floor,
        fd_step: config.fd_step,
        ..LocalConfig::default()
    };

    let minimum = match stage.optimizer {
        Optimizer::LBfgsB => lbfgsb_minimize(objective, x0, &box_vec, &local)?,
        Optimizer::ProjectedGradient => projected_gradient(objective, x0, &box_vec, &local),
        Optimizer::Sqp => bounded_sqp(objective, x0, &box_vec, &local),
        Optimizer::NelderMead if stage.bounded => {
            let clamped = |x: &[f64]| {
                let mut y = x.to_vec();
                bounds.project(&mut y);
                objective(&y)
            };
            nelder_mead(&clamped, x0, &local)
        }
        Optimizer::NelderMead => nelder_mead(objective, x0, &local),
        other => {
            return Err(StageError::Backend(format!(
                "{} cannot run as a fallback stage",
                other
            )))
        }
    };

    let iterations = Some(minimum.iterations);
    accept(stage, minimum, iterations, objective, bounds)
}

/// Turns a raw optimizer result into a stage outcome.
///
/// Bounded stages are projected back into the box (and re-scored if that
/// moved them); unbounded stages only succeed if they ended inside it.
fn accept<F>(
    stage: &StageDescriptor,
    minimum: Minimum,
    iterations: Option<usize>,
    objective: &F,
    bounds: &ParameterBounds,
) -> Result<StageOutcome, StageError>
where
    F: Fn(&[f64]) -> f64,
{
    let Minimum {
        mut x,
        objective: mut value,
        converged,
        ..
    } = minimum;

    if !converged {
        return Err(StageError::NotConverged {
            iterations: iterations.unwrap_or(stage.max_iterations),
            objective: value,
        });
    }

    if stage.bounded {
        let before = x.clone();
        bounds.project(&mut x);
        if x != before {
            value = objective(&x);
        }
    } else if let Some((parameter, v)) = bounds.violation(&x) {
        return Err(StageError::OutOfBounds { parameter, value: v });
    }

    if !value.is_finite() || value >= INVALID_OBJECTIVE {
        return Err(StageError::Infeasible { objective: value });
    }

    Ok(StageOutcome {
        x,
        objective: value,
        iterations,
    })
}

/// L-BFGS-B from `cmaes-lbfgsb`, restarted with fresh curvature memory while
/// it keeps improving and budget remains.
///
/// The backend hands back its best point however it stopped (budget, small
/// objective change, tiny step), so convergence is judged here: the objective
/// floor, or a KKT residual below `sqrt(tolerance)` at the returned point.
/// Backend errors and panics map to [`StageError::Backend`].
pub(crate) fn lbfgsb_minimize<F>(
    objective: &F,
    x0: &[f64],
    bounds: &[(f64, f64)],
    config: &LocalConfig,
) -> Result<Minimum, StageError>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    let mut x = x0.to_vec();
    project(&mut x, bounds);
    let mut value = objective(&x);
    let mut iterations = 0;

    while iterations < config.max_iterations {
        let budget = config.max_iterations - iterations;
        let (candidate, used) = lbfgsb_run(objective, &x, bounds, budget, config.tolerance)?;
        iterations += used.max(1);

        let candidate_value = objective(&candidate);
        let improved = candidate_value < value && !stalled(value, candidate_value, config.tolerance);
        if candidate_value < value {
            x = candidate;
            value = candidate_value;
        }
        if lbfgsb_converged(objective, &x, value, bounds, config) {
            return Ok(Minimum {
                x,
                objective: value,
                iterations,
                converged: true,
            });
        }
        if !improved {
            break;
        }
        tracing::trace!(iterations, objective = value, "restarting L-BFGS-B");
    }

    let converged = lbfgsb_converged(objective, &x, value, bounds, config);
    Ok(Minimum {
        x,
        objective: value,
        iterations: iterations.min(config.max_iterations),
        converged,
    })
}

fn lbfgsb_converged<F>(objective: &F, x: &[f64], value: f64, bounds: &[(f64, f64)], config: &LocalConfig) -> bool
where
    F: Fn(&[f64]) -> f64,
{
    if value <= config.objective_floor {
        return true;
    }
    let g = gradient(objective, x, value, config.fd_step, Some(bounds));
    kkt_residual(x, &g, bounds) < config.tolerance.sqrt()
}

/// One backend run; returns its best point and the iterations it reported.
fn lbfgsb_run<F>(
    objective: &F,
    x0: &[f64],
    bounds: &[(f64, f64)],
    max_iterations: usize,
    tolerance: f64,
) -> Result<(Vec<f64>, usize), StageError>
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    let mut solution = x0.to_vec();
    let counter = AtomicUsize::new(0);
    let run = catch_unwind(AssertUnwindSafe(|| {
        lbfgsb_optimize(
            &mut solution,
            bounds,
            objective,
            max_iterations,
            tolerance,
            Some(|_current_x: &[f64], current_obj: f64| {
                let iteration = counter.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::trace!(iteration, objective = current_obj, "L-BFGS-B iteration");
            }),
            Some(LbfgsbConfig {
                obj_tol: tolerance,
                ..LbfgsbConfig::default()
            }),
        )
    }));

    match run {
        Ok(Ok((_, x))) => Ok((x, counter.load(Ordering::Relaxed))),
        Ok(Err(e)) => Err(StageError::Backend(format!("L-BFGS-B: {:?}", e))),
        Err(_) => Err(StageError::Backend("L-BFGS-B panicked".to_string())),
    }
}

/// Summary plus per-quote breakdown for a shared parameter vector.
pub(crate) fn batch_result(
    engine: &dyn PricingEngine,
    quotes: &[OptionQuote],
    optimizer: Optimizer,
    outcome: &StageOutcome,
) -> BatchCalibration {
    let Some(params) = HestonParameters::from_slice(&outcome.x) else {
        return BatchCalibration::failed(quotes);
    };

    let results = quotes
        .iter()
        .map(|quote| match engine.price(&params, quote) {
            Ok(price) => {
                let value = objective::evaluate(engine, &params, quote);
                CalibrationResult::succeeded(quote, params, optimizer, value, price)
            }
            Err(e) => {
                tracing::warn!(strike = quote.strike_price, error = %e, "shared parameters cannot price quote");
                CalibrationResult::failed(quote)
            }
        })
        .collect();

    BatchCalibration {
        params: Some(params),
        optimizer_used: optimizer,
        success: true,
        objective_value: Some(outcome.objective),
        results,
    }
}
