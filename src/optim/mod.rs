//! Derivative-free and finite-difference optimizers used by the fallback chain.
//!
//! The first stage of the chain (L-BFGS-B) and the CMA-ES global search come from
//! `cmaes-lbfgsb`; the remaining stages live here. All of them minimize an
//! objective of the form `Fn(&[f64]) -> f64` and report whether their own
//! convergence criterion was met rather than returning errors.

pub mod nelder_mead;
pub mod projected_gradient;
pub mod sqp;

pub use nelder_mead::nelder_mead;
pub use projected_gradient::projected_gradient;
pub use sqp::bounded_sqp;

/// Settings shared by the local optimizers in this module.
#[derive(Debug, Clone, Copy)]
pub struct LocalConfig {
    /// Iteration budget
    pub max_iterations: usize,
    /// Convergence tolerance on the (projected) gradient norm and on the
    /// relative objective change between iterations
    pub tolerance: f64,
    /// Objective value regarded as an exact fit
    pub objective_floor: f64,
    /// Finite-difference step
    pub fd_step: f64,
    /// Armijo sufficient-decrease constant
    pub c1: f64,
    /// Maximum backtracking steps per line search
    pub max_line_search: usize,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-8,
            objective_floor: 1e-14,
            fd_step: 1e-7,
            c1: 1e-4,
            max_line_search: 30,
        }
    }
}

/// Best point found by a local optimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub x: Vec<f64>,
    pub objective: f64,
    pub iterations: usize,
    /// Whether the optimizer's convergence criterion was met within budget
    pub converged: bool,
}

/// Clamps `x` into `bounds` in place.
pub(crate) fn project(x: &mut [f64], bounds: &[(f64, f64)]) {
    for (xi, (lo, hi)) in x.iter_mut().zip(bounds) {
        *xi = xi.clamp(*lo, *hi);
    }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub(crate) fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Finite-difference gradient.
///
/// Central differences where the stencil fits inside `bounds`, one-sided
/// differences against a bound otherwise.
pub(crate) fn gradient<F>(objective: &F, x: &[f64], f0: f64, step: f64, bounds: Option<&[(f64, f64)]>) -> Vec<f64>
where
    F: Fn(&[f64]) -> f64,
{
    let mut probe = x.to_vec();
    (0..x.len())
        .map(|i| {
            let h = step * x[i].abs().max(1.0);
            let (lo, hi) = bounds.map_or((f64::NEG_INFINITY, f64::INFINITY), |b| b[i]);
            let can_up = x[i] + h <= hi;
            let can_down = x[i] - h >= lo;

            let derivative = if can_up && can_down {
                probe[i] = x[i] + h;
                let f_up = objective(&probe);
                probe[i] = x[i] - h;
                let f_down = objective(&probe);
                (f_up - f_down) / (2.0 * h)
            } else if can_up {
                probe[i] = x[i] + h;
                (objective(&probe) - f0) / h
            } else {
                probe[i] = x[i] - h;
                (f0 - objective(&probe)) / h
            };
            probe[i] = x[i];
            derivative
        })
        .collect()
}

/// Norm of the projected-gradient step `P(x - g) - x`, zero at a KKT point of
/// the box-constrained problem.
pub(crate) fn kkt_residual(x: &[f64], g: &[f64], bounds: &[(f64, f64)]) -> f64 {
    let mut trial: Vec<f64> = x.iter().zip(g).map(|(xi, gi)| xi - gi).collect();
    project(&mut trial, bounds);
    let step: Vec<f64> = trial.iter().zip(x).map(|(t, xi)| t - xi).collect();
    norm(&step)
}

/// Relative objective change small enough to stop.
pub(crate) fn stalled(previous: f64, current: f64, tolerance: f64) -> bool {
    (previous - current).abs() <= tolerance * previous.abs().max(current.abs()).max(1.0)
}
