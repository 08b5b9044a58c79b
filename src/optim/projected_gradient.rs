//! Spectral projected-gradient method for box-constrained minimization.
//!
//! Steps along `P(x - alpha * g)` where `P` clamps into the box. The trial step
//! length is the Barzilai-Borwein estimate from the previous iteration,
//! backtracked until the Armijo condition holds.

use super::{dot, gradient, kkt_residual, norm, project, stalled, LocalConfig, Minimum};

pub fn projected_gradient<F>(objective: &F, x0: &[f64], bounds: &[(f64, f64)], config: &LocalConfig) -> Minimum
where
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    let mut x = x0.to_vec();
    project(&mut x, bounds);
    let mut f = objective(&x);
    let mut g = gradient(objective, &x, f, config.fd_step, Some(bounds));
    let mut alpha = 1.0 / norm(&g).max(1.0);

    for iteration in 0..config.max_iterations {
        if f <= config.objective_floor {
            return Minimum {
                x,
                objective: f,
                iterations: iteration,
                converged: true,
            };
        }

        let residual = kkt_residual(&x, &g, bounds);
        if residual < config.tolerance {
            return Minimum {
                x,
                objective: f,
                iterations: iteration,
                converged: true,
            };
        }

        let mut step = alpha;
        let mut accepted = None;
        for _ in 0..config.max_line_search {
            let mut x_new: Vec<f64> = x.iter().zip(&g).map(|(xi, gi)| xi - step * gi).collect();
            project(&mut x_new, bounds);
            let f_new = objective(&x_new);
            let decrease: f64 = g.iter().zip(x_new.iter().zip(&x)).map(|(gi, (a, b))| gi * (a - b)).sum();
            if f_new.is_finite() && f_new <= f + config.c1 * decrease {
                accepted = Some((x_new, f_new));
                break;
            }
            step *= 0.5;
        }

        let Some((x_new, f_new)) = accepted else {
            // No descent along the projected arc: stationary up to line-search resolution
            tracing::trace!(iteration, objective = f, "projected gradient line search exhausted");
            return Minimum {
                x,
                objective: f,
                iterations: iteration,
                converged: residual < config.tolerance.sqrt(),
            };
        };

        let g_new = gradient(objective, &x_new, f_new, config.fd_step, Some(bounds));
        let s: Vec<f64> = (0..n).map(|i| x_new[i] - x[i]).collect();
        let y: Vec<f64> = (0..n).map(|i| g_new[i] - g[i]).collect();
        let sy = dot(&s, &y);
        alpha = if sy > 1e-16 {
            (dot(&s, &s) / sy).clamp(1e-12, 1e12)
        } else {
            (step * 2.0).min(1e12)
        };

        let done = stalled(f, f_new, config.tolerance);
        x = x_new;
        f = f_new;
        g = g_new;
        if done {
            return Minimum {
                x,
                objective: f,
                iterations: iteration + 1,
                converged: true,
            };
        }
    }

    Minimum {
        x,
        objective: f,
        iterations: config.max_iterations,
        converged: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interior_minimum() {
        let f = |x: &[f64]| (x[0] - 0.3).powi(2) + 10.0 * (x[1] + 0.2).powi(2);
        let bounds = [(-1.0, 1.0), (-1.0, 1.0)];
        let result = projected_gradient(&f, &[0.9, 0.9], &bounds, &LocalConfig::default());
        assert!(result.converged);
        assert!((result.x[0] - 0.3).abs() < 1e-3, "{:?}", result.x);
        assert!((result.x[1] + 0.2).abs() < 1e-3, "{:?}", result.x);
    }

    #[test]
    fn test_minimum_on_bound() {
        // Unconstrained minimum at x = 2 lies outside the box
        let f = |x: &[f64]| (x[0] - 2.0).powi(2);
        let bounds = [(0.0, 1.0)];
        let result = projected_gradient(&f, &[0.5], &bounds, &LocalConfig::default());
        assert!(result.converged);
        assert!((result.x[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_budget_exhaustion_is_reported() {
        let rosenbrock = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let config = LocalConfig {
            max_iterations: 2,
            ..LocalConfig::default()
        };
        let bounds = [(-5.0, 5.0), (-5.0, 5.0)];
        let result = projected_gradient(&rosenbrock, &[-1.2, 1.0], &bounds, &config);
        assert!(!result.converged);
        assert_eq!(result.iterations, 2);
    }
}
