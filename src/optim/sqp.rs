//! Bounded sequential quadratic programming.
//!
//! Each iteration solves the quadratic model `g'd + d'Bd/2` over the variables
//! that are not pinned to a bound, with `B` a BFGS approximation of the
//! Hessian. The step is then projected back into the box and accepted by an
//! Armijo backtracking search.

use super::{dot, gradient, norm, project, stalled, LocalConfig, Minimum};

/// Distance to a bound below which a variable counts as sitting on it.
const ACTIVE_EPS: f64 = 1e-12;

pub fn bounded_sqp<F>(objective: &F, x0: &[f64], bounds: &[(f64, f64)], config: &LocalConfig) -> Minimum
where
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    let mut x = x0.to_vec();
    project(&mut x, bounds);
    let mut f = objective(&x);
    let mut g = gradient(objective, &x, f, config.fd_step, Some(bounds));
    let mut hessian = identity(n);

    for iteration in 0..config.max_iterations {
        if f <= config.objective_floor {
            return Minimum {
                x,
                objective: f,
                iterations: iteration,
                converged: true,
            };
        }

        let free: Vec<usize> = (0..n).filter(|&i| !is_active(x[i], g[i], bounds[i])).collect();
        let free_gradient: Vec<f64> = free.iter().map(|&i| g[i]).collect();
        if free.is_empty() || norm(&free_gradient) < config.tolerance {
            return Minimum {
                x,
                objective: f,
                iterations: iteration,
                converged: true,
            };
        }

        let reduced: Vec<Vec<f64>> = free
            .iter()
            .map(|&i| free.iter().map(|&j| hessian[i][j]).collect())
            .collect();
        let rhs: Vec<f64> = free_gradient.iter().map(|gi| -gi).collect();

        let mut direction = vec![0.0; n];
        match solve(reduced, rhs) {
            Some(d) if dot(&d, &free_gradient) < 0.0 => {
                for (k, &i) in free.iter().enumerate() {
                    direction[i] = d[k];
                }
            }
            _ => {
                // Model is not positive definite on the free set: restart from steepest descent
                hessian = identity(n);
                for &i in &free {
                    direction[i] = -g[i];
                }
            }
        }

        let mut step = 1.0;
        let mut accepted = None;
        for _ in 0..config.max_line_search {
            let mut x_new: Vec<f64> = x.iter().zip(&direction).map(|(xi, di)| xi + step * di).collect();
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
            tracing::trace!(iteration, objective = f, "SQP line search exhausted");
            return Minimum {
                x,
                objective: f,
                iterations: iteration,
                converged: norm(&free_gradient) < config.tolerance.sqrt(),
            };
        };

        let g_new = gradient(objective, &x_new, f_new, config.fd_step, Some(bounds));
        let s: Vec<f64> = (0..n).map(|i| x_new[i] - x[i]).collect();
        let y: Vec<f64> = (0..n).map(|i| g_new[i] - g[i]).collect();
        bfgs_update(&mut hessian, &s, &y);

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

/// A variable on a bound whose gradient pushes it further out stays fixed.
fn is_active(x: f64, g: f64, (lo, hi): (f64, f64)) -> bool {
    (x - lo <= ACTIVE_EPS && g > 0.0) || (hi - x <= ACTIVE_EPS && g < 0.0)
}

fn identity(n: usize) -> Vec<Vec<f64>> {
    (0..n)
        .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect()
}

/// Direct BFGS update of the Hessian approximation, skipped when the
/// curvature condition fails.
fn bfgs_update(b: &mut [Vec<f64>], s: &[f64], y: &[f64]) {
    let n = s.len();
    let sy = dot(s, y);
    if sy <= 1e-12 * norm(s) * norm(y) {
        return;
    }
    let bs: Vec<f64> = (0..n).map(|i| dot(&b[i], s)).collect();
    let sbs = dot(s, &bs);
    if sbs <= 0.0 {
        return;
    }
    for i in 0..n {
        for j in 0..n {
            b[i][j] += y[i] * y[j] / sy - bs[i] * bs[j] / sbs;
        }
    }
}

/// Gaussian elimination with partial pivoting. `None` for singular systems.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-14 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_small_system() {
        let a = vec![vec![2.0, 1.0], vec![1.0, 3.0]];
        let x = solve(a, vec![3.0, 5.0]).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_solve_singular() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert!(solve(a, vec![1.0, 2.0]).is_none());
    }

    #[test]
    fn test_rosenbrock_in_box() {
        let rosenbrock = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let bounds = [(-2.0, 2.0), (-2.0, 2.0)];
        let config = LocalConfig {
            max_iterations: 500,
            tolerance: 1e-12,
            ..LocalConfig::default()
        };
        let result = bounded_sqp(&rosenbrock, &[-1.2, 1.0], &bounds, &config);
        assert!(result.objective < 1e-6, "objective = {}", result.objective);
        assert!((result.x[0] - 1.0).abs() < 1e-2, "{:?}", result.x);
    }

    #[test]
    fn test_active_bound_is_held() {
        // Minimum of the unconstrained quadratic is at (-1, 0.5); the box cuts x0 at 0
        let f = |x: &[f64]| (x[0] + 1.0).powi(2) + (x[1] - 0.5).powi(2);
        let bounds = [(0.0, 1.0), (0.0, 1.0)];
        let result = bounded_sqp(&f, &[0.7, 0.9], &bounds, &LocalConfig::default());
        assert!(result.converged);
        assert_eq!(result.x[0], 0.0);
        assert!((result.x[1] - 0.5).abs() < 1e-4, "{:?}", result.x);
    }
}
