//! Unconstrained Nelder-Mead simplex search in `n` dimensions.

use super::{LocalConfig, Minimum};

/// Relative perturbation used to build the initial simplex.
const NONZERO_STEP: f64 = 0.05;
/// Absolute perturbation for components that start at zero.
const ZERO_STEP: f64 = 0.00025;

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Minimize `objective` starting from `x0`.
///
/// Stops when the vertices agree within `sqrt(tolerance)` and their objective
/// values within `tolerance`, or when the best value reaches the objective
/// floor. Bounds are not enforced; callers check feasibility of the result.
pub fn nelder_mead<F>(objective: &F, x0: &[f64], config: &LocalConfig) -> Minimum
where
    F: Fn(&[f64]) -> f64,
{
    let n = x0.len();
    let xatol = config.tolerance.sqrt();
    let fatol = config.tolerance;

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(x0.to_vec());
    for i in 0..n {
        let mut vertex = x0.to_vec();
        vertex[i] = if vertex[i] != 0.0 {
            vertex[i] * (1.0 + NONZERO_STEP)
        } else {
            ZERO_STEP
        };
        simplex.push(vertex);
    }
    let mut values: Vec<f64> = simplex.iter().map(|v| sanitize(objective(v))).collect();

    for iteration in 0..config.max_iterations {
        // Sort vertices best to worst
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let x_spread = simplex[1..]
            .iter()
            .flat_map(|v| v.iter().zip(&simplex[0]).map(|(a, b)| (a - b).abs()))
            .fold(0.0_f64, f64::max);
        let f_spread = values[1..].iter().map(|f| (f - values[0]).abs()).fold(0.0_f64, f64::max);
        if values[0] <= config.objective_floor || (x_spread <= xatol && f_spread <= fatol) {
            return Minimum {
                x: simplex.swap_remove(0),
                objective: values[0],
                iterations: iteration,
                converged: true,
            };
        }

        // Centroid of all but the worst vertex
        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
            .collect();
        let along = |coef: f64| -> Vec<f64> {
            centroid
                .iter()
                .zip(&simplex[n])
                .map(|(c, w)| c + coef * (c - w))
                .collect()
        };

        let reflected = along(REFLECT);
        let f_reflected = sanitize(objective(&reflected));

        if f_reflected < values[0] {
            let expanded = along(REFLECT * EXPAND);
            let f_expanded = sanitize(objective(&expanded));
            if f_expanded < f_reflected {
                simplex[n] = expanded;
                values[n] = f_expanded;
            } else {
                simplex[n] = reflected;
                values[n] = f_reflected;
            }
        } else if f_reflected < values[n - 1] {
            simplex[n] = reflected;
            values[n] = f_reflected;
        } else {
            // Outside contraction when the reflection still beats the worst vertex
            let (contracted, threshold) = if f_reflected < values[n] {
                (along(REFLECT * CONTRACT), f_reflected)
            } else {
                (along(-CONTRACT), values[n])
            };
            let f_contracted = sanitize(objective(&contracted));
            if f_contracted <= threshold {
                simplex[n] = contracted;
                values[n] = f_contracted;
            } else {
                for k in 1..=n {
                    let shrunk: Vec<f64> = simplex[0]
                        .iter()
                        .zip(&simplex[k])
                        .map(|(b, v)| b + SHRINK * (v - b))
                        .collect();
                    values[k] = sanitize(objective(&shrunk));
                    simplex[k] = shrunk;
                }
            }
        }
    }

    let best = (0..=n).min_by(|&a, &b| values[a].total_cmp(&values[b])).unwrap_or(0);
    Minimum {
        x: simplex.swap_remove(best),
        objective: values[best],
        iterations: config.max_iterations,
        converged: false,
    }
}

/// NaN objectives are ranked as the worst possible vertex.
fn sanitize(value: f64) -> f64 {
    if value.is_nan() {
        f64::INFINITY
    } else {
        value
    }
}
