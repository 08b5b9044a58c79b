//! Analytic Heston pricing engine.
//!
//! European prices come from the single-integral Lewis representation
//!
//! ```text
//! C = exp(-rT) * ( F - sqrt(F K) / pi * int_0^inf Re[ exp(i u ln(F/K)) psi(u - i/2) ] / (u^2 + 1/4) du )
//! ```
//!
//! where `psi` is the characteristic function of `ln(S_T / F)` in Gatheral's
//! formulation (no branch-cut discontinuity in the complex logarithm). The
//! integral is truncated where the integrand has decayed below double precision
//! and evaluated with composite Gauss-Legendre quadrature. Puts follow from
//! put-call parity.
//!
//! The engine holds no market state: everything it needs arrives with the quote.

use crate::calibration::types::OptionQuote;
use crate::error::PricingError;
use crate::model_params::HestonParameters;
use crate::models::traits::PricingEngine;
use crate::models::utils::forward_price;
use num_complex::Complex64;
use std::f64::consts::PI;
use std::sync::OnceLock;

/// Points per Gauss-Legendre panel.
const GL_ORDER: usize = 16;
/// Narrow panels cover the peak of `1 / (u^2 + 1/4)` near the origin.
const NEAR_PANEL_WIDTH: f64 = 2.0;
const NEAR_REGION: f64 = 20.0;
const FAR_PANEL_WIDTH: f64 = 8.0;

/// Heston pricer using Lewis/Gatheral quadrature.
#[derive(Debug, Clone, Copy)]
pub struct AnalyticHestonEngine {
    /// Smallest truncation point of the Fourier integral
    pub min_upper_limit: f64,
    /// Largest truncation point of the Fourier integral
    pub max_upper_limit: f64,
    /// Target decay exponent of the integrand at the truncation point
    pub decay_exponent: f64,
}

impl Default for AnalyticHestonEngine {
    fn default() -> Self {
        Self {
            min_upper_limit: 40.0,
            max_upper_limit: 4000.0,
            decay_exponent: 36.0,
        }
    }
}

impl AnalyticHestonEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn validate(params: &HestonParameters, quote: &OptionQuote) -> Result<(), PricingError> {
        let values = [params.v0, params.kappa, params.theta, params.sigma, params.rho];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PricingError::invalid_parameters(format!(
                "non-finite parameter in {:?}",
                params
            )));
        }
        if params.v0 < 0.0 {
            return Err(PricingError::invalid_parameters(format!("v0 = {} < 0", params.v0)));
        }
        if params.kappa <= 0.0 {
            return Err(PricingError::invalid_parameters(format!(
                "kappa = {} <= 0",
                params.kappa
            )));
        }
        if params.theta < 0.0 {
            return Err(PricingError::invalid_parameters(format!(
                "theta = {} < 0",
                params.theta
            )));
        }
        // sigma = 0 degenerates the characteristic function (division by sigma^2)
        if params.sigma <= 0.0 {
            return Err(PricingError::invalid_parameters(format!(
                "sigma = {} <= 0",
                params.sigma
            )));
        }
        if !(-1.0..=1.0).contains(&params.rho) {
            return Err(PricingError::invalid_parameters(format!(
                "rho = {} outside [-1, 1]",
                params.rho
            )));
        }
        if !(quote.spot_price > 0.0 && quote.strike_price > 0.0 && quote.time_to_maturity > 0.0) {
            return Err(PricingError::invalid_quote(format!(
                "spot={}, strike={}, t={}",
                quote.spot_price, quote.strike_price, quote.time_to_maturity
            )));
        }
        Ok(())
    }

    /// Characteristic function of `ln(S_T / F)` evaluated at complex `z`.
    fn characteristic_fn(params: &HestonParameters, z: Complex64, t: f64) -> Complex64 {
        let i = Complex64::i();
        let one = Complex64::new(1.0, 0.0);
        let sigma2 = params.sigma * params.sigma;

        let iz = i * z;
        let beta = params.kappa - params.rho * params.sigma * iz;
        let mut d = (beta * beta + sigma2 * (z * z + iz)).sqrt();
        if d.re < 0.0 {
            d = -d;
        }
        let g = (beta - d) / (beta + d);
        let exp_neg_dt = (-d * t).exp();

        let a = (params.kappa * params.theta / sigma2)
            * ((beta - d) * t - 2.0 * ((one - g * exp_neg_dt) / (one - g)).ln());
        let b = ((beta - d) / sigma2) * ((one - exp_neg_dt) / (one - g * exp_neg_dt));

        (a + b * params.v0).exp()
    }

    /// Truncation point of the Fourier integral.
    ///
    /// `|psi(u - i/2)|` behaves like `exp(-w (u^2 + 1/4) / 2)` with `w` the
    /// expected integrated variance, so the integrand is negligible once
    /// `w u^2 / 2` exceeds `decay_exponent`.
    fn upper_limit(&self, params: &HestonParameters, t: f64) -> f64 {
        let mean_reversion = if params.kappa * t > 1e-8 {
            (1.0 - (-params.kappa * t).exp()) / params.kappa
        } else {
            t
        };
        let integrated = params.theta * t + (params.v0 - params.theta) * mean_reversion;
        let w = integrated.max(1e-8);
        (2.0 * self.decay_exponent / w)
            .sqrt()
            .clamp(self.min_upper_limit, self.max_upper_limit)
    }

    fn call_price(&self, params: &HestonParameters, quote: &OptionQuote) -> Result<f64, PricingError> {
        let t = quote.time_to_maturity;
        let forward = forward_price(quote);
        let strike = quote.strike_price;
        let log_moneyness = (forward / strike).ln();
        let half_i = Complex64::new(0.0, 0.5);

        let integrand = |u: f64| -> f64 {
            let psi = Self::characteristic_fn(params, Complex64::new(u, 0.0) - half_i, t);
            let phase = Complex64::new(0.0, u * log_moneyness).exp();
            (phase * psi).re / (u * u + 0.25)
        };

        let integral = integrate_panels(&integrand, self.upper_limit(params, t));
        if !integral.is_finite() {
            return Err(PricingError::numerical(format!(
                "Fourier integral is not finite for {:?} at strike {}",
                params, strike
            )));
        }

        let discount = (-quote.risk_free_rate * t).exp();
        Ok(discount * (forward - (forward * strike).sqrt() * integral / PI))
    }
}

impl PricingEngine for AnalyticHestonEngine {
    fn name(&self) -> &str {
        "analytic-heston"
    }

    fn price(&self, params: &HestonParameters, quote: &OptionQuote) -> Result<f64, PricingError> {
        Self::validate(params, quote)?;

        let call = self.call_price(params, quote)?;
        let price = if quote.is_call {
            call
        } else {
            let t = quote.time_to_maturity;
            call - quote.spot_price * (-quote.dividend_yield * t).exp()
                + quote.strike_price * (-quote.risk_free_rate * t).exp()
        };

        if price.is_finite() {
            Ok(price)
        } else {
            Err(PricingError::numerical(format!(
                "non-finite price for {:?} at strike {}",
                params, quote.strike_price
            )))
        }
    }
}

/// Integrates `f` over `[0, upper]` with narrow panels near the origin and
/// wider ones further out.
fn integrate_panels<F: Fn(f64) -> f64>(f: &F, upper: f64) -> f64 {
    let (nodes, weights) = gauss_legendre();
    let mut total = 0.0;
    let mut a = 0.0;
    while a < upper {
        let width = if a < NEAR_REGION {
            NEAR_PANEL_WIDTH
        } else {
            FAR_PANEL_WIDTH
        };
        let b = (a + width).min(upper);
        let half = 0.5 * (b - a);
        let mid = 0.5 * (b + a);
        let panel: f64 = nodes
            .iter()
            .zip(weights.iter())
            .map(|(x, w)| w * f(mid + half * x))
            .sum();
        total += half * panel;
        a = b;
    }
    total
}

/// Gauss-Legendre nodes and weights on `[-1, 1]`, computed once.
fn gauss_legendre() -> &'static (Vec<f64>, Vec<f64>) {
    static RULE: OnceLock<(Vec<f64>, Vec<f64>)> = OnceLock::new();
    RULE.get_or_init(|| legendre_rule(GL_ORDER))
}

/// Newton iteration on the Legendre polynomial roots.
fn legendre_rule(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];
    for i in 0..(n + 1) / 2 {
        let mut z = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let mut dp = 1.0;
        for _ in 0..100 {
            let (mut p0, mut p1) = (1.0, 0.0);
            for j in 1..=n {
                let p2 = p1;
                p1 = p0;
                p0 = ((2 * j - 1) as f64 * z * p1 - (j - 1) as f64 * p2) / j as f64;
            }
            // p0 = P_n(z), p1 = P_{n-1}(z)
            dp = n as f64 * (z * p0 - p1) / (z * z - 1.0);
            let z_prev = z;
            z = z_prev - p0 / dp;
            if (z - z_prev).abs() < 1e-15 {
                break;
            }
        }
        nodes[i] = -z;
        nodes[n - 1 - i] = z;
        let w = 2.0 / ((1.0 - z * z) * dp * dp);
        weights[i] = w;
        weights[n - 1 - i] = w;
    }
    (nodes, weights)
}
