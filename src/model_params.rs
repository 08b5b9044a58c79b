//! Heston model parameter container and the conversions the optimizers need.
//!
//! The calibration pipeline works on plain `&[f64]` vectors so that every
//! optimizer backend can share one objective closure. [`HestonParameters`] is the
//! typed view of that vector, always laid out as `[v0, kappa, theta, sigma, rho]`.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Number of calibrated Heston parameters.
pub const HESTON_PARAM_COUNT: usize = 5;

/// Parameter names in optimizer-vector order.
pub const HESTON_PARAM_NAMES: [&str; HESTON_PARAM_COUNT] = ["v0", "kappa", "theta", "sigma", "rho"];

/// Parameters of the Heston stochastic-volatility model.
///
/// ```text
/// dS = (r - q) S dt + sqrt(v) S dW_S
/// dv = kappa (theta - v) dt + sigma sqrt(v) dW_v,   d<W_S, W_v> = rho dt
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HestonParameters {
    /// Initial instantaneous variance
    pub v0: f64,
    /// Mean-reversion speed of the variance process
    pub kappa: f64,
    /// Long-run variance level
    pub theta: f64,
    /// Volatility of variance ("vol of vol")
    pub sigma: f64,
    /// Correlation between the spot and variance Brownian motions
    pub rho: f64,
}

impl HestonParameters {
    /// Default mean-reversion speed used when seeding an initial guess.
    pub const SEED_KAPPA: f64 = 0.1;
    /// Default vol-of-vol used when seeding an initial guess.
    pub const SEED_SIGMA: f64 = 0.1;
    /// Default correlation used when seeding an initial guess.
    pub const SEED_RHO: f64 = 0.1;

    /// Creates a validated parameter set.
    pub fn new(v0: f64, kappa: f64, theta: f64, sigma: f64, rho: f64) -> Result<Self> {
        let params = Self {
            v0,
            kappa,
            theta,
            sigma,
            rho,
        };
        params.validate()?;
        Ok(params)
    }

    /// Initial guess seeded from a volatility estimate (historical or implied).
    ///
    /// Both `v0` and `theta` start at the estimate's variance; the remaining
    /// parameters use fixed defaults. `theta` also anchors the calibration
    /// window, see [`crate::calibration::types::ParameterBounds::for_initial_guess`].
    pub fn seeded(initial_volatility: f64) -> Self {
        let variance = initial_volatility * initial_volatility;
        Self {
            v0: variance,
            kappa: Self::SEED_KAPPA,
            theta: variance,
            sigma: Self::SEED_SIGMA,
            rho: Self::SEED_RHO,
        }
    }

    /// Zero-valued parameters, used to fill rows of failed calibrations.
    pub fn zeroed() -> Self {
        Self {
            v0: 0.0,
            kappa: 0.0,
            theta: 0.0,
            sigma: 0.0,
            rho: 0.0,
        }
    }

    /// Checks the domain constraints of the model.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("v0", self.v0),
            ("kappa", self.kappa),
            ("theta", self.theta),
            ("sigma", self.sigma),
            ("rho", self.rho),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(anyhow!("HestonParameters: {} = {} must be finite", name, value));
            }
        }
        if self.v0 < 0.0 {
            return Err(anyhow!("HestonParameters: v0 = {} must be >= 0", self.v0));
        }
        if self.kappa <= 0.0 {
            return Err(anyhow!("HestonParameters: kappa = {} must be > 0", self.kappa));
        }
        if self.theta < 0.0 {
            return Err(anyhow!("HestonParameters: theta = {} must be >= 0", self.theta));
        }
        if self.sigma < 0.0 {
            return Err(anyhow!("HestonParameters: sigma = {} must be >= 0", self.sigma));
        }
        if !(-1.0..=1.0).contains(&self.rho) {
            return Err(anyhow!(
                "HestonParameters: rho = {} must be in [-1, 1]",
                self.rho
            ));
        }
        Ok(())
    }

    /// Feller condition `2 kappa theta >= sigma^2`.
    ///
    /// Calibration does not enforce this; it is reported for diagnostics only.
    pub fn satisfies_feller(&self) -> bool {
        2.0 * self.kappa * self.theta >= self.sigma * self.sigma
    }

    /// Mean variance at horizon `t` (years) under the model dynamics.
    pub fn expected_variance(&self, t: f64) -> f64 {
        expected_variance(self.v0, self.kappa, self.theta, t)
    }

    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.v0, self.kappa, self.theta, self.sigma, self.rho]
    }

    /// Reads an optimizer vector laid out as `[v0, kappa, theta, sigma, rho]`.
    ///
    /// No domain validation happens here: optimizers routinely probe infeasible
    /// points and the pricing engine is responsible for rejecting them.
    pub fn from_slice(x: &[f64]) -> Option<Self> {
        match x {
            [v0, kappa, theta, sigma, rho] => Some(Self {
                v0: *v0,
                kappa: *kappa,
                theta: *theta,
                sigma: *sigma,
                rho: *rho,
            }),
            _ => None,
        }
    }
}

/// Closed-form expectation of the Heston variance process:
/// `E[v_t] = theta + (v0 - theta) exp(-kappa t)`.
pub fn expected_variance(v0: f64, kappa: f64, theta: f64, t: f64) -> f64 {
    theta + (v0 - theta) * (-kappa * t).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_rejects_out_of_domain_values() {
        assert!(HestonParameters::new(0.04, 1.5, 0.04, 0.3, -0.5).is_ok());
        assert!(HestonParameters::new(-0.01, 1.5, 0.04, 0.3, -0.5).is_err());
        assert!(HestonParameters::new(0.04, 0.0, 0.04, 0.3, -0.5).is_err());
        assert!(HestonParameters::new(0.04, 1.5, -0.04, 0.3, -0.5).is_err());
        assert!(HestonParameters::new(0.04, 1.5, 0.04, -0.3, -0.5).is_err());
        assert!(HestonParameters::new(0.04, 1.5, 0.04, 0.3, -1.5).is_err());
        assert!(HestonParameters::new(f64::NAN, 1.5, 0.04, 0.3, -0.5).is_err());
        // rho at the closed boundary is allowed
        assert!(HestonParameters::new(0.04, 1.5, 0.04, 0.3, 1.0).is_ok());
    }

    #[test]
    fn test_vector_layout() {
        let p = HestonParameters::new(0.04, 1.5, 0.05, 0.3, -0.5).unwrap();
        let x = p.to_vec();
        assert_eq!(x, vec![0.04, 1.5, 0.05, 0.3, -0.5]);
        assert_eq!(HestonParameters::from_slice(&x), Some(p));
        assert_eq!(HestonParameters::from_slice(&x[..4]), None);
    }

    #[test]
    fn test_seeded_guess_uses_variance() {
        let p = HestonParameters::seeded(0.2);
        assert!((p.v0 - 0.04).abs() < 1e-15);
        assert!((p.theta - 0.04).abs() < 1e-15);
        assert_eq!(p.kappa, HestonParameters::SEED_KAPPA);
    }

    #[test]
    fn test_feller_condition() {
        let inside = HestonParameters::new(0.04, 2.0, 0.04, 0.3, -0.7).unwrap();
        assert!(inside.satisfies_feller()); // 0.16 >= 0.09
        let outside = HestonParameters::new(0.04, 0.5, 0.04, 0.5, -0.7).unwrap();
        assert!(!outside.satisfies_feller()); // 0.04 < 0.25
    }

    #[test]
    fn test_expected_variance_limits() {
        assert_eq!(expected_variance(0.09, 1.5, 0.04, 0.0), 0.09);
        assert!((expected_variance(0.09, 1.5, 0.04, 50.0) - 0.04).abs() < 1e-12);
    }
}
