use crate::model_params::{HestonParameters, HESTON_PARAM_NAMES};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One observed option price with the market inputs needed to price it.
///
/// The time to maturity is measured by the caller from its own valuation date,
/// so pricing never depends on any ambient "current date".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    /// Underlying spot price
    pub spot_price: f64,
    /// Strike price
    pub strike_price: f64,
    /// Observed option premium
    pub market_price: f64,
    /// Time to expiration in years
    pub time_to_maturity: f64,
    /// Continuously compounded risk-free rate (decimal)
    pub risk_free_rate: f64,
    /// Continuously compounded dividend yield (decimal)
    pub dividend_yield: f64,
    /// `true` for a call, `false` for a put
    pub is_call: bool,
}

impl OptionQuote {
    /// Validates the domain constraints of a market quote.
    pub fn validate(&self) -> Result<()> {
        if !(self.spot_price > 0.0 && self.spot_price.is_finite()) {
            return Err(anyhow!(
                "OptionQuote: spot_price = {} must be > 0 and finite",
                self.spot_price
            ));
        }
        if !(self.strike_price > 0.0 && self.strike_price.is_finite()) {
            return Err(anyhow!(
                "OptionQuote: strike_price = {} must be > 0 and finite",
                self.strike_price
            ));
        }
        if !(self.market_price >= 0.0 && self.market_price.is_finite()) {
            return Err(anyhow!(
                "OptionQuote: market_price = {} must be >= 0 and finite",
                self.market_price
            ));
        }
        if !(self.time_to_maturity > 0.0 && self.time_to_maturity.is_finite()) {
            return Err(anyhow!(
                "OptionQuote: time_to_maturity = {} must be > 0 and finite",
                self.time_to_maturity
            ));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(anyhow!(
                "OptionQuote: risk_free_rate = {} must be finite",
                self.risk_free_rate
            ));
        }
        if !(self.dividend_yield >= 0.0 && self.dividend_yield.is_finite()) {
            return Err(anyhow!(
                "OptionQuote: dividend_yield = {} must be >= 0 and finite",
                self.dividend_yield
            ));
        }
        Ok(())
    }

    /// Same quote with a different observed premium.
    pub fn with_market_price(&self, market_price: f64) -> Self {
        Self {
            market_price,
            ..*self
        }
    }
}

/// Box constraints on the optimizer vector `[v0, kappa, theta, sigma, rho]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBounds {
    pub v0: (f64, f64),
    pub kappa: (f64, f64),
    pub theta: (f64, f64),
    pub sigma: (f64, f64),
    pub rho: (f64, f64),
}

impl ParameterBounds {
    /// Fixed calibration limits for everything but `theta`.
    pub const V0: (f64, f64) = (1e-4, 1.0);
    pub const KAPPA: (f64, f64) = (1e-4, 2.0);
    pub const SIGMA: (f64, f64) = (1e-4, 1.0);
    pub const RHO: (f64, f64) = (-1.0, 1.0);

    /// Bounds for a calibration started from `initial`.
    ///
    /// `theta` is only perturbed locally around its supplied value:
    /// `[0.5 * theta0, 1.5 * theta0]`.
    pub fn for_initial_guess(initial: &HestonParameters) -> Self {
        Self::with_theta_window(initial, 0.5, 1.5)
    }

    /// Bounds with a custom theta window `[lower * theta0, upper * theta0]`.
    pub fn with_theta_window(initial: &HestonParameters, lower: f64, upper: f64) -> Self {
        Self {
            v0: Self::V0,
            kappa: Self::KAPPA,
            theta: (initial.theta * lower, initial.theta * upper),
            sigma: Self::SIGMA,
            rho: Self::RHO,
        }
    }

    pub fn to_vec(&self) -> Vec<(f64, f64)> {
        vec![self.v0, self.kappa, self.theta, self.sigma, self.rho]
    }

    /// Returns the first parameter of `x` lying outside the box, if any.
    pub fn violation(&self, x: &[f64]) -> Option<(&'static str, f64)> {
        HESTON_PARAM_NAMES
            .iter()
            .zip(self.to_vec())
            .zip(x.iter())
            .find(|((_, (lo, hi)), v)| **v < *lo || **v > *hi)
            .map(|((name, _), v)| (*name, *v))
    }

    pub fn contains(&self, params: &HestonParameters) -> bool {
        self.violation(&params.to_vec()).is_none()
    }

    /// Clamps `x` into the box in place.
    pub fn project(&self, x: &mut [f64]) {
        for (value, (lo, hi)) in x.iter_mut().zip(self.to_vec()) {
            *value = value.clamp(lo, hi);
        }
    }
}

/// Optimization method that produced a calibration result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Optimizer {
    /// Bounded limited-memory quasi-Newton
    LBfgsB,
    /// Bounded projected-gradient descent
    ProjectedGradient,
    /// Bounded sequential quadratic programming
    Sqp,
    /// Unconstrained Nelder-Mead simplex
    NelderMead,
    /// Perturb-and-minimize global search
    BasinHopping,
    /// CMA-ES global search with L-BFGS-B polish
    CmaEs,
    /// Every stage failed; no optimizer produced a usable result
    Exhausted,
}

impl Optimizer {
    pub fn name(&self) -> &'static str {
        match self {
            Optimizer::LBfgsB => "L-BFGS-B",
            Optimizer::ProjectedGradient => "projected-gradient",
            Optimizer::Sqp => "SQP",
            Optimizer::NelderMead => "Nelder-Mead",
            Optimizer::BasinHopping => "basin-hopping",
            Optimizer::CmaEs => "CMA-ES",
            Optimizer::Exhausted => "none",
        }
    }

    /// Whether the optimizer can run as a stage of the fallback chain.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Optimizer::LBfgsB | Optimizer::ProjectedGradient | Optimizer::Sqp | Optimizer::NelderMead
        )
    }
}

impl fmt::Display for Optimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one calibration attempt against one quote.
///
/// Failure is a normal value: `success == false` leaves every fitted field empty
/// and labels the attempt with [`Optimizer::Exhausted`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub params: Option<HestonParameters>,
    pub optimizer_used: Optimizer,
    pub success: bool,
    /// Objective value at the solution (per-quote or batch, see the producer)
    pub objective_value: Option<f64>,
    /// Model price at the solution
    pub estimated_price: Option<f64>,
    pub market_price: f64,
    pub strike: f64,
    pub time_to_maturity: f64,
    /// `(estimated_price - market_price)^2`
    pub squared_error: Option<f64>,
}

impl CalibrationResult {
    /// Result for a quote on which every optimizer failed.
    pub fn failed(quote: &OptionQuote) -> Self {
        Self {
            params: None,
            optimizer_used: Optimizer::Exhausted,
            success: false,
            objective_value: None,
            estimated_price: None,
            market_price: quote.market_price,
            strike: quote.strike_price,
            time_to_maturity: quote.time_to_maturity,
            squared_error: None,
        }
    }

    /// Result for a quote priced at `estimated_price` under `params`.
    pub fn succeeded(
        quote: &OptionQuote,
        params: HestonParameters,
        optimizer_used: Optimizer,
        objective_value: f64,
        estimated_price: f64,
    ) -> Self {
        let error = estimated_price - quote.market_price;
        Self {
            params: Some(params),
            optimizer_used,
            success: true,
            objective_value: Some(objective_value),
            estimated_price: Some(estimated_price),
            market_price: quote.market_price,
            strike: quote.strike_price,
            time_to_maturity: quote.time_to_maturity,
            squared_error: Some(error * error),
        }
    }
}

/// Joint fit of one parameter vector to a set of quotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCalibration {
    pub params: Option<HestonParameters>,
    pub optimizer_used: Optimizer,
    pub success: bool,
    /// Summed squared error over the batch
    pub objective_value: Option<f64>,
    /// Per-quote breakdown in input order
    pub results: Vec<CalibrationResult>,
}

impl BatchCalibration {
    pub fn failed(quotes: &[OptionQuote]) -> Self {
        Self {
            params: None,
            optimizer_used: Optimizer::Exhausted,
            success: false,
            objective_value: None,
            results: quotes.iter().map(CalibrationResult::failed).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote() -> OptionQuote {
        OptionQuote {
            spot_price: 100.0,
            strike_price: 105.0,
            market_price: 2.5,
            time_to_maturity: 0.25,
            risk_free_rate: 0.03,
            dividend_yield: 0.0,
            is_call: true,
        }
    }

    #[test]
    fn test_quote_validation() {
        assert!(quote().validate().is_ok());
        let mut q = quote();
        q.strike_price = 0.0;
        assert!(q.validate().is_err());
        let mut q = quote();
        q.time_to_maturity = -0.1;
        assert!(q.validate().is_err());
        let mut q = quote();
        q.market_price = f64::NAN;
        assert!(q.validate().is_err());
        let mut q = quote();
        q.dividend_yield = -0.01;
        assert!(q.validate().is_err());
    }

    #[test]
    fn test_theta_window_follows_initial_guess() {
        let guess = HestonParameters::seeded(0.2);
        let bounds = ParameterBounds::for_initial_guess(&guess);
        assert!((bounds.theta.0 - 0.02).abs() < 1e-15);
        assert!((bounds.theta.1 - 0.06).abs() < 1e-15);
        assert_eq!(bounds.v0, (1e-4, 1.0));
        assert_eq!(bounds.kappa, (1e-4, 2.0));
        assert_eq!(bounds.sigma, (1e-4, 1.0));
        assert_eq!(bounds.rho, (-1.0, 1.0));
    }

    #[test]
    fn test_projection_and_violation() {
        let guess = HestonParameters::new(0.04, 0.1, 0.04, 0.1, 0.1).unwrap();
        let bounds = ParameterBounds::for_initial_guess(&guess);
        let mut x = vec![2.0, 0.5, 0.01, 0.3, -1.2];
        assert_eq!(bounds.violation(&x), Some(("v0", 2.0)));
        bounds.project(&mut x);
        assert_eq!(x, vec![1.0, 0.5, 0.02, 0.3, -1.0]);
        assert_eq!(bounds.violation(&x), None);
    }

    #[test]
    fn test_short_vectors_are_handled_without_panicking() {
        let bounds = ParameterBounds::for_initial_guess(&HestonParameters::seeded(0.2));
        let mut x = vec![5.0, -1.0];
        bounds.project(&mut x);
        assert_eq!(x, vec![1.0, 1e-4]);
        assert_eq!(bounds.violation(&[0.04]), None);
        assert_eq!(bounds.to_vec().len(), 5);
    }

    #[test]
    fn test_result_constructors() {
        let q = quote();
        let failed = CalibrationResult::failed(&q);
        assert!(!failed.success);
        assert_eq!(failed.optimizer_used, Optimizer::Exhausted);
        assert!(failed.params.is_none() && failed.squared_error.is_none());

        let params = HestonParameters::seeded(0.2);
        let ok = CalibrationResult::succeeded(&q, params, Optimizer::LBfgsB, 0.01, 2.6);
        assert!(ok.success);
        assert!((ok.squared_error.unwrap() - 0.01).abs() < 1e-12);
        assert_eq!(ok.strike, 105.0);
    }
}
