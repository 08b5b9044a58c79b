pub mod bs;
pub mod heston;

/// Common traits implemented by pricing engines
pub mod traits {
    use crate::calibration::types::OptionQuote;
    use crate::error::PricingError;
    use crate::model_params::HestonParameters;

    /// Stateless pricer consumed by the calibration core.
    ///
    /// Implementations must be pure functions of their arguments: calibration
    /// calls `price` concurrently from several threads and expects identical
    /// inputs to yield identical outputs.
    pub trait PricingEngine: Send + Sync {
        /// Short identifier used in logs
        fn name(&self) -> &str;

        /// Theoretical price of `quote` under `params`.
        fn price(&self, params: &HestonParameters, quote: &OptionQuote)
            -> Result<f64, PricingError>;
    }
}

/// Utility functions shared by pricing engines and reporting
pub mod utils {
    use crate::calibration::types::OptionQuote;
    use crate::model_params::HestonParameters;
    use crate::models::traits::PricingEngine;
    use serde::{Deserialize, Serialize};

    /// Forward price `S exp((r - q) T)`.
    pub fn forward_price(quote: &OptionQuote) -> f64 {
        quote.spot_price * ((quote.risk_free_rate - quote.dividend_yield) * quote.time_to_maturity).exp()
    }

    /// Parameter varied by [`price_sensitivity`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum HestonParameter {
        V0,
        Kappa,
        Theta,
        Sigma,
        Rho,
    }

    impl HestonParameter {
        fn apply(self, base: &HestonParameters, value: f64) -> HestonParameters {
            let mut params = *base;
            match self {
                HestonParameter::V0 => params.v0 = value,
                HestonParameter::Kappa => params.kappa = value,
                HestonParameter::Theta => params.theta = value,
                HestonParameter::Sigma => params.sigma = value,
                HestonParameter::Rho => params.rho = value,
            }
            params
        }
    }

    /// Prices `quote` while sweeping one parameter of `base` over `values`.
    ///
    /// Points the engine cannot price are skipped, so the output may be shorter
    /// than `values`.
    pub fn price_sensitivity(
        engine: &dyn PricingEngine,
        base: &HestonParameters,
        quote: &OptionQuote,
        parameter: HestonParameter,
        values: &[f64],
    ) -> Vec<(f64, f64)> {
        values
            .iter()
            .filter_map(|&value| {
                let params = parameter.apply(base, value);
                match engine.price(&params, quote) {
                    Ok(price) => Some((value, price)),
                    Err(e) => {
                        tracing::debug!(?parameter, value, error = %e, "sensitivity point skipped");
                        None
                    }
                }
            })
            .collect()
    }

    /// `n` evenly spaced values from `start` to `end` inclusive.
    pub fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
        match n {
            0 => Vec::new(),
            1 => vec![start],
            _ => {
                let step = (end - start) / (n - 1) as f64;
                (0..n).map(|i| start + step * i as f64).collect()
            }
        }
    }
}
