//! Error taxonomies used inside the calibration core.
//!
//! None of these cross the calibration boundary: a [`PricingError`] becomes the
//! objective sentinel and a [`StageError`] advances the fallback chain. They are
//! public so that custom pricing engines and diagnostics can match on them.

use thiserror::Error;

/// Failure of a single pricing call.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum PricingError {
    /// The parameter vector is outside the model's domain.
    #[error("invalid model parameters: {message}")]
    InvalidParameters { message: String },

    /// The quote itself cannot be priced (non-positive strike, maturity, ...).
    #[error("invalid quote: {message}")]
    InvalidQuote { message: String },

    /// The numerical scheme produced a non-finite value.
    #[error("numerical failure: {message}")]
    NumericalFailure { message: String },
}

impl PricingError {
    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    pub fn invalid_quote(message: impl Into<String>) -> Self {
        Self::InvalidQuote {
            message: message.into(),
        }
    }

    pub fn numerical(message: impl Into<String>) -> Self {
        Self::NumericalFailure {
            message: message.into(),
        }
    }
}

/// Failure of one optimizer stage in the fallback chain.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum StageError {
    /// The iteration budget ran out before the convergence criterion was met.
    #[error("did not converge after {iterations} iterations (objective {objective:.3e})")]
    NotConverged { iterations: usize, objective: f64 },

    /// The stage ended on a non-finite or sentinel objective value.
    #[error("ended on an infeasible point (objective {objective:.3e})")]
    Infeasible { objective: f64 },

    /// The stage's solution lies outside the configured parameter box.
    #[error("solution outside parameter bounds: {parameter} = {value}")]
    OutOfBounds { parameter: &'static str, value: f64 },

    /// The optimizer backend reported an error of its own.
    #[error("optimizer backend error: {0}")]
    Backend(String),
}
