//! Squared-error calibration objective.
//!
//! Pricing failures never propagate out of here: any parameter vector the
//! engine cannot price scores [`INVALID_OBJECTIVE`], which every optimizer
//! treats as a very bad but finite point.

use crate::calibration::types::OptionQuote;
use crate::model_params::HestonParameters;
use crate::models::traits::PricingEngine;

/// Objective value reported for parameter vectors that cannot be priced.
pub const INVALID_OBJECTIVE: f64 = 1.0e12;

/// `(price(params, quote) - market_price)^2`, or the sentinel on failure.
pub fn evaluate(engine: &dyn PricingEngine, params: &HestonParameters, quote: &OptionQuote) -> f64 {
    match engine.price(params, quote) {
        Ok(price) if price.is_finite() => {
            let error = price - quote.market_price;
            (error * error).min(INVALID_OBJECTIVE)
        }
        Ok(price) => {
            tracing::trace!(engine = engine.name(), price, "non-finite model price");
            INVALID_OBJECTIVE
        }
        Err(e) => {
            tracing::trace!(engine = engine.name(), error = %e, "pricing failed");
            INVALID_OBJECTIVE
        }
    }
}

/// Sum of [`evaluate`] over `quotes` with one shared parameter vector.
///
/// Saturates at the sentinel as soon as any quote cannot be priced.
pub fn evaluate_batch(engine: &dyn PricingEngine, params: &HestonParameters, quotes: &[OptionQuote]) -> f64 {
    let mut total = 0.0;
    for quote in quotes {
        let value = evaluate(engine, params, quote);
        if value >= INVALID_OBJECTIVE {
            return INVALID_OBJECTIVE;
        }
        total += value;
    }
    total.min(INVALID_OBJECTIVE)
}

/// Objective over optimizer vectors for the single-quote or joint fit.
///
/// This is the only view of the problem the optimizers get: a pure function
/// from `[v0, kappa, theta, sigma, rho]` to a non-negative score.
#[derive(Clone, Copy)]
pub struct QuoteObjective<'a> {
    engine: &'a dyn PricingEngine,
    quotes: &'a [OptionQuote],
}

impl<'a> QuoteObjective<'a> {
    pub fn new(engine: &'a dyn PricingEngine, quotes: &'a [OptionQuote]) -> Self {
        Self { engine, quotes }
    }

    pub fn single(engine: &'a dyn PricingEngine, quote: &'a OptionQuote) -> Self {
        Self::new(engine, std::slice::from_ref(quote))
    }

    /// Score of an optimizer vector; wrong-length vectors score the sentinel.
    pub fn value(&self, x: &[f64]) -> f64 {
        match HestonParameters::from_slice(x) {
            Some(params) => evaluate_batch(self.engine, &params, self.quotes),
            None => INVALID_OBJECTIVE,
        }
    }
}
