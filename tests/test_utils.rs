#![allow(dead_code)] // Each integration test binary uses a different subset

use serde::Deserialize;
use heston_surface::{
    AnalyticHestonEngine, CalibrationConfig, HestonParameters, OptionQuote, PricingEngine, PricingError,
};

/// CSV row structure of the synthetic quote fixtures
#[derive(Debug, Deserialize)]
struct CsvRow {
    spot_price: f64,
    strike_price: f64,
    market_price: f64,
    time_to_maturity: f64,
    risk_free_rate: f64,
    dividend_yield: f64,
    #[serde(rename = "option_type")]
    option_type: String,
}

/// Load option quotes from a CSV file
pub fn load_quotes(file_path: &str) -> Result<Vec<OptionQuote>, Box<dyn std::error::Error>> {
    let mut reader = csv::Reader::from_path(file_path)?;
    let mut quotes = Vec::new();

    for result in reader.deserialize() {
        let row: CsvRow = result?;
        quotes.push(OptionQuote {
            spot_price: row.spot_price,
            strike_price: row.strike_price,
            market_price: row.market_price,
            time_to_maturity: row.time_to_maturity,
            risk_free_rate: row.risk_free_rate,
            dividend_yield: row.dividend_yield,
            is_call: row.option_type.eq_ignore_ascii_case("call"),
        });
    }

    Ok(quotes)
}

/// Parameters used to generate synthetic market prices
pub fn reference_params() -> HestonParameters {
    HestonParameters::new(0.04, 1.5, 0.04, 0.3, -0.5).expect("reference parameters are valid")
}

/// Call quote on spot 100 with a placeholder premium
pub fn base_quote(strike: f64, time_to_maturity: f64) -> OptionQuote {
    OptionQuote {
        spot_price: 100.0,
        strike_price: strike,
        market_price: 0.0,
        time_to_maturity,
        risk_free_rate: 0.03,
        dividend_yield: 0.0,
        is_call: true,
    }
}

/// Quotes whose market prices are the analytic Heston prices under `params`
pub fn synthetic_quotes(params: &HestonParameters, strikes: &[f64], time_to_maturity: f64) -> Vec<OptionQuote> {
    let engine = AnalyticHestonEngine::default();
    strikes
        .iter()
        .map(|&strike| {
            let quote = base_quote(strike, time_to_maturity);
            let price = engine.price(params, &quote).expect("reference price");
            quote.with_market_price(price)
        })
        .collect()
}

/// Sequential fast configuration so test output is easy to follow
pub fn create_test_config() -> CalibrationConfig {
    CalibrationConfig {
        parallel: false,
        ..CalibrationConfig::fast()
    }
}

/// Engine that rejects every parameter set
pub struct FailingEngine;

impl PricingEngine for FailingEngine {
    fn name(&self) -> &str {
        "failing"
    }

    fn price(&self, _params: &HestonParameters, _quote: &OptionQuote) -> Result<f64, PricingError> {
        Err(PricingError::numerical("engine unavailable"))
    }
}

/// Analytic engine that cannot price one particular strike
pub struct StrikeFailingEngine {
    pub failing_strike: f64,
    pub inner: AnalyticHestonEngine,
}

impl PricingEngine for StrikeFailingEngine {
    fn name(&self) -> &str {
        "strike-failing"
    }

    fn price(&self, params: &HestonParameters, quote: &OptionQuote) -> Result<f64, PricingError> {
        if quote.strike_price == self.failing_strike {
            return Err(PricingError::invalid_quote("strike not supported"));
        }
        self.inner.price(params, quote)
    }
}
