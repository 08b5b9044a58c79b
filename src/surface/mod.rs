//! Expected-variance surface assembled from per-quote calibrations.
//!
//! Every calibrated quote contributes the model's expected variance at its own
//! maturity, `E[v_t] = theta + (v0 - theta) exp(-kappa t)`. Quotes on which the
//! calibration failed keep their row with zeroed model columns so the table
//! always has one row per input.

use crate::calibration::types::CalibrationResult;
use crate::model_params::HestonParameters;
use serde::Serialize;

/// One row of the surface table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SurfaceRow {
    pub strike: f64,
    pub v0: f64,
    pub kappa: f64,
    pub theta: f64,
    pub sigma: f64,
    pub rho: f64,
    pub theoretical_price: f64,
    pub market_price: f64,
    pub time_to_maturity: f64,
    pub expected_variance: f64,
    /// `false` for zero-filled rows of failed calibrations
    pub calibrated: bool,
}

impl SurfaceRow {
    pub fn from_result(result: &CalibrationResult) -> Self {
        let (p, calibrated) = match (result.success, result.params) {
            (true, Some(p)) => (p, true),
            _ => (HestonParameters::zeroed(), false),
        };
        Self {
            strike: result.strike,
            v0: p.v0,
            kappa: p.kappa,
            theta: p.theta,
            sigma: p.sigma,
            rho: p.rho,
            theoretical_price: if calibrated { result.estimated_price.unwrap_or(0.0) } else { 0.0 },
            market_price: result.market_price,
            time_to_maturity: result.time_to_maturity,
            expected_variance: if calibrated { p.expected_variance(result.time_to_maturity) } else { 0.0 },
            calibrated,
        }
    }

    pub fn params(&self) -> Option<HestonParameters> {
        self.calibrated.then_some(HestonParameters {
            v0: self.v0,
            kappa: self.kappa,
            theta: self.theta,
            sigma: self.sigma,
            rho: self.rho,
        })
    }

    /// Annualised volatility `sqrt(E[v_t])`.
    pub fn volatility(&self) -> f64 {
        self.expected_variance.max(0.0).sqrt()
    }
}

/// Surface point for a successfully calibrated quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolatilitySurfacePoint {
    pub strike: f64,
    pub time_to_maturity: f64,
    pub model_params: HestonParameters,
    pub theoretical_price: f64,
    pub market_price: f64,
    pub expected_variance: f64,
}

/// Surface table sorted ascending by strike, then maturity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolatilitySurface {
    rows: Vec<SurfaceRow>,
}

impl VolatilitySurface {
    pub fn from_results(results: &[CalibrationResult]) -> Self {
        let mut rows: Vec<SurfaceRow> = results.iter().map(SurfaceRow::from_result).collect();
        rows.sort_by(|a, b| {
            a.strike
                .total_cmp(&b.strike)
                .then(a.time_to_maturity.total_cmp(&b.time_to_maturity))
        });
        tracing::debug!(
            rows = rows.len(),
            failed = rows.iter().filter(|r| !r.calibrated).count(),
            "built volatility surface"
        );
        Self { rows }
    }

    pub fn rows(&self) -> &[SurfaceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Points for the calibrated rows only.
    pub fn to_points(&self) -> Vec<VolatilitySurfacePoint> {
        self.rows
            .iter()
            .filter_map(|row| {
                row.params().map(|model_params| VolatilitySurfacePoint {
                    strike: row.strike,
                    time_to_maturity: row.time_to_maturity,
                    model_params,
                    theoretical_price: row.theoretical_price,
                    market_price: row.market_price,
                    expected_variance: row.expected_variance,
                })
            })
            .collect()
    }

    /// `sqrt(expected_variance)` per row, zero for failed rows.
    pub fn volatilities(&self) -> Vec<f64> {
        self.rows.iter().map(SurfaceRow::volatility).collect()
    }

    pub fn failed_strikes(&self) -> Vec<f64> {
        self.rows
            .iter()
            .filter(|row| !row.calibrated)
            .map(|row| row.strike)
            .collect()
    }
}
