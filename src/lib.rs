//! # Heston-Surface: Heston Calibration and Expected-Variance Surfaces
//!
//! `heston-surface` fits the Heston stochastic-volatility model to observed option
//! prices and turns the fitted parameters into an expected-variance surface indexed
//! by strike and maturity.
//!
//! ## Core Features
//!
//! - **Bounded calibration**: a configurable fallback chain of optimizers
//!   (L-BFGS-B, projected gradient, SQP, Nelder-Mead); the first stage that
//!   converges inside the parameter box wins
//! - **Global calibration**: basin-hopping or CMA-ES for joint fits across a quote set
//! - **Pluggable pricing**: calibration runs against any [`PricingEngine`]; an
//!   analytic Heston engine and Black-Scholes helpers are included
//! - **Surface construction**: expected variance `theta + (v0 - theta) exp(-kappa t)`
//!   per quote, with failed calibrations kept as zero-filled rows
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use heston_surface::{
//!     build_volatility_surface, calibrate_surface, default_configs, optimizer_performance,
//!     AnalyticHestonEngine, HestonParameters, OptionQuote,
//! };
//!
//! # fn load_quotes() -> Vec<OptionQuote> { vec![] }
//! let quotes: Vec<OptionQuote> = load_quotes();
//! let engine = AnalyticHestonEngine::default();
//!
//! // Seed v0 and theta from a 20% volatility estimate
//! let initial = HestonParameters::seeded(0.2);
//! let results = calibrate_surface(&engine, &quotes, &initial, default_configs::fast())?;
//!
//! let surface = build_volatility_surface(&results);
//! for (row, vol) in surface.rows().iter().zip(surface.volatilities()) {
//!     println!("K={:.1} t={:.3} vol={:.4}", row.strike, row.time_to_maturity, vol);
//! }
//! println!("{}", optimizer_performance(&results));
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Configuration Presets
//!
//! - `production()`: tight tolerance, full-budget fallback chain
//! - `fast()`: reduced budgets for development
//! - `research()`: maximum budgets and tolerance
//! - `minimal()`: two-stage chain for quick validation

// ================================================================================================
// MODULES
// ================================================================================================

pub mod calibration;
pub mod error;
pub mod model_params;
pub mod models;
pub mod optim;
pub mod surface;

// ================================================================================================
// IMPORTS
// ================================================================================================

use anyhow::{anyhow, Context, Result};

use calibration::{global::GlobalCalibrator, pipeline::BoundedCalibrator};

// ================================================================================================
// PUBLIC RE-EXPORTS
// ================================================================================================

// Core types for market data, results and configuration
pub use calibration::{
    config::{BoundsPolicy, CalibrationConfig, GlobalConfig, GlobalMethod, StageDescriptor},
    metrics::{OptimizerPerformance, StagePerformance},
    objective::{evaluate, evaluate_batch, INVALID_OBJECTIVE},
    types::{BatchCalibration, CalibrationResult, OptionQuote, Optimizer, ParameterBounds},
};

pub use error::{PricingError, StageError};
pub use model_params::{expected_variance, HestonParameters};

// Pricing engines and reporting helpers
pub use models::bs::{black_scholes_price, implied_volatility};
pub use models::heston::AnalyticHestonEngine;
pub use models::traits::PricingEngine;
pub use models::utils::{price_sensitivity, HestonParameter};

pub use surface::{SurfaceRow, VolatilitySurface, VolatilitySurfacePoint};

// ================================================================================================
// DEFAULT CONFIGURATIONS
// ================================================================================================

/// Pre-configured calibration settings for common use cases.
///
/// # Available Configurations
///
/// - [`production()`]: Production-grade settings
/// - [`fast()`]: Development-optimized settings
/// - [`research()`]: High-precision settings for research
/// - [`minimal()`]: Quick validation settings
pub mod default_configs {
    use crate::calibration::config::CalibrationConfig;

    /// Production-grade configuration.
    ///
    /// **Characteristics:**
    /// - Full fallback chain: L-BFGS-B (15,000), projected gradient (2,000),
    ///   SQP (1,000), Nelder-Mead (10,000)
    /// - Convergence tolerance: 1e-10
    /// - 100 basin-hopping iterations for global fits
    ///
    /// # Example
    ///
    /// ```rust
    /// use heston_surface::default_configs;
    ///
    /// let config = default_configs::production();
    /// assert_eq!(config.stages.len(), 4);
    /// ```
    pub fn production() -> CalibrationConfig {
        CalibrationConfig::production()
    }

    /// Fast configuration for development and testing.
    ///
    /// **Characteristics:**
    /// - Full fallback chain with reduced iteration budgets
    /// - Convergence tolerance: 1e-8
    /// - 20 basin-hopping iterations
    ///
    /// # Example
    ///
    /// ```rust
    /// use heston_surface::default_configs;
    ///
    /// let config = default_configs::fast();
    /// assert!(config.tolerance <= 1e-8);
    /// ```
    pub fn fast() -> CalibrationConfig {
        CalibrationConfig::fast()
    }

    /// High-precision configuration for research and backtesting.
    ///
    /// **Characteristics:**
    /// - Fallback chain budgets up to 50,000 iterations
    /// - Convergence tolerance: 1e-12
    /// - 300 basin-hopping iterations, 5 BIPOP restarts for CMA-ES
    ///
    /// # Example
    ///
    /// ```rust
    /// use heston_surface::default_configs;
    ///
    /// let config = default_configs::research();
    /// // Use for research applications...
    /// ```
    pub fn research() -> CalibrationConfig {
        CalibrationConfig::research()
    }

    /// Minimal configuration for quick validation and debugging.
    ///
    /// **Characteristics:**
    /// - Two stages only: L-BFGS-B (200) then Nelder-Mead (500)
    /// - Convergence tolerance: 1e-6
    /// - Sequential execution
    ///
    /// # Example
    ///
    /// ```rust
    /// use heston_surface::default_configs;
    ///
    /// let config = default_configs::minimal();
    /// assert!(!config.parallel);
    /// ```
    pub fn minimal() -> CalibrationConfig {
        CalibrationConfig::minimal()
    }
}

/// Calibrate Heston parameters to a single option quote.
///
/// Walks the fallback chain of `config` from `initial` and returns the result of
/// the first stage that converges inside the bounds derived from `initial`
/// (see [`BoundsPolicy`]). Numerical failure is not an error: if every stage
/// fails the result has `success == false` and [`Optimizer::Exhausted`].
///
/// # Errors
///
/// * `anyhow::Error` if the quote violates its domain constraints
/// * `anyhow::Error` if `initial` is not a valid parameter set or has `theta <= 0`
/// * `anyhow::Error` if the configuration is invalid
///
/// # Example
///
/// ```rust,no_run
/// use heston_surface::{calibrate_heston, default_configs, AnalyticHestonEngine, HestonParameters, OptionQuote};
///
/// let quote = OptionQuote {
///     spot_price: 100.0,
///     strike_price: 105.0,
///     market_price: 2.47,
///     time_to_maturity: 0.25,
///     risk_free_rate: 0.03,
///     dividend_yield: 0.0,
///     is_call: true,
/// };
/// let engine = AnalyticHestonEngine::default();
/// let result = calibrate_heston(&engine, &quote, &HestonParameters::seeded(0.2), default_configs::fast())?;
/// if result.success {
///     println!("{} fitted {:?}", result.optimizer_used, result.params);
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn calibrate_heston(
    engine: &dyn PricingEngine,
    quote: &OptionQuote,
    initial: &HestonParameters,
    config: CalibrationConfig,
) -> Result<CalibrationResult> {
    quote.validate()?;
    validate_setup(initial, &config)?;
    Ok(BoundedCalibrator::new(engine, config).calibrate(quote, initial))
}

/// Calibrate every quote independently, one parameter set per quote.
///
/// Results come back in input order. Quotes are processed on the rayon
/// thread pool when the `parallel` feature is enabled and `config.parallel`
/// is set.
///
/// # Errors
///
/// * `anyhow::Error` if `quotes` is empty or any quote is invalid (the error
///   names its index)
/// * `anyhow::Error` if `initial` or `config` is invalid
pub fn calibrate_surface(
    engine: &dyn PricingEngine,
    quotes: &[OptionQuote],
    initial: &HestonParameters,
    config: CalibrationConfig,
) -> Result<Vec<CalibrationResult>> {
    validate_quotes(quotes)?;
    validate_setup(initial, &config)?;
    Ok(BoundedCalibrator::new(engine, config).calibrate_quotes(quotes, initial))
}

/// Fit one shared parameter set to all `quotes` through the bounded fallback chain.
///
/// The summary's objective is the summed squared error over the batch; the
/// per-quote breakdown is in [`BatchCalibration::results`].
pub fn calibrate_heston_joint(
    engine: &dyn PricingEngine,
    quotes: &[OptionQuote],
    initial: &HestonParameters,
    config: CalibrationConfig,
) -> Result<BatchCalibration> {
    validate_quotes(quotes)?;
    validate_setup(initial, &config)?;
    Ok(BoundedCalibrator::new(engine, config).calibrate_joint(quotes, initial))
}

/// Fit one shared parameter set to all `quotes` with a global search.
///
/// Uses basin-hopping or CMA-ES according to `config.global.method`. Both are
/// seeded from `config.global.seed`, so repeated calls give identical results.
///
/// # Example
///
/// ```rust,no_run
/// use heston_surface::{calibrate_heston_global, default_configs, AnalyticHestonEngine, HestonParameters, OptionQuote};
///
/// # fn load_quotes() -> Vec<OptionQuote> { vec![] }
/// let quotes = load_quotes();
/// let batch = calibrate_heston_global(
///     &AnalyticHestonEngine::default(),
///     &quotes,
///     &HestonParameters::seeded(0.25),
///     default_configs::fast(),
/// )?;
/// println!("objective = {:?}", batch.objective_value);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn calibrate_heston_global(
    engine: &dyn PricingEngine,
    quotes: &[OptionQuote],
    initial: &HestonParameters,
    config: CalibrationConfig,
) -> Result<BatchCalibration> {
    validate_quotes(quotes)?;
    validate_setup(initial, &config)?;
    Ok(GlobalCalibrator::new(engine, config).calibrate(quotes, initial))
}

/// Build the expected-variance surface from per-quote results.
///
/// Rows are sorted ascending by strike (then maturity); failed calibrations
/// are kept as zero-filled rows, so the row count always matches the input.
pub fn build_volatility_surface(results: &[CalibrationResult]) -> VolatilitySurface {
    VolatilitySurface::from_results(results)
}

/// Success rate and summed squared error per succeeding optimizer.
pub fn optimizer_performance(results: &[CalibrationResult]) -> OptimizerPerformance {
    OptimizerPerformance::from_results(results)
}

/// Initial guess seeded from the quote's Black-Scholes implied volatility.
///
/// Returns `None` when the market price admits no implied volatility.
pub fn initial_guess_from_quote(quote: &OptionQuote) -> Option<HestonParameters> {
    implied_volatility(quote, 1e-10).map(HestonParameters::seeded)
}

fn validate_quotes(quotes: &[OptionQuote]) -> Result<()> {
    if quotes.is_empty() {
        return Err(anyhow!("no option quotes supplied"));
    }
    for (i, quote) in quotes.iter().enumerate() {
        quote.validate().with_context(|| format!("quote #{}", i))?;
    }
    Ok(())
}

fn validate_setup(initial: &HestonParameters, config: &CalibrationConfig) -> Result<()> {
    initial.validate().context("invalid initial guess")?;
    if initial.theta <= 0.0 {
        return Err(anyhow!(
            "initial guess: theta = {} must be > 0 to anchor the theta bounds",
            initial.theta
        ));
    }
    config.validate()
}
