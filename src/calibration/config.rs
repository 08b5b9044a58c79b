use crate::calibration::types::{Optimizer, ParameterBounds};
use crate::model_params::HestonParameters;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// One entry of the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    pub optimizer: Optimizer,
    /// Whether the optimizer sees the parameter box
    pub bounded: bool,
    pub max_iterations: usize,
}

impl StageDescriptor {
    pub const fn new(optimizer: Optimizer, bounded: bool, max_iterations: usize) -> Self {
        Self {
            optimizer,
            bounded,
            max_iterations,
        }
    }
}

/// L-BFGS-B, projected gradient, SQP, then unconstrained Nelder-Mead.
pub fn default_stages() -> Vec<StageDescriptor> {
    vec![
        StageDescriptor::new(Optimizer::LBfgsB, true, 15000),
        StageDescriptor::new(Optimizer::ProjectedGradient, true, 2000),
        StageDescriptor::new(Optimizer::Sqp, true, 1000),
        StageDescriptor::new(Optimizer::NelderMead, false, 10000),
    ]
}

/// Parameter limits applied around an initial guess.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundsPolicy {
    #[serde(default = "default_v0_bounds")]
    pub v0: (f64, f64),
    #[serde(default = "default_kappa_bounds")]
    pub kappa: (f64, f64),
    #[serde(default = "default_sigma_bounds")]
    pub sigma: (f64, f64),
    #[serde(default = "default_rho_bounds")]
    pub rho: (f64, f64),
    /// Lower theta bound as a multiple of the initial theta
    #[serde(default = "default_theta_lower")]
    pub theta_lower: f64,
    /// Upper theta bound as a multiple of the initial theta
    #[serde(default = "default_theta_upper")]
    pub theta_upper: f64,
}

impl Default for BoundsPolicy {
    fn default() -> Self {
        Self {
            v0: default_v0_bounds(),
            kappa: default_kappa_bounds(),
            sigma: default_sigma_bounds(),
            rho: default_rho_bounds(),
            theta_lower: default_theta_lower(),
            theta_upper: default_theta_upper(),
        }
    }
}

impl BoundsPolicy {
    /// Concrete box for a calibration started from `initial`.
    pub fn bounds_for(&self, initial: &HestonParameters) -> ParameterBounds {
        ParameterBounds {
            v0: self.v0,
            kappa: self.kappa,
            theta: (initial.theta * self.theta_lower, initial.theta * self.theta_upper),
            sigma: self.sigma,
            rho: self.rho,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, (lo, hi)) in [
            ("v0", self.v0),
            ("kappa", self.kappa),
            ("sigma", self.sigma),
            ("rho", self.rho),
        ] {
            if !(lo.is_finite() && hi.is_finite() && lo <= hi) {
                return Err(anyhow!("BoundsPolicy: {} bounds ({}, {}) are not an interval", name, lo, hi));
            }
        }
        if !(self.theta_lower > 0.0 && self.theta_lower <= self.theta_upper && self.theta_upper.is_finite()) {
            return Err(anyhow!(
                "BoundsPolicy: theta window [{}, {}] must satisfy 0 < lower <= upper",
                self.theta_lower,
                self.theta_upper
            ));
        }
        Ok(())
    }
}

/// Global search strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalMethod {
    /// Random perturbation, local L-BFGS-B, Metropolis acceptance
    BasinHopping,
    /// CMA-ES around the initial guess followed by L-BFGS-B polish
    CmaEs,
}

/// Settings for [`GlobalCalibrator`](crate::calibration::global::GlobalCalibrator).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default = "default_global_method")]
    pub method: GlobalMethod,
    /// Basin-hopping iterations
    #[serde(default = "default_hops")]
    pub iterations: usize,
    /// Perturbation half-width as a fraction of each parameter's bound width
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    /// Metropolis temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Random seed for reproducibility
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Iteration budget of every local minimization
    #[serde(default = "default_local_max_iterations")]
    pub local_max_iterations: usize,
    /// CMA-ES population size
    #[serde(default = "default_pop_size")]
    pub pop_size: usize,
    /// CMA-ES generations
    #[serde(default = "default_max_gen")]
    pub max_gen: usize,
    /// Number of BIPOP restarts (0 = no BIPOP)
    #[serde(default)]
    pub bipop_restarts: usize,
    /// Total CMA-ES function evaluations budget
    #[serde(default = "default_total_evals_budget")]
    pub total_evals_budget: usize,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            method: default_global_method(),
            iterations: default_hops(),
            step_size: default_step_size(),
            temperature: default_temperature(),
            seed: default_seed(),
            local_max_iterations: default_local_max_iterations(),
            pop_size: default_pop_size(),
            max_gen: default_max_gen(),
            bipop_restarts: 0,
            total_evals_budget: default_total_evals_budget(),
        }
    }
}

/// Main configuration struct for calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Ordered fallback chain; the first succeeding stage wins
    #[serde(default = "default_stages")]
    pub stages: Vec<StageDescriptor>,

    /// Convergence tolerance handed to every optimizer
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Relative finite-difference step for numerical gradients
    #[serde(default = "default_fd_step")]
    pub fd_step: f64,

    /// Objective value treated as an exact fit
    #[serde(default = "default_objective_floor")]
    pub objective_floor: f64,

    #[serde(default)]
    pub bounds: BoundsPolicy,

    /// Calibrate independent quotes on the rayon pool
    #[serde(default = "default_parallel")]
    pub parallel: bool,

    #[serde(default)]
    pub global: GlobalConfig,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            tolerance: default_tolerance(),
            fd_step: default_fd_step(),
            objective_floor: default_objective_floor(),
            bounds: BoundsPolicy::default(),
            parallel: default_parallel(),
            global: GlobalConfig::default(),
        }
    }
}

impl CalibrationConfig {
    /// Default configuration for production calibration with high accuracy
    pub fn production() -> Self {
        Self {
            tolerance: 1e-10,
            global: GlobalConfig {
                iterations: 100,
                local_max_iterations: 500,
                bipop_restarts: 2,
                ..GlobalConfig::default()
            },
            ..Self::default()
        }
    }

    /// Fast configuration for development and testing
    pub fn fast() -> Self {
        Self {
            stages: vec![
                StageDescriptor::new(Optimizer::LBfgsB, true, 2000),
                StageDescriptor::new(Optimizer::ProjectedGradient, true, 500),
                StageDescriptor::new(Optimizer::Sqp, true, 300),
                StageDescriptor::new(Optimizer::NelderMead, false, 3000),
            ],
            tolerance: 1e-8,
            global: GlobalConfig {
                iterations: 20,
                local_max_iterations: 200,
                pop_size: 20,
                max_gen: 40,
                total_evals_budget: 5000,
                ..GlobalConfig::default()
            },
            ..Self::default()
        }
    }

    /// High-precision configuration for research and backtesting
    pub fn research() -> Self {
        Self {
            stages: vec![
                StageDescriptor::new(Optimizer::LBfgsB, true, 50000),
                StageDescriptor::new(Optimizer::ProjectedGradient, true, 10000),
                StageDescriptor::new(Optimizer::Sqp, true, 5000),
                StageDescriptor::new(Optimizer::NelderMead, false, 50000),
            ],
            tolerance: 1e-12,
            objective_floor: 1e-16,
            global: GlobalConfig {
                iterations: 300,
                local_max_iterations: 1000,
                pop_size: 60,
                max_gen: 300,
                bipop_restarts: 5,
                total_evals_budget: 200000,
                ..GlobalConfig::default()
            },
            ..Self::default()
        }
    }

    /// Minimal configuration for quick validation and debugging
    pub fn minimal() -> Self {
        Self {
            stages: vec![
                StageDescriptor::new(Optimizer::LBfgsB, true, 200),
                StageDescriptor::new(Optimizer::NelderMead, false, 500),
            ],
            tolerance: 1e-6,
            objective_floor: 1e-10,
            parallel: false,
            global: GlobalConfig {
                iterations: 5,
                local_max_iterations: 100,
                pop_size: 10,
                max_gen: 20,
                total_evals_budget: 1000,
                ..GlobalConfig::default()
            },
            ..Self::default()
        }
    }

    /// Parses a TOML document; absent keys take their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).context("failed to parse calibration config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(anyhow!("CalibrationConfig: fallback chain is empty"));
        }
        if let Some(stage) = self.stages.iter().find(|s| !s.optimizer.is_local()) {
            return Err(anyhow!(
                "CalibrationConfig: {} cannot run as a fallback stage",
                stage.optimizer
            ));
        }
        if let Some(stage) = self.stages.iter().find(|s| s.max_iterations == 0) {
            return Err(anyhow!(
                "CalibrationConfig: {} stage has a zero iteration budget",
                stage.optimizer
            ));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(anyhow!("CalibrationConfig: tolerance = {} must be > 0", self.tolerance));
        }
        if !(self.fd_step > 0.0 && self.fd_step < 1.0) {
            return Err(anyhow!("CalibrationConfig: fd_step = {} must lie in (0, 1)", self.fd_step));
        }
        if !(self.objective_floor >= 0.0) {
            return Err(anyhow!(
                "CalibrationConfig: objective_floor = {} must be >= 0",
                self.objective_floor
            ));
        }
        if !(self.global.temperature > 0.0 && self.global.step_size > 0.0) {
            return Err(anyhow!(
                "GlobalConfig: temperature = {} and step_size = {} must be > 0",
                self.global.temperature,
                self.global.step_size
            ));
        }
        self.bounds.validate()
    }
}

fn default_v0_bounds() -> (f64, f64) {
    ParameterBounds::V0
}

fn default_kappa_bounds() -> (f64, f64) {
    ParameterBounds::KAPPA
}

fn default_sigma_bounds() -> (f64, f64) {
    ParameterBounds::SIGMA
}

fn default_rho_bounds() -> (f64, f64) {
    ParameterBounds::RHO
}

fn default_theta_lower() -> f64 {
    0.5
}

fn default_theta_upper() -> f64 {
    1.5
}

fn default_global_method() -> GlobalMethod {
    GlobalMethod::BasinHopping
}

fn default_hops() -> usize {
    50
}

fn default_step_size() -> f64 {
    0.1
}

fn default_temperature() -> f64 {
    1.0
}

fn default_seed() -> u64 {
    123456
}

fn default_local_max_iterations() -> usize {
    300
}

fn default_pop_size() -> usize {
    30
}

fn default_max_gen() -> usize {
    100
}

fn default_total_evals_budget() -> usize {
    20000
}

fn default_tolerance() -> f64 {
    1e-9
}

fn default_fd_step() -> f64 {
    1e-7
}

fn default_objective_floor() -> f64 {
    1e-14
}

fn default_parallel() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_chain_order() {
        let stages = default_stages();
        let order: Vec<Optimizer> = stages.iter().map(|s| s.optimizer).collect();
        assert_eq!(
            order,
            vec![
                Optimizer::LBfgsB,
                Optimizer::ProjectedGradient,
                Optimizer::Sqp,
                Optimizer::NelderMead
            ]
        );
        assert!(stages[..3].iter().all(|s| s.bounded));
        assert!(!stages[3].bounded);
    }

    #[test]
    fn test_presets_validate() {
        for config in [
            CalibrationConfig::default(),
            CalibrationConfig::production(),
            CalibrationConfig::fast(),
            CalibrationConfig::research(),
            CalibrationConfig::minimal(),
        ] {
            assert!(config.validate().is_ok(), "{:?}", config);
        }
    }

    #[test]
    fn test_from_toml_partial_document() {
        let config = CalibrationConfig::from_toml_str(
            r#"
            tolerance = 1e-7
            parallel = false

            [[stages]]
            optimizer = "Sqp"
            bounded = true
            max_iterations = 50

            [bounds]
            theta_lower = 0.8

            [global]
            method = "cma_es"
            seed = 7
            "#,
        )
        .unwrap();
        assert_eq!(config.tolerance, 1e-7);
        assert!(!config.parallel);
        assert_eq!(config.stages, vec![StageDescriptor::new(Optimizer::Sqp, true, 50)]);
        assert_eq!(config.bounds.theta_lower, 0.8);
        assert_eq!(config.bounds.theta_upper, 1.5);
        assert_eq!(config.bounds.v0, ParameterBounds::V0);
        assert_eq!(config.global.method, GlobalMethod::CmaEs);
        assert_eq!(config.global.seed, 7);
        assert_eq!(config.fd_step, default_fd_step());
    }

    #[test]
    fn test_rejects_global_optimizer_in_chain() {
        let err = CalibrationConfig::from_toml_str(
            r#"
            [[stages]]
            optimizer = "BasinHopping"
            bounded = true
            max_iterations = 10
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("basin-hopping"), "{}", err);
    }

    #[test]
    fn test_bounds_policy_theta_window() {
        let initial = HestonParameters::new(0.04, 0.1, 0.08, 0.1, 0.1).unwrap();
        let bounds = BoundsPolicy::default().bounds_for(&initial);
        assert!((bounds.theta.0 - 0.04).abs() < 1e-15);
        assert!((bounds.theta.1 - 0.12).abs() < 1e-15);
        assert_eq!(bounds.kappa, (1e-4, 2.0));
    }
}
