use crate::calibration::types::{CalibrationResult, Optimizer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Aggregate over the results one fallback stage produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagePerformance {
    pub optimizer: Optimizer,
    /// Quotes this stage calibrated
    pub successes: usize,
    /// `successes` as a percentage of every result in the batch
    pub success_rate: f64,
    /// Sum of `(estimated - market)^2` over this stage's quotes
    pub summed_squared_error: f64,
}

/// Optimizer reliability over a batch of per-quote calibrations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizerPerformance {
    /// One row per succeeding stage, sorted by summed error ascending
    pub stages: Vec<StagePerformance>,
    pub total: usize,
    /// Results on which every stage failed
    pub failures: usize,
}

impl OptimizerPerformance {
    pub fn from_results(results: &[CalibrationResult]) -> Self {
        let total = results.len();
        let mut groups: BTreeMap<Optimizer, (usize, f64)> = BTreeMap::new();
        let mut failures = 0;

        for result in results {
            if !result.success {
                failures += 1;
                continue;
            }
            let entry = groups.entry(result.optimizer_used).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += result.squared_error.unwrap_or(0.0);
        }

        let mut stages: Vec<StagePerformance> = groups
            .into_iter()
            .map(|(optimizer, (successes, summed_squared_error))| StagePerformance {
                optimizer,
                successes,
                success_rate: percentage(successes, total),
                summed_squared_error,
            })
            .collect();
        stages.sort_by(|a, b| a.summed_squared_error.total_cmp(&b.summed_squared_error));

        Self {
            stages,
            total,
            failures,
        }
    }

    pub fn get(&self, optimizer: Optimizer) -> Option<&StagePerformance> {
        self.stages.iter().find(|s| s.optimizer == optimizer)
    }

    /// Percentage of results calibrated by any stage.
    pub fn overall_success_rate(&self) -> f64 {
        percentage(self.total - self.failures, self.total)
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

impl fmt::Display for OptimizerPerformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<20} {:>10} {:>14}", "optimizer", "success", "sum sq error")?;
        for stage in &self.stages {
            writeln!(
                f,
                "{:<20} {:>9.1}% {:>14.6e}",
                stage.optimizer.name(),
                stage.success_rate,
                stage.summed_squared_error
            )?;
        }
        write!(f, "failed: {}/{}", self.failures, self.total)
    }
}
