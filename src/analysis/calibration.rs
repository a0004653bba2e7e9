//! Search for the strongest lever setting a model tolerates.
use crate::config::{Overrides, RunRequest, SimulationConfig};
use crate::error::{Result, SimulationError};
use crate::model::Model;
use crate::models::freight;
use tracing::debug;

/// Which lever to push, which flag must hold, and how finely to search.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationPlan {
    pub lever: String,
    /// Column that must equal 1 on every row for a run to count as viable.
    pub flag: String,
    pub low: f64,
    pub high: f64,
    pub resolution: f64,
    pub config: SimulationConfig,
}

impl Default for CalibrationPlan {
    fn default() -> Self {
        Self {
            lever: freight::CARBON_TAX_RATE.to_string(),
            flag: freight::VIABILITY_FLAG.to_string(),
            low: 0.0,
            high: 30_000.0,
            resolution: 100.0,
            config: SimulationConfig::default(),
        }
    }
}

/// Largest lever value for which `flag` stays 1 over the whole run.
///
/// Returns 0 if the model is not viable even with the lever at 0. Bisects the
/// range until it is no wider than `resolution`, then scans upward from the last
/// viable bound in `resolution` steps.
pub fn max_viable_level(model: &Model, base: &Overrides, plan: &CalibrationPlan) -> Result<f64> {
    if !(plan.resolution.is_finite() && plan.resolution > 0.0) {
        return Err(SimulationError::invalid_parameter(
            "resolution",
            format!("must be positive, got {}", plan.resolution),
        ));
    }
    if !(plan.high >= plan.low) {
        return Err(SimulationError::invalid_parameter(
            "high",
            format!("{} is below the search floor {}", plan.high, plan.low),
        ));
    }

    let viable = |level: f64| -> Result<bool> {
        let mut overrides = base.clone();
        overrides.insert(plan.lever.clone(), level);
        let request = RunRequest {
            overrides,
            columns: vec![plan.flag.clone()],
            ..Default::default()
        }
        .with_config(plan.config);
        let table = model.run(&request)?;
        Ok(table.column(&plan.flag)?.iter().all(|&v| v == 1.0))
    };

    if !viable(0.0)? {
        return Ok(0.0);
    }

    let (mut low, mut high) = (plan.low, plan.high);
    let mut best = 0.0;
    while high - low > plan.resolution {
        let mid = low + (high - low) / 2.0;
        // Range narrower than the float spacing.
        if mid <= low || mid >= high {
            break;
        }
        if viable(mid)? {
            best = mid;
            low = mid;
        } else {
            high = mid;
        }
    }

    let mut level = low;
    while level <= high {
        if viable(level)? {
            best = level;
        } else {
            break;
        }
        let next = level + plan.resolution;
        if next <= level {
            break;
        }
        level = next;
    }

    debug!(lever = %plan.lever, best, "Calibration complete");
    Ok(best)
}
