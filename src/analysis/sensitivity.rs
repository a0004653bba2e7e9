//! One-at-a-time parameter sweeps against a baseline run.
use crate::config::{Overrides, RunRequest, SimulationConfig};
use crate::error::Result;
use crate::model::Model;
use crate::models::freight;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct SweepPlan {
    /// Parameters to vary, each with the values to try.
    pub parameters: Vec<(String, Vec<f64>)>,
    pub lever: String,
    /// Lever settings crossed with every parameter value.
    pub levels: Vec<f64>,
    pub emissions: String,
    pub profit: String,
    pub flag: String,
    pub config: SimulationConfig,
}

impl SweepPlan {
    /// A sweep over the freight model's outputs.
    pub fn freight(parameters: Vec<(String, Vec<f64>)>, levels: Vec<f64>) -> Self {
        Self {
            parameters,
            lever: freight::CARBON_TAX_RATE.to_string(),
            levels,
            emissions: freight::CUMULATIVE_CO2.to_string(),
            profit: freight::CUMULATIVE_PROFIT.to_string(),
            flag: freight::VIABILITY_FLAG.to_string(),
            config: SimulationConfig::default(),
        }
    }

    fn request(&self, overrides: Overrides) -> RunRequest {
        RunRequest {
            overrides,
            columns: vec![self.emissions.clone(), self.profit.clone(), self.flag.clone()],
            ..Default::default()
        }
        .with_config(self.config)
    }
}

/// Outcome of one scenario relative to the baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityRow {
    pub parameter: String,
    pub value: f64,
    pub level: f64,
    /// Positive when the scenario emits less than the baseline.
    pub emissions_reduction_pct: f64,
    pub profit_change_pct: f64,
    pub viable: bool,
}

struct Finals {
    emissions: f64,
    profit: f64,
    viable: bool,
}

fn finals(model: &Model, plan: &SweepPlan, overrides: Overrides) -> Result<Finals> {
    let table = model.run(&plan.request(overrides))?;
    Ok(Finals {
        emissions: table.last(&plan.emissions)?,
        profit: table.last(&plan.profit)?,
        viable: table.last(&plan.flag)? == 1.0,
    })
}

/// Runs every (parameter, value, level) scenario on top of `base`.
///
/// Only the swept parameter and the lever differ from `base` in each scenario.
/// Scenarios run in parallel; rows come back in input order. A scenario that fails
/// is logged and left out. A failing baseline is an error.
pub fn one_at_a_time(model: &Model, base: &Overrides, plan: &SweepPlan) -> Result<Vec<SensitivityRow>> {
    let baseline = finals(model, plan, base.clone())?;

    let scenarios: Vec<(&str, f64, f64)> = plan
        .parameters
        .iter()
        .flat_map(|(name, values)| {
            values
                .iter()
                .flat_map(move |&value| plan.levels.iter().map(move |&level| (name.as_str(), value, level)))
        })
        .collect();

    let rows: Vec<Option<SensitivityRow>> = scenarios
        .par_iter()
        .map(|&(parameter, value, level)| {
            let mut overrides = base.clone();
            overrides.insert(parameter.to_string(), value);
            overrides.insert(plan.lever.clone(), level);
            match finals(model, plan, overrides) {
                Ok(outcome) => Some(SensitivityRow {
                    parameter: parameter.to_string(),
                    value,
                    level,
                    emissions_reduction_pct: 100.0 * (1.0 - outcome.emissions / baseline.emissions),
                    profit_change_pct: 100.0 * (outcome.profit - baseline.profit) / baseline.profit,
                    viable: outcome.viable,
                }),
                Err(e) => {
                    warn!(parameter, value, level, error = %e, "Skipping failed scenario");
                    None
                }
            }
        })
        .collect();

    let rows: Vec<SensitivityRow> = rows.into_iter().flatten().collect();
    debug!(scenarios = scenarios.len(), completed = rows.len(), "Sweep complete");
    Ok(rows)
}
