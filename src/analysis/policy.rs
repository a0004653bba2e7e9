//! Closed-loop lever rules and their comparison against a fixed setting.
//!
//! An adaptive rule looks at the model after every step and picks the lever value
//! for the next one. The comparison then reruns the model with the lever held at
//! the time average of that trajectory.
use crate::config::{Overrides, RunRequest, SimulationConfig};
use crate::error::{Result, SimulationError};
use crate::model::Model;
use crate::models::freight;
use crate::output::OutputTable;
use crate::store::Definition;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Steps between annual reviews on the monthly axis.
pub const STEPS_PER_YEAR: u64 = 12;

/// What a rule may observe after a step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyState {
    /// Index of the step just taken (0 for the first).
    pub step: u64,
    pub time: f64,
    pub emissions: f64,
    pub profit: f64,
    pub margin: f64,
}

/// Chooses the next lever value from the current one and the observed state.
pub trait PolicyRule {
    fn next_level(&self, current: f64, state: &PolicyState) -> f64;
}

/// Raise the lever by `annual_step` per year (spread monthly), capped at `max_level`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepIncrease {
    pub annual_step: f64,
    pub max_level: f64,
}

impl PolicyRule for StepIncrease {
    fn next_level(&self, current: f64, _state: &PolicyState) -> f64 {
        (current + self.annual_step / STEPS_PER_YEAR as f64).min(self.max_level)
    }
}

/// Compound growth at `annual_rate` per year, applied monthly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentageGrowth {
    pub annual_rate: f64,
}

impl PolicyRule for PercentageGrowth {
    fn next_level(&self, current: f64, _state: &PolicyState) -> f64 {
        current * (1.0 + self.annual_rate).powf(1.0 / STEPS_PER_YEAR as f64)
    }
}

/// Annual adjustment that keeps the observed value inside `target ± band`:
/// raise the lever when above the band, lower it (not below 0) when under.
fn band_adjust(current: f64, state: &PolicyState, observed: f64, target: f64, band: f64, up: f64, down: f64) -> f64 {
    if state.step == 0 || state.step % STEPS_PER_YEAR != 0 {
        return current;
    }
    if observed > target + band {
        current + up
    } else if observed < target - band {
        (current - down).max(0.0)
    } else {
        current
    }
}

/// Taxes profitable carriers harder: reacts to the rolling margin once a year.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarginBand {
    pub target_margin: f64,
    pub band: f64,
    pub increase: f64,
    pub decrease: f64,
}

impl PolicyRule for MarginBand {
    fn next_level(&self, current: f64, state: &PolicyState) -> f64 {
        band_adjust(current, state, state.margin, self.target_margin, self.band, self.increase, self.decrease)
    }
}

/// Steers cumulative emissions toward a target path, reviewed once a year.
pub struct EmissionPath<F: Fn(u64) -> f64> {
    /// Target cumulative emissions at a step index.
    pub target: F,
    pub band: f64,
    pub increase: f64,
    pub decrease: f64,
}

impl<F: Fn(u64) -> f64> PolicyRule for EmissionPath<F> {
    fn next_level(&self, current: f64, state: &PolicyState) -> f64 {
        let target = (self.target)(state.step);
        band_adjust(current, state, state.emissions, target, self.band, self.increase, self.decrease)
    }
}

/// Column names and axis of a policy comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyPlan {
    pub lever: String,
    pub emissions: String,
    pub profit: String,
    pub margin: String,
    pub flag: String,
    /// Starting lever value; `None` takes it from the base overrides or the model.
    pub initial_level: Option<f64>,
    pub config: SimulationConfig,
}

impl Default for PolicyPlan {
    fn default() -> Self {
        Self {
            lever: freight::CARBON_TAX_RATE.to_string(),
            emissions: freight::CUMULATIVE_CO2.to_string(),
            profit: freight::CUMULATIVE_PROFIT.to_string(),
            margin: freight::ROLLING_MARGIN.to_string(),
            flag: freight::VIABILITY_FLAG.to_string(),
            initial_level: None,
            config: SimulationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub emissions: f64,
    pub profit: f64,
    pub viable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyComparison {
    /// Lever value applied at each step of the adaptive run.
    pub trajectory: Vec<f64>,
    pub time_averaged_level: f64,
    pub adaptive: Outcome,
    pub fixed: Outcome,
    /// Adaptive minus fixed; negative means the adaptive rule emitted less.
    pub emissions_diff: f64,
    /// Adaptive minus fixed; positive means the adaptive rule earned more.
    pub profit_diff: f64,
    pub emissions_diff_pct: f64,
    pub profit_diff_pct: f64,
    /// Lower emissions and higher profit than the fixed setting.
    pub pareto_better: bool,
    /// Higher emissions and lower profit than the fixed setting.
    pub pareto_worse: bool,
    pub adaptive_table: OutputTable,
    pub fixed_table: OutputTable,
}

fn outcome(table: &OutputTable, plan: &PolicyPlan) -> Result<Outcome> {
    Ok(Outcome {
        emissions: table.last(&plan.emissions)?,
        profit: table.last(&plan.profit)?,
        viable: table.last(&plan.flag)? == 1.0,
    })
}

fn pct(diff: f64, reference: f64) -> f64 {
    if reference != 0.0 { 100.0 * diff / reference } else { 0.0 }
}

/// Drives `rule` through a stepper, then runs the lever fixed at its time average.
pub fn compare_adaptive_vs_static(
    model: &Model,
    base: &Overrides,
    rule: &dyn PolicyRule,
    plan: &PolicyPlan,
) -> Result<PolicyComparison> {
    let columns = [plan.emissions.as_str(), plan.profit.as_str(), plan.flag.as_str()];
    let mut stepper = model.stepper(plan.config)?.with_history(&columns)?;

    let mut level = match plan.initial_level.or_else(|| base.get(&plan.lever).copied()) {
        Some(level) => level,
        None => initial_constant(model, &plan.lever)?,
    };
    let mut staged = base.clone();
    staged.insert(plan.lever.clone(), level);
    stepper.step(0, &staged)?;

    let mut trajectory = Vec::new();
    while stepper.remaining_steps() > 0 {
        trajectory.push(level);
        stepper.step(1, &Overrides::from([(plan.lever.clone(), level)]))?;

        let step = trajectory.len() as u64 - 1;
        let state = PolicyState {
            step,
            time: plan.config.time_at(step),
            emissions: stepper.read(&plan.emissions)?,
            profit: stepper.read(&plan.profit)?,
            margin: stepper.read(&plan.margin)?,
        };
        level = rule.next_level(level, &state);
    }
    stepper.settle()?;
    let adaptive_table = stepper.history().cloned().unwrap_or_default();

    let time_averaged_level = if trajectory.is_empty() {
        level
    } else {
        trajectory.iter().sum::<f64>() / trajectory.len() as f64
    };
    let mut fixed_overrides = base.clone();
    fixed_overrides.insert(plan.lever.clone(), time_averaged_level);
    let fixed_table = model.run(
        &RunRequest { overrides: fixed_overrides, columns: columns.map(String::from).to_vec(), ..Default::default() }
            .with_config(plan.config),
    )?;

    let adaptive = outcome(&adaptive_table, plan)?;
    let fixed = outcome(&fixed_table, plan)?;
    let emissions_diff = adaptive.emissions - fixed.emissions;
    let profit_diff = adaptive.profit - fixed.profit;
    debug!(time_averaged_level, emissions_diff, profit_diff, "Policy comparison complete");

    Ok(PolicyComparison {
        trajectory,
        time_averaged_level,
        adaptive,
        fixed,
        emissions_diff,
        profit_diff,
        emissions_diff_pct: pct(emissions_diff, fixed.emissions),
        profit_diff_pct: pct(profit_diff, fixed.profit),
        pareto_better: adaptive.emissions < fixed.emissions && adaptive.profit > fixed.profit,
        pareto_worse: adaptive.emissions > fixed.emissions && adaptive.profit < fixed.profit,
        adaptive_table,
        fixed_table,
    })
}

/// Registered value of a constant lever.
fn initial_constant(model: &Model, lever: &str) -> Result<f64> {
    let registry = model.registry();
    match &registry.definitions[registry.lookup(lever)?.index()] {
        Definition::Constant { value, .. } => Ok(*value),
        other => Err(SimulationError::invalid_parameter(
            lever,
            format!("lever must be a constant, not a {}", other.kind()),
        )),
    }
}
