//! Incremental sessions: advance a few steps, inspect, adjust, continue.
use crate::compute::clock::{Clock, Observation, Phase};
use crate::config::{Overrides, SimulationConfig};
use crate::error::{Result, SimulationError};
use crate::model::Model;
use crate::output::OutputTable;
use crate::store::NodeId;
use tracing::debug;

/// One simulation session over a shared [`Model`].
///
/// Each stepper owns its state; several may run over the same model at once.
#[derive(Debug, Clone)]
pub struct Stepper {
    model: Model,
    clock: Clock,
    history: Option<(OutputTable, Vec<NodeId>)>,
}

impl Stepper {
    pub fn new(model: Model, config: SimulationConfig) -> Result<Self> {
        let clock = Clock::new(model.clone(), config)?;
        Ok(Self { model, clock, history: None })
    }

    /// Records the given columns (every node if empty) for each step taken from now on.
    pub fn with_history(mut self, columns: &[&str]) -> Result<Self> {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        let (names, ids) = self.model.columns(&columns)?;
        self.history = Some((OutputTable::new(names), ids));
        Ok(self)
    }

    pub fn model(&self) -> &Model { &self.model }

    /// Applies `overrides` and advances `n` steps.
    ///
    /// Fails without advancing if fewer than `n` steps remain. With `n == 0` the
    /// overrides are only staged for the next step.
    pub fn step(&mut self, n: u64, overrides: &Overrides) -> Result<()> {
        let remaining = self.clock.remaining_steps();
        if remaining < n {
            return Err(SimulationError::SimulationComplete { time: self.clock.time() });
        }
        self.clock.stage_overrides(overrides)?;
        if n > 0 && !overrides.is_empty() {
            debug!(time = self.clock.time(), overrides = overrides.len(), "Overrides applied");
        }

        for _ in 0..n {
            let obs = self.clock.advance()?;
            if let Some((table, ids)) = self.history.as_mut() {
                record(table, ids, obs);
            }
        }
        Ok(())
    }

    /// Observes the terminal state at `final_time` once every step has been taken.
    ///
    /// Afterwards `read` returns terminal values and the history gains its last row.
    pub fn settle(&mut self) -> Result<()> {
        let obs = self.clock.settle()?;
        if let Some((table, ids)) = self.history.as_mut() {
            record(table, ids, obs);
        }
        Ok(())
    }

    /// Value of `name` recorded by the most recent step.
    pub fn read(&self, name: &str) -> Result<f64> { self.clock.read(name) }

    /// Time of the next step to be taken.
    pub fn time(&self) -> f64 { self.clock.time() }

    pub fn phase(&self) -> Phase { self.clock.phase() }

    pub fn remaining_steps(&self) -> u64 { self.clock.remaining_steps() }

    pub fn is_finished(&self) -> bool { self.clock.is_finished() }

    /// Observation of the most recent step, for every node.
    pub fn last_observation(&self) -> Option<&Observation> { self.clock.last() }

    /// Rows gathered so far, if history was requested.
    pub fn history(&self) -> Option<&OutputTable> {
        self.history.as_ref().map(|(table, _)| table)
    }
}

fn record(table: &mut OutputTable, ids: &[NodeId], obs: &Observation) {
    table.push(obs.time, ids.iter().map(|&id| obs.value(id)).collect());
}
