//! The simulation clock: owns all mutable state of one run.
use crate::compute::engine::Engine;
use crate::compute::ledger::StepCache;
use crate::compute::program::Instruction;
use crate::compute::stateful::{Primitive, Smoother, Stateful, Stock};
use crate::config::{Overrides, SimulationConfig};
use crate::error::{Result, SimulationError};
use crate::model::Model;
use crate::store::NodeId;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::{debug, trace};

/// Lifecycle of a clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// No state yet; initial values are computed on the first advance.
    Uninitialized,
    /// Initial state computed, no step taken.
    Ready,
    Stepping,
    /// `current_time >= final_time`; further advances fail.
    Finished,
}

/// Values of every node as observed during one step, indexed by `NodeId`.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub time: f64,
    pub values: Vec<f64>,
}

impl Observation {
    #[inline(always)]
    pub fn value(&self, id: NodeId) -> f64 { self.values[id.index()] }
}

/// Simulation state for one session. Exclusively owned; never shared across threads
/// while stepping. Independent clocks over the same [`Model`] do not interact.
#[derive(Debug, Clone)]
pub struct Clock {
    model: Model,
    config: SimulationConfig,
    phase: Phase,
    step_index: u64,
    total_steps: u64,
    /// Current constant values, indexed by `NodeId` (unused slots are 0).
    constants: Vec<f64>,
    /// Validated overrides waiting for the next advance.
    pending: Vec<(NodeId, f64)>,
    states: Vec<Option<Primitive>>,
    cache: StepCache,
    last: Option<Observation>,
}

impl Clock {
    pub fn new(model: Model, config: SimulationConfig) -> Result<Self> {
        let total_steps = config.step_count()?;
        let count = model.program().len();
        let constants = model
            .program()
            .nodes
            .iter()
            .map(|node| match node {
                Instruction::Constant { value, .. } => *value,
                _ => 0.0,
            })
            .collect();

        Ok(Self {
            model,
            config,
            phase: Phase::Uninitialized,
            step_index: 0,
            total_steps,
            constants,
            pending: Vec::new(),
            states: vec![None; count],
            cache: StepCache::new(count),
            last: None,
        })
    }

    pub fn phase(&self) -> Phase { self.phase }

    pub fn config(&self) -> &SimulationConfig { &self.config }

    pub fn is_finished(&self) -> bool { self.phase == Phase::Finished }

    /// Time of the next step to be taken (or `final_time` once finished).
    pub fn time(&self) -> f64 { self.config.time_at(self.step_index) }

    pub fn remaining_steps(&self) -> u64 { self.total_steps - self.step_index }

    /// Observation recorded by the most recent advance (or settle).
    pub fn last(&self) -> Option<&Observation> { self.last.as_ref() }

    /// Validates `overrides` and queues them for the next advance.
    ///
    /// Nothing is queued unless every entry is valid.
    pub fn stage_overrides(&mut self, overrides: &Overrides) -> Result<()> {
        let registry = self.model.registry();
        let mut staged = Vec::with_capacity(overrides.len());
        for (name, &value) in overrides {
            let id = registry.lookup(name)?;
            match &self.model.program().nodes[id.index()] {
                Instruction::Constant { overridable: true, .. } => {}
                Instruction::Constant { overridable: false, .. } => {
                    return Err(SimulationError::invalid_parameter(name.as_str(), "constant is locked"));
                }
                _ => {
                    return Err(SimulationError::invalid_parameter(
                        name.as_str(),
                        format!("only constants can be overridden, not a {}", registry.kind(id)),
                    ));
                }
            }
            if !value.is_finite() {
                return Err(SimulationError::invalid_parameter(
                    name.as_str(),
                    format!("override must be finite, got {value}"),
                ));
            }
            staged.push((id, value));
        }
        self.pending.extend(staged);
        Ok(())
    }

    /// Computes the initial value of every stateful node at `initial_time`.
    ///
    /// Pending overrides are applied first so they shape the initial state.
    pub fn initialize(&mut self) -> Result<()> {
        if self.phase != Phase::Uninitialized {
            return Ok(());
        }
        self.apply_pending();
        self.cache.clear();

        let model = self.model.clone();
        let (registry, program) = (model.registry(), model.program());
        let time = self.time();
        for &id in &program.init_order {
            let value = Engine::new(registry, program, &self.constants, &self.states, &mut self.cache, time)
                .initial(id)?;
            self.states[id.index()] = Some(match program.nodes[id.index()] {
                Instruction::Smoother { .. } => Primitive::Smoother(Smoother::new(value)),
                _ => Primitive::Stock(Stock::new(value)),
            });
        }
        self.cache.clear();

        self.phase = if self.total_steps == 0 { Phase::Finished } else { Phase::Ready };
        debug!(stateful = program.init_order.len(), steps = self.total_steps, "Clock initialized");
        Ok(())
    }

    /// Takes one step: observe every node at the current time, then integrate.
    ///
    /// On error no state is integrated and time does not move, so the step can be
    /// retried after fixing the cause (e.g. a bad override).
    pub fn advance(&mut self) -> Result<&Observation> {
        self.initialize()?;
        if self.phase == Phase::Finished {
            return Err(SimulationError::SimulationComplete { time: self.time() });
        }
        self.apply_pending();

        let time = self.time();
        let flows = self.observe(time, true)?;

        let values = self.cache.snapshot();
        let stateful = &self.model.program().stateful;
        for (&id, &flow) in stateful.iter().zip(flows.iter()) {
            if let Some(primitive) = self.states[id.index()].as_mut() {
                primitive.stage(flow);
                primitive.advance(self.config.step_size);
            }
        }

        self.step_index += 1;
        self.phase = if self.step_index >= self.total_steps { Phase::Finished } else { Phase::Stepping };
        trace!(time, step = self.step_index, "Step complete");

        Ok(&*self.last.insert(Observation { time, values }))
    }

    /// Observes the terminal state at `final_time` without integrating.
    ///
    /// Only valid once finished; used to close an output table at `final_time`.
    pub fn settle(&mut self) -> Result<&Observation> {
        self.initialize()?;
        if self.phase != Phase::Finished {
            return Err(SimulationError::NotYetComputed(format!(
                "terminal state ({} steps remaining)",
                self.remaining_steps()
            )));
        }
        self.apply_pending();

        let time = self.time();
        self.observe(time, false)?;
        let values = self.cache.snapshot();
        Ok(&*self.last.insert(Observation { time, values }))
    }

    /// Value recorded for `name` by the latest advance.
    pub fn read(&self, name: &str) -> Result<f64> {
        let id = self.model.registry().lookup(name)?;
        self.last
            .as_ref()
            .map(|obs| obs.value(id))
            .ok_or_else(|| SimulationError::NotYetComputed(name.to_string()))
    }

    /// Fills the cache for `time` in resolver order and, if requested, evaluates
    /// every stateful node's flow from those frozen values.
    fn observe(&mut self, time: f64, with_flows: bool) -> Result<SmallVec<[f64; 16]>> {
        self.cache.clear();
        let model = self.model.clone();
        let (registry, program) = (model.registry(), model.program());
        let mut engine = Engine::new(registry, program, &self.constants, &self.states, &mut self.cache, time);

        for &id in &program.order {
            engine.get(id)?;
        }
        let mut flows = SmallVec::new();
        if with_flows {
            for &id in &program.stateful {
                flows.push(engine.flow(id)?);
            }
        }
        Ok(flows)
    }

    fn apply_pending(&mut self) {
        for (id, value) in self.pending.drain(..) {
            self.constants[id.index()] = value;
        }
    }
}
