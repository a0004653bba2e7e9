//! A synchronous, single-threaded evaluator for one pass over the model.
use crate::compute::ledger::StepCache;
use crate::compute::program::{Instruction, Linked, Program};
use crate::compute::stateful::{Primitive, Stateful};
use crate::error::{Result, SimulationError};
use crate::store::{NodeId, Registry};
use smallvec::SmallVec;
use tracing::warn;

/// Evaluates nodes on demand against one step's cache.
///
/// Values are pulled by memoized depth-first recursion, so correctness does not
/// depend on the order in which callers request nodes. A stateful node answers
/// with its stored state and never recurses into its own flow formula here.
pub struct Engine<'a> {
    registry: &'a Registry,
    program: &'a Program,
    constants: &'a [f64],
    states: &'a [Option<Primitive>],
    cache: &'a mut StepCache,
    time: f64,
}

impl<'a> Engine<'a> {
    pub fn new(
        registry: &'a Registry,
        program: &'a Program,
        constants: &'a [f64],
        states: &'a [Option<Primitive>],
        cache: &'a mut StepCache,
        time: f64,
    ) -> Self {
        Self { registry, program, constants, states, cache, time }
    }

    /// Value of `node_id` for the current step, computing it at most once.
    pub fn get(&mut self, node_id: NodeId) -> Result<f64> {
        if let Some(v) = self.cache.get(node_id) {
            return Ok(v);
        }
        if self.cache.is_pending(node_id) {
            // Only reachable if the resolver was bypassed.
            return Err(SimulationError::CyclicDependency { nodes: vec![self.name(node_id)] });
        }

        let program = self.program;
        let value = match &program.nodes[node_id.index()] {
            Instruction::Constant { .. } => self.constants[node_id.index()],
            Instruction::Auxiliary(formula) => {
                self.cache.mark_pending(node_id);
                match self.call(formula) {
                    Ok(v) => v,
                    Err(e) => {
                        self.cache.release(node_id);
                        return Err(e);
                    }
                }
            }
            Instruction::Stock { .. } | Instruction::Smoother { .. } => self.state(node_id)?.value(),
        };

        if !value.is_finite() {
            warn!(node = %self.name(node_id), time = self.time, value, "Non-finite node value");
        }
        self.cache.insert(node_id, value);
        Ok(value)
    }

    /// Net flow of a stateful node for this step, from current-step values only.
    pub fn flow(&mut self, node_id: NodeId) -> Result<f64> {
        let program = self.program;
        match &program.nodes[node_id.index()] {
            Instruction::Stock { rate, .. } => self.call(rate),
            Instruction::Smoother { target, tau, .. } => {
                let target = self.call(target)?;
                let tau = self.call(tau)?;
                match self.state(node_id)? {
                    Primitive::Smoother(s) => s.rate(target, tau).ok_or_else(|| {
                        SimulationError::invalid_parameter(
                            self.name(node_id),
                            format!("time constant must be positive, got {tau}"),
                        )
                    }),
                    Primitive::Stock(_) => Err(self.kind_mismatch(node_id)),
                }
            }
            _ => Err(self.kind_mismatch(node_id)),
        }
    }

    /// Initial state of a stateful node.
    pub fn initial(&mut self, node_id: NodeId) -> Result<f64> {
        let program = self.program;
        match &program.nodes[node_id.index()] {
            Instruction::Stock { initial, .. } | Instruction::Smoother { initial, .. } => self.call(initial),
            _ => Err(self.kind_mismatch(node_id)),
        }
    }

    fn call(&mut self, linked: &Linked) -> Result<f64> {
        let mut args: SmallVec<[f64; 8]> = SmallVec::with_capacity(linked.parents.len());
        for &parent in &linked.parents {
            args.push(self.get(parent)?);
        }
        Ok(linked.formula.call(&args, self.time))
    }

    fn state(&self, node_id: NodeId) -> Result<Primitive> {
        self.states
            .get(node_id.index())
            .copied()
            .flatten()
            .ok_or_else(|| SimulationError::NotYetComputed(self.name(node_id)))
    }

    fn kind_mismatch(&self, node_id: NodeId) -> SimulationError {
        SimulationError::invalid_kind(
            self.name(node_id),
            format!("{} has no flow or initial value", self.registry.kind(node_id)),
        )
    }

    fn name(&self, node_id: NodeId) -> String {
        self.registry.name(node_id).to_string()
    }
}
