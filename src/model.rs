//! A resolved, immutable model and its one-shot run entry points.
use crate::analysis::topology;
use crate::compute::clock::Clock;
use crate::compute::program::{Compiler, Program};
use crate::config::{Overrides, RunRequest, SimulationConfig};
use crate::error::{Result, SimulationError};
use crate::output::OutputTable;
use crate::stepper::Stepper;
use crate::store::{NodeId, Registry};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
struct ModelCore {
    registry: Registry,
    program: Program,
}

/// A registry resolved and linked once, shared read-only by every run.
///
/// Cloning is cheap; clones share the same definitions.
#[derive(Debug, Clone)]
pub struct Model {
    core: Arc<ModelCore>,
}

impl Model {
    /// Resolves dependencies, rejects cycles, and links every formula.
    pub fn build(registry: Registry) -> Result<Self> {
        let resolution = topology::resolve(&registry)?;
        let program = Compiler::new(&registry).compile(resolution)?;
        debug!(
            nodes = registry.count(),
            stateful = program.stateful.len(),
            order = program.order.len(),
            "Model built"
        );
        Ok(Self { core: Arc::new(ModelCore { registry, program }) })
    }

    pub fn registry(&self) -> &Registry { &self.core.registry }

    pub(crate) fn program(&self) -> &Program { &self.core.program }

    /// Node names in the order a step evaluates them.
    pub fn evaluation_order(&self) -> Vec<&str> {
        self.core.program.order.iter().map(|&id| self.core.registry.name(id)).collect()
    }

    /// Every node name in registration order.
    pub fn node_names(&self) -> Vec<&str> {
        self.core.registry.ids().map(|id| self.core.registry.name(id)).collect()
    }

    /// Maps column names to ids; an empty list selects every node.
    pub(crate) fn columns(&self, columns: &[String]) -> Result<(Vec<String>, Vec<NodeId>)> {
        let registry = self.registry();
        if columns.is_empty() {
            let ids: Vec<NodeId> = registry.ids().collect();
            let names = ids.iter().map(|&id| registry.name(id).to_string()).collect();
            return Ok((names, ids));
        }
        let ids = columns
            .iter()
            .map(|c| registry.lookup(c).map_err(|_| SimulationError::UnknownColumn(c.clone())))
            .collect::<Result<Vec<_>>>()?;
        Ok((columns.to_vec(), ids))
    }

    /// Runs the whole time axis of `request` from a fresh state.
    ///
    /// Rows cover `initial_time..=final_time`: one per step plus the terminal state.
    pub fn run(&self, request: &RunRequest) -> Result<OutputTable> {
        let config = request.config();
        let (names, ids) = self.columns(&request.columns)?;
        let mut clock = Clock::new(self.clone(), config)?;
        clock.stage_overrides(&request.overrides)?;

        let mut table = OutputTable::new(names);
        clock.initialize()?;
        while !clock.is_finished() {
            let obs = clock.advance()?;
            table.push(obs.time, ids.iter().map(|&id| obs.value(id)).collect());
        }
        let terminal = clock.settle()?;
        table.push(terminal.time, ids.iter().map(|&id| terminal.value(id)).collect());

        debug!(rows = table.len(), columns = table.columns.len(), "Run complete");
        Ok(table)
    }

    /// [`Model::run`] over the default time axis.
    pub fn run_with(&self, overrides: Overrides, columns: &[&str]) -> Result<OutputTable> {
        self.run(&RunRequest::new(overrides, columns))
    }

    /// A fresh incremental session over this model.
    pub fn stepper(&self, config: SimulationConfig) -> Result<Stepper> {
        Stepper::new(self.clone(), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Formula;

    fn growth() -> Model {
        let mut reg = Registry::new();
        reg.constant("rate", 0.5).unwrap();
        reg.auxiliary("inflow", Formula::identity("rate")).unwrap();
        reg.stock("level", Formula::identity("inflow"), Formula::constant(1.0)).unwrap();
        Model::build(reg).unwrap()
    }

    #[test]
    fn test_run_covers_initial_to_final() {
        let request = RunRequest::new(Overrides::new(), &["level"]).with_config(SimulationConfig::new(0.0, 4.0, 1.0));
        let table = growth().run(&request).unwrap();
        assert_eq!(table.times(), vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(table.column("level").unwrap(), vec![1.0, 1.5, 2.0, 2.5, 3.0]);
    }

    #[test]
    fn test_empty_columns_select_every_node() {
        let request = RunRequest::default().with_config(SimulationConfig::new(0.0, 1.0, 1.0));
        let table = growth().run(&request).unwrap();
        assert_eq!(table.columns, vec!["rate", "inflow", "level"]);
    }

    #[test]
    fn test_unknown_column_fails_before_stepping() {
        let err = growth().run_with(Overrides::new(), &["level", "missing"]).unwrap_err();
        assert_eq!(err, SimulationError::UnknownColumn("missing".into()));
    }

    #[test]
    fn test_zero_length_axis_has_single_row() {
        let request = RunRequest::default().with_config(SimulationConfig::new(2.0, 2.0, 1.0));
        let table = growth().run(&request).unwrap();
        assert_eq!(table.times(), vec![2.0]);
        assert_eq!(table.last("level").unwrap(), 1.0);
    }

    #[test]
    fn test_build_rejects_cycle() {
        let mut reg = Registry::new();
        reg.auxiliary("a", Formula::identity("b")).unwrap();
        reg.auxiliary("b", Formula::identity("a")).unwrap();
        assert!(matches!(Model::build(reg), Err(SimulationError::CyclicDependency { .. })));
    }

    #[test]
    fn test_model_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Model>();
    }
}
