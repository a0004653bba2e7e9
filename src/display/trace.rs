use crate::compute::program::Instruction;
use crate::error::Result;
use crate::model::Model;
use crate::stepper::Stepper;
use crate::store::NodeId;
use std::collections::HashMap;
use std::fmt::Write;

/// Renders the same-step dependency tree of `name` with the values of the last step.
///
/// Stateful nodes are leaves: within a step their value is the stored state, not a
/// function of their inputs. A node reached twice prints a reference to its first level.
pub fn format_trace(stepper: &Stepper, name: &str) -> Result<String> {
    let model = stepper.model();
    let target = model.registry().lookup(name)?;
    let mut tracer = Tracer {
        model,
        values: stepper.last_observation().map(|obs| obs.values.as_slice()),
        visited_at_level: HashMap::new(),
        output: String::new(),
    };

    match stepper.last_observation() {
        Some(obs) => {
            let _ = writeln!(tracer.output, "TRACE for node '{}' at t={}:", name, obs.time);
        }
        None => {
            let _ = writeln!(tracer.output, "TRACE for node '{}' (not yet stepped):", name);
        }
    }
    let _ = writeln!(tracer.output, "--------------------------------------------------");
    tracer.trace_node(target, 1, "");
    Ok(tracer.output)
}

struct Tracer<'a> {
    model: &'a Model,
    values: Option<&'a [f64]>,
    visited_at_level: HashMap<NodeId, usize>,
    output: String,
}

impl<'a> Tracer<'a> {
    fn trace_node(&mut self, node_id: NodeId, level: usize, prefix: &str) {
        if let Some(&first_seen) = self.visited_at_level.get(&node_id) {
            let _ = writeln!(self.output, "{}-> (Ref to L{})", prefix, first_seen);
            return;
        }
        self.visited_at_level.insert(node_id, level);

        let model = self.model;
        let registry = model.registry();
        let line_header = format!("[L{}] {}{}", level, registry.name(node_id), self.format_value(node_id));
        let unit = match &registry.meta[node_id.index()].unit {
            Some(unit) => format!(" ({})", unit.0),
            None => String::new(),
        };

        match &model.program().nodes[node_id.index()] {
            Instruction::Constant { overridable: false, .. } => {
                let _ = writeln!(self.output, "{}{}{} [constant, locked]", prefix, line_header, unit);
            }
            Instruction::Constant { .. } => {
                let _ = writeln!(self.output, "{}{}{} [constant]", prefix, line_header, unit);
            }
            Instruction::Stock { rate, .. } => {
                let inputs = self.format_parents(&rate.parents);
                let _ = writeln!(self.output, "{}{}{} [stock] integrates f({})", prefix, line_header, unit, inputs);
            }
            Instruction::Smoother { target, tau, .. } => {
                let target = self.format_parents(&target.parents);
                let tau = self.format_parents(&tau.parents);
                let _ = writeln!(
                    self.output,
                    "{}{}{} [smoother] toward f({}) with tau f({})",
                    prefix, line_header, unit, target, tau
                );
            }
            Instruction::Auxiliary(linked) => {
                let inputs = self.format_parents(&linked.parents);
                let _ = writeln!(self.output, "{}{}{} = f({})", prefix, line_header, unit, inputs);
                self.recurse_children(prefix, &linked.parents, level);
            }
        }
    }

    fn recurse_children(&mut self, prefix: &str, children: &[NodeId], level: usize) {
        let stem = build_child_stem(prefix);
        for (i, &child) in children.iter().enumerate() {
            let connector = if i == children.len() - 1 { "`--" } else { "|--" };
            self.trace_node(child, level + 1, &format!("{}{}", stem, connector));
        }
    }

    fn format_parents(&self, parents: &[NodeId]) -> String {
        parents
            .iter()
            .map(|&id| self.model.registry().name(id))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn format_value(&self, id: NodeId) -> String {
        match self.values.and_then(|v| v.get(id.index())) {
            Some(v) => format!("[{:.3}]", v),
            None => "[?]".to_string(),
        }
    }
}

fn build_child_stem(current_prefix: &str) -> String {
    current_prefix.replace("`--", "   ").replace("|--", "|  ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Overrides, SimulationConfig};
    use crate::store::{Formula, Registry};

    fn model() -> Model {
        let mut reg = Registry::new();
        reg.constant("price", 2.0).unwrap();
        reg.locked_constant("volume", 3.0).unwrap();
        reg.auxiliary("revenue", Formula::new(&["price", "volume"], |x| x[0] * x[1])).unwrap();
        reg.auxiliary("margin", Formula::new(&["revenue", "price"], |x| x[0] - x[1])).unwrap();
        reg.stock("cash", Formula::identity("margin"), Formula::constant(0.0)).unwrap();
        reg.auxiliary("report", Formula::new(&["margin", "cash"], |x| x[0] + x[1])).unwrap();
        Model::build(reg).unwrap()
    }

    #[test]
    fn test_trace_tree_shape() {
        let model = model();
        let mut stepper = model.stepper(SimulationConfig::new(0.0, 3.0, 1.0)).unwrap();
        stepper.step(2, &Overrides::new()).unwrap();

        let out = format_trace(&stepper, "report").unwrap();
        let expected = "\
TRACE for node 'report' at t=1:
--------------------------------------------------
[L1] report[8.000] = f(margin, cash)
|--[L2] margin[4.000] = f(revenue, price)
|  |--[L3] revenue[6.000] = f(price, volume)
|  |  |--[L4] price[2.000] [constant]
|  |  `--[L4] volume[3.000] [constant, locked]
|  `---> (Ref to L4)
`--[L2] cash[4.000] [stock] integrates f(margin)
";
        assert_eq!(out, expected);
    }

    #[test]
    fn test_trace_reads_the_stepper_model() {
        // Same names, different registration order and values.
        let mut reg = Registry::new();
        reg.auxiliary("total", Formula::new(&["unit_price", "count"], |x| x[0] * x[1])).unwrap();
        reg.constant("count", 5.0).unwrap();
        reg.constant("unit_price", 7.0).unwrap();
        let other = Model::build(reg).unwrap();
        let mut stepper = other.stepper(SimulationConfig::new(0.0, 2.0, 1.0)).unwrap();
        stepper.step(1, &Overrides::new()).unwrap();

        let out = format_trace(&stepper, "total").unwrap();
        assert!(out.contains("[L1] total[35.000] = f(unit_price, count)"));
        assert!(out.contains("[L2] unit_price[7.000] [constant]"));
        assert!(format_trace(&stepper, "report").is_err());
    }

    #[test]
    fn test_trace_before_stepping() {
        let model = model();
        let stepper = model.stepper(SimulationConfig::default()).unwrap();
        let out = format_trace(&stepper, "price").unwrap();
        assert!(out.contains("not yet stepped"));
        assert!(out.contains("[L1] price[?] [constant]"));
        assert!(format_trace(&stepper, "nope").is_err());
    }
}
