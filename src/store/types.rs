use crate::error::{Result, SimulationError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline(always)]
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

/// The four node categories the kernel knows how to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Overridable input with no dependencies.
    Constant,
    /// Stateless formula over current-step values.
    Auxiliary,
    /// Euler-integrated accumulator.
    Stock,
    /// First-order exponential lag toward a target.
    Smoother,
}

impl NodeKind {
    /// Stateful nodes publish last step's state and so break same-step cycles.
    #[inline(always)]
    pub fn is_stateful(&self) -> bool {
        matches!(self, NodeKind::Stock | NodeKind::Smoother)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::Constant => "constant",
            NodeKind::Auxiliary => "auxiliary",
            NodeKind::Stock => "stock",
            NodeKind::Smoother => "smoother",
        };
        f.write_str(s)
    }
}

impl FromStr for NodeKind {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "constant" => Ok(NodeKind::Constant),
            "auxiliary" | "aux" => Ok(NodeKind::Auxiliary),
            "stock" | "integ" => Ok(NodeKind::Stock),
            "smoother" | "smooth" => Ok(NodeKind::Smoother),
            other => Err(SimulationError::invalid_kind(other, "unsupported node kind")),
        }
    }
}

/// Informational unit label. Never checked at run time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit(pub String);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub name: String,
    pub unit: Option<Unit>,
}

/// Read-only view of a formula's dependency values for the current step.
pub struct Inputs<'a> {
    names: &'a [String],
    values: &'a [f64],
    time: f64,
}

impl<'a> Inputs<'a> {
    pub(crate) fn new(names: &'a [String], values: &'a [f64], time: f64) -> Self {
        Self { names, values, time }
    }

    /// Simulation time of the step being evaluated.
    pub fn time(&self) -> f64 { self.time }

    pub fn len(&self) -> usize { self.values.len() }

    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Looks a dependency up by its declared name.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names.iter().position(|n| n == name).map(|i| self.values[i])
    }

    pub fn as_slice(&self) -> &[f64] { self.values }
}

impl Index<usize> for Inputs<'_> {
    type Output = f64;

    fn index(&self, idx: usize) -> &f64 { &self.values[idx] }
}

pub type EvalFn = Arc<dyn Fn(&Inputs<'_>) -> f64 + Send + Sync>;

/// A pure callable plus the names it reads, in the order it reads them.
#[derive(Clone)]
pub struct Formula {
    dependencies: Vec<String>,
    eval: EvalFn,
}

impl Formula {
    pub fn new<F>(dependencies: &[&str], eval: F) -> Self
    where
        F: Fn(&Inputs<'_>) -> f64 + Send + Sync + 'static,
    {
        Self {
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            eval: Arc::new(eval),
        }
    }

    /// A formula with no dependencies returning `value`.
    pub fn constant(value: f64) -> Self {
        Self::new(&[], move |_| value)
    }

    /// Passes a single dependency through unchanged.
    pub fn identity(dependency: &str) -> Self {
        Self::new(&[dependency], |x| x[0])
    }

    pub fn dependencies(&self) -> &[String] { &self.dependencies }

    #[inline(always)]
    pub(crate) fn call(&self, values: &[f64], time: f64) -> f64 {
        (self.eval)(&Inputs::new(&self.dependencies, values, time))
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Formula").field("dependencies", &self.dependencies).finish_non_exhaustive()
    }
}

/// How a node produces its value.
#[derive(Debug, Clone)]
pub enum Definition {
    Constant { value: f64, overridable: bool },
    Auxiliary { formula: Formula },
    Stock { rate: Formula, initial: Formula },
    Smoother { target: Formula, tau: Formula, initial: Formula },
}

impl Definition {
    pub fn kind(&self) -> NodeKind {
        match self {
            Definition::Constant { .. } => NodeKind::Constant,
            Definition::Auxiliary { .. } => NodeKind::Auxiliary,
            Definition::Stock { .. } => NodeKind::Stock,
            Definition::Smoother { .. } => NodeKind::Smoother,
        }
    }

    /// Builds a definition from loose parts, rejecting combinations that do not fit `kind`.
    ///
    /// For a constant, `step` is evaluated once (it must not declare dependencies).
    pub fn assemble(
        name: &str,
        kind: NodeKind,
        step: Formula,
        initial: Option<Formula>,
        tau: Option<Formula>,
    ) -> Result<Self> {
        match (kind, initial, tau) {
            (NodeKind::Constant, None, None) => {
                if !step.dependencies().is_empty() {
                    return Err(SimulationError::invalid_kind(name, "a constant cannot declare dependencies"));
                }
                Ok(Definition::Constant { value: step.call(&[], 0.0), overridable: true })
            }
            (NodeKind::Auxiliary, None, None) => Ok(Definition::Auxiliary { formula: step }),
            (NodeKind::Stock, Some(initial), None) => Ok(Definition::Stock { rate: step, initial }),
            (NodeKind::Smoother, Some(initial), Some(tau)) => {
                Ok(Definition::Smoother { target: step, tau, initial })
            }
            (NodeKind::Stock | NodeKind::Smoother, None, _) => {
                Err(SimulationError::invalid_kind(name, format!("a {} needs an initial value formula", kind)))
            }
            (NodeKind::Smoother, Some(_), None) => {
                Err(SimulationError::invalid_kind(name, "a smoother needs a time constant formula"))
            }
            (kind, _, _) => Err(SimulationError::invalid_kind(
                name,
                format!("a {} takes neither an initial value nor a time constant", kind),
            )),
        }
    }

    /// Every formula of this node, in a fixed order: step formulas first, then initial.
    pub(crate) fn formulas(&self) -> Vec<(FormulaRole, &Formula)> {
        match self {
            Definition::Constant { .. } => Vec::new(),
            Definition::Auxiliary { formula } => vec![(FormulaRole::Step, formula)],
            Definition::Stock { rate, initial } => {
                vec![(FormulaRole::Step, rate), (FormulaRole::Initial, initial)]
            }
            Definition::Smoother { target, tau, initial } => vec![
                (FormulaRole::Step, target),
                (FormulaRole::Step, tau),
                (FormulaRole::Initial, initial),
            ],
        }
    }
}

/// Which phase of the clock a formula is evaluated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FormulaRole {
    Step,
    Initial,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("constant", NodeKind::Constant)]
    #[case("Auxiliary", NodeKind::Auxiliary)]
    #[case("aux", NodeKind::Auxiliary)]
    #[case("INTEG", NodeKind::Stock)]
    #[case("stock", NodeKind::Stock)]
    #[case(" smooth ", NodeKind::Smoother)]
    fn test_kind_parsing(#[case] input: &str, #[case] expected: NodeKind) {
        assert_eq!(input.parse::<NodeKind>().unwrap(), expected);
    }

    #[test]
    fn test_unsupported_kind_is_rejected() {
        let err = "delay3".parse::<NodeKind>().unwrap_err();
        assert!(matches!(err, SimulationError::InvalidKind { .. }));
    }

    #[test]
    fn test_inputs_positional_and_named() {
        let names = vec!["a".to_string(), "b".to_string()];
        let values = [2.0, 5.0];
        let inputs = Inputs::new(&names, &values, 3.0);
        assert_eq!(inputs[1], 5.0);
        assert_eq!(inputs.get("a"), Some(2.0));
        assert_eq!(inputs.get("c"), None);
        assert_eq!(inputs.time(), 3.0);
    }

    #[test]
    fn test_assemble_constant_evaluates_once() {
        let def = Definition::assemble("k", NodeKind::Constant, Formula::constant(4.5), None, None).unwrap();
        assert!(matches!(def, Definition::Constant { value, overridable: true } if value == 4.5));
    }

    #[rstest]
    #[case(NodeKind::Constant, Formula::identity("x"), None, None)]
    #[case(NodeKind::Stock, Formula::constant(1.0), None, None)]
    #[case(NodeKind::Smoother, Formula::constant(1.0), Some(Formula::constant(0.0)), None)]
    #[case(NodeKind::Auxiliary, Formula::constant(1.0), Some(Formula::constant(0.0)), None)]
    #[case(NodeKind::Stock, Formula::constant(1.0), Some(Formula::constant(0.0)), Some(Formula::constant(2.0)))]
    fn test_assemble_rejects_mismatched_parts(
        #[case] kind: NodeKind,
        #[case] step: Formula,
        #[case] initial: Option<Formula>,
        #[case] tau: Option<Formula>,
    ) {
        let err = Definition::assemble("n", kind, step, initial, tau).unwrap_err();
        assert!(matches!(err, SimulationError::InvalidKind { ref name, .. } if name == "n"), "{err}");
    }
}
