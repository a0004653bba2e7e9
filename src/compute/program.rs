use crate::analysis::topology::Resolution;
use crate::error::Result;
use crate::store::{Definition, Formula, NodeId, Registry};
use smallvec::SmallVec;

/// A formula whose dependency names have been replaced by node ids.
#[derive(Debug, Clone)]
pub struct Linked {
    pub parents: SmallVec<[NodeId; 4]>,
    pub formula: Formula,
}

/// Executable form of one node.
#[derive(Debug, Clone)]
pub enum Instruction {
    Constant { value: f64, overridable: bool },
    Auxiliary(Linked),
    Stock { rate: Linked, initial: Linked },
    Smoother { target: Linked, tau: Linked, initial: Linked },
}

/// The linked node table plus the orders the clock walks.
///
/// `nodes[i]` is the instruction for `NodeId(i)`.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub nodes: Vec<Instruction>,
    pub order: Vec<NodeId>,
    pub init_order: Vec<NodeId>,
    pub stateful: Vec<NodeId>,
}

pub struct Compiler<'a> {
    registry: &'a Registry,
}

impl<'a> Compiler<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    pub fn compile(&self, resolution: Resolution) -> Result<Program> {
        let mut nodes = Vec::with_capacity(self.registry.count());
        for def in &self.registry.definitions {
            let instruction = match def {
                Definition::Constant { value, overridable } => {
                    Instruction::Constant { value: *value, overridable: *overridable }
                }
                Definition::Auxiliary { formula } => Instruction::Auxiliary(self.link(formula)?),
                Definition::Stock { rate, initial } => Instruction::Stock {
                    rate: self.link(rate)?,
                    initial: self.link(initial)?,
                },
                Definition::Smoother { target, tau, initial } => Instruction::Smoother {
                    target: self.link(target)?,
                    tau: self.link(tau)?,
                    initial: self.link(initial)?,
                },
            };
            nodes.push(instruction);
        }

        let stateful = resolution
            .order
            .iter()
            .copied()
            .filter(|&id| self.registry.kind(id).is_stateful())
            .collect();

        Ok(Program { nodes, order: resolution.order, init_order: resolution.init_order, stateful })
    }

    fn link(&self, formula: &Formula) -> Result<Linked> {
        let parents = formula
            .dependencies()
            .iter()
            .map(|name| self.registry.lookup(name))
            .collect::<Result<SmallVec<[NodeId; 4]>>>()?;
        Ok(Linked { parents, formula: formula.clone() })
    }
}

impl Program {
    pub fn len(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }
}
