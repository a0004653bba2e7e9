//! Node definitions and the registry that holds them.
pub mod edge;
pub mod registry;
pub mod types;

pub use edge::Edge;
pub use registry::Registry;
pub(crate) use types::FormulaRole;
pub use types::{Definition, EvalFn, Formula, Inputs, NodeId, NodeKind, NodeMetadata, Unit};
