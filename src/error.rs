//! Error taxonomy shared by every layer of the kernel.
use thiserror::Error;

/// Every failure the kernel can report.
///
/// All variants describe a caller or configuration defect, so nothing is retried.
/// The enum is `Clone + PartialEq` so sweep drivers can inspect and skip a failed
/// scenario without aborting the batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("Node '{0}' is already registered")]
    DuplicateNode(String),
    #[error("Unknown node '{0}'")]
    UnknownNode(String),
    #[error("Invalid kind for node '{name}': {reason}")]
    InvalidKind { name: String, reason: String },
    #[error("Cyclic dependency with no stateful break point: {}", .nodes.join(" -> "))]
    CyclicDependency { nodes: Vec<String> },
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("Unknown column '{0}'")]
    UnknownColumn(String),
    #[error("'{0}' has not been computed yet")]
    NotYetComputed(String),
    #[error("Simulation already complete at t={time}")]
    SimulationComplete { time: f64 },
    #[error("Malformed run request: {0}")]
    MalformedRequest(String),
}

impl SimulationError {
    pub(crate) fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter { name: name.into(), reason: reason.into() }
    }

    pub(crate) fn invalid_kind(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKind { name: name.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, SimulationError>;
