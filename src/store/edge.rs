//! Defines the `Edge` type, representing a dependency between two nodes.
use serde::{Deserialize, Serialize};

/// Describes when a dependency is read relative to the step being evaluated.
///
/// Only `SameStep` edges constrain the evaluation order inside a step; the other
/// two are broken by a stateful node's stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edge {
    /// An auxiliary reading a value computed in the same step.
    /// Example: `Profit = Revenue - Expenses`.
    SameStep,
    /// A stock or smoother reading a value to compute its flow for the next step.
    /// Example: `Cumulative CO2` integrating `Emissions`.
    Integrated,
    /// A stock or smoother reading a value once, to seed its state at initial time.
    Initial,
}
