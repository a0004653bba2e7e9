// Crate root: a discrete-time simulation kernel for stock-and-flow models.
// Nodes are declared in a `Registry`, resolved once into a `Model`, and run either
// in one shot (`Model::run`) or incrementally through a `Stepper`.

pub mod analysis;
pub mod compute;
pub mod config;
pub mod display;
pub mod error;
pub mod model;
pub mod models;
pub mod output;
pub mod stepper;
pub mod store;

pub use compute::{Observation, Phase};
pub use config::{Overrides, RunRequest, SimulationConfig};
pub use error::{Result, SimulationError};
pub use model::Model;
pub use output::{OutputTable, Record};
pub use stepper::Stepper;
pub use store::{Definition, Formula, Inputs, NodeId, NodeKind, Registry};
