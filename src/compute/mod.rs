//! Step evaluation: linked program, per-step cache, stateful primitives and the clock.
pub mod clock;
pub mod engine;
pub mod ledger;
pub mod program;
pub mod stateful;

pub use clock::{Clock, Observation, Phase};
pub use ledger::StepCache;
pub use program::{Compiler, Program};
pub use stateful::{Primitive, Smoother, Stateful, Stock};
