//! Adapters for the outbound ports.

pub mod clock;
pub mod memory;
pub mod traced;

pub use clock::{FixedTimeSource, SystemTimeSource};
pub use memory::{InMemoryDatabase, InMemoryTransaction};
pub use traced::TracedExecutor;
