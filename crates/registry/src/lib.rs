//! Capability registry - registration, discovery and capacity tracking of
//! executable units.

#![warn(missing_docs)]

mod registry;
mod slot;
mod stats;

pub use registry::{rank_candidates, CapabilityRegistry, Registration, RegistryError, Result};
pub use slot::ExecutionSlot;
pub use stats::{RegistryStats, UnitSnapshot};
