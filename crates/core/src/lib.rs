//! Capflow shared contracts.
//!
//! Capabilities, unit metadata, the unit run contract and the task
//! descriptor shared by the registry, the router and the orchestrator.

#![warn(missing_docs)]

mod capability;
mod error;
mod id;
mod task;
mod unit;

pub use capability::Capability;
pub use error::{CapflowError, Result};
pub use id::WorkflowId;
pub use task::TaskSpec;
pub use unit::{Unit, UnitBuilder, UnitMetadata, UnitState, UnitStatus};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
