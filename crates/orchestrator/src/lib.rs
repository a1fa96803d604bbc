//! Orchestration layer - drives a workflow's task queue through routing,
//! execution, validation and bounded retry with re-routing.

#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod state;
pub mod stats;

pub use config::OrchestratorConfig;
pub use engine::{ExecutionFault, Orchestrator, Step};
pub use state::{
    CompletedTask, FailedTask, OrchestratorState, OrchestratorStatus, TaskError, UnitOutcome, WorkflowContext,
};
pub use stats::{ExecutionStats, ExecutionSummary};
