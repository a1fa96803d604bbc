//! Execution statistics.

use capflow_core::{Time, WorkflowId};
use capflow_registry::RegistryStats;
use capflow_routing::RoutingStats;
use serde::Serialize;

use crate::{OrchestratorStatus, TaskError};

/// Summary recorded when a workflow run finalizes.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    /// Workflow id
    pub workflow_id: WorkflowId,
    /// Final status
    pub status: OrchestratorStatus,
    /// Tasks completed
    pub completed_tasks: usize,
    /// Tasks failed
    pub failed_tasks: usize,
    /// Errors accumulated during the run
    pub errors: Vec<TaskError>,
    /// Finalization timestamp
    pub finished_at: Time,
}

/// Read-only view of an orchestrator and its collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStats {
    /// Workflow id
    pub workflow_id: WorkflowId,
    /// Finalized runs
    pub total_executions: usize,
    /// Router statistics
    pub router_stats: RoutingStats,
    /// Registry statistics
    pub registry_stats: RegistryStats,
    /// Most recent run summaries, oldest first
    pub execution_history: Vec<ExecutionSummary>,
}
