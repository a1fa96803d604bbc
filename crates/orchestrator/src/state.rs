//! Workflow state carried through the state machine.

use capflow_core::{TaskSpec, UnitStatus, WorkflowId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Status of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorStatus {
    /// Not started
    Idle,
    /// Processing tasks
    Running,
    /// Finished with at least one completed task, or with no failures
    Completed,
    /// Current step faulted, or the run finished with only failures
    Failed,
    /// Re-routing the current task
    Retry,
}

/// An error recorded against a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskError {
    /// Type of the task
    pub task_type: String,
    /// Unit involved, if one was selected
    pub unit: Option<String>,
    /// What went wrong
    pub error: String,
    /// Extra detail, e.g. the routing reason
    pub reason: Option<String>,
}

/// Result of one unit execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitOutcome {
    /// Output produced by the unit
    pub output: serde_json::Value,
    /// Status the unit finished with
    pub status: UnitStatus,
    /// Wall-clock duration in seconds
    pub execution_time: Option<f64>,
    /// Error reported or raised
    pub error: Option<String>,
}

/// A task that finished successfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedTask {
    /// The task
    pub task: TaskSpec,
    /// Outcome of the successful execution
    pub result: UnitOutcome,
    /// Unit that completed it
    pub unit: String,
}

/// A task that exhausted its retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedTask {
    /// The task, with the exclusions accumulated across retries
    pub task: TaskSpec,
    /// Errors recorded for this task
    pub errors: Vec<TaskError>,
    /// Routing attempts made
    pub attempts: u32,
}

/// Values passed between state-machine steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowContext {
    /// Unit chosen by the last routing step
    pub selected_unit: Option<String>,
    /// Score of that selection
    pub routing_score: Option<f64>,
    /// Duration of the last execution in seconds
    pub last_execution_time: Option<f64>,
    /// Result of the last validation
    pub validation_passed: bool,
    /// Errors recorded for the current task
    pub task_errors: Vec<TaskError>,
}

/// State of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorState {
    /// Workflow id
    pub workflow_id: WorkflowId,
    /// Task being processed
    pub current_task: Option<TaskSpec>,
    /// Tasks waiting, in FIFO order
    pub task_queue: VecDeque<TaskSpec>,
    /// Completed tasks
    pub completed_tasks: Vec<CompletedTask>,
    /// Failed tasks
    pub failed_tasks: Vec<FailedTask>,
    /// Current status
    pub status: OrchestratorStatus,
    /// Every error recorded during the run
    pub errors: Vec<TaskError>,
    /// Error-handling passes for the current task
    pub retry_count: u32,
    /// Re-routes allowed per task
    pub max_retries: u32,
    /// Step-to-step context
    pub context: WorkflowContext,
    /// Last outcome per unit
    pub unit_results: HashMap<String, UnitOutcome>,
}

impl OrchestratorState {
    /// Create an idle state with a task queue.
    pub fn new(workflow_id: WorkflowId, tasks: impl IntoIterator<Item = TaskSpec>, max_retries: u32) -> Self {
        Self {
            workflow_id,
            current_task: None,
            task_queue: tasks.into_iter().collect(),
            completed_tasks: Vec::new(),
            failed_tasks: Vec::new(),
            status: OrchestratorStatus::Idle,
            errors: Vec::new(),
            retry_count: 0,
            max_retries,
            context: WorkflowContext::default(),
            unit_results: HashMap::new(),
        }
    }

    /// Record an error for the current task and the run.
    pub fn record_error(&mut self, error: TaskError) {
        self.context.task_errors.push(error.clone());
        self.errors.push(error);
    }

    /// Type label of the current task.
    pub fn current_task_type(&self) -> &str {
        self.current_task.as_ref().map(|t| t.task_type.as_str()).unwrap_or("unknown")
    }
}
