//! The orchestrator state machine.
//!
//! ```text
//! initialize -> get_next_task
//! get_next_task -> route_task | finalize
//! route_task -> execute_unit
//! execute_unit -> validate_result | handle_error
//! validate_result -> get_next_task | handle_error
//! handle_error -> route_task | get_next_task | finalize
//! ```

use capflow_core::{TaskSpec, UnitState, UnitStatus, WorkflowId};
use capflow_registry::CapabilityRegistry;
use capflow_routing::{AdaptiveRouter, Router, RoutingContext, TaskRouter};
use futures::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::{
    CompletedTask, ExecutionStats, ExecutionSummary, FailedTask, OrchestratorConfig, OrchestratorState,
    OrchestratorStatus, TaskError, UnitOutcome,
};

/// Run summaries returned by [`Orchestrator::get_execution_stats`].
const STATS_HISTORY_TAIL: usize = 10;

/// A fault raised while executing a unit.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionFault {
    /// The selected unit was deregistered before it could run
    #[error("Unit '{0}' not found in registry")]
    NotRegistered(String),

    /// The selected unit had no free execution slot
    #[error("Unit '{0}' has no free execution slot")]
    CapacityExhausted(String),

    /// The unit returned an error
    #[error("Unit '{unit}' failed: {message}")]
    Unit {
        /// Unit name
        unit: String,
        /// Error message
        message: String,
    },

    /// The unit overran its declared timeout
    #[error("Unit '{unit}' exceeded its {seconds}s timeout")]
    Timeout {
        /// Unit name
        unit: String,
        /// Declared timeout
        seconds: u64,
    },
}

impl ExecutionFault {
    fn status(&self) -> UnitStatus {
        match self {
            ExecutionFault::Timeout { .. } => UnitStatus::Timeout,
            _ => UnitStatus::Failed,
        }
    }
}

/// States of the orchestration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Mark the workflow running
    Initialize,
    /// Dequeue the next task
    GetNextTask,
    /// Select a unit for the current task
    RouteTask,
    /// Run the selected unit
    ExecuteUnit,
    /// Check the unit's reported status
    ValidateResult,
    /// Retry with re-routing or give up on the task
    HandleError,
    /// Settle the final status
    Finalize,
}

/// Drives one workflow's task queue.
///
/// A single cooperative control flow: tasks run one at a time and the
/// orchestrator waits on each unit invocation.
pub struct Orchestrator {
    workflow_id: WorkflowId,
    registry: Arc<CapabilityRegistry>,
    router: Box<dyn TaskRouter>,
    config: OrchestratorConfig,
    history: VecDeque<ExecutionSummary>,
    runs: usize,
}

impl Orchestrator {
    /// Create an orchestrator. Uses an [`AdaptiveRouter`] unless
    /// `config.adaptive_routing` is off.
    pub fn new(
        workflow_id: impl Into<WorkflowId>,
        registry: Arc<CapabilityRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        let router: Box<dyn TaskRouter> = if config.adaptive_routing {
            Box::new(AdaptiveRouter::new(registry.clone(), config.learning_rate))
        } else {
            Box::new(Router::new(registry.clone()))
        };
        let workflow_id = workflow_id.into();
        info!(workflow = %workflow_id, adaptive = config.adaptive_routing, "Orchestrator initialized");

        Self {
            workflow_id,
            registry,
            router,
            config,
            history: VecDeque::new(),
            runs: 0,
        }
    }

    /// Create an orchestrator together with the initial state for `tasks`.
    pub fn create(
        workflow_id: impl Into<WorkflowId>,
        tasks: impl IntoIterator<Item = TaskSpec>,
        registry: Arc<CapabilityRegistry>,
        config: OrchestratorConfig,
    ) -> (Self, OrchestratorState) {
        let orchestrator = Self::new(workflow_id, registry, config);
        let state = orchestrator.initial_state(tasks);
        (orchestrator, state)
    }

    /// Replace the router.
    pub fn with_router(mut self, router: Box<dyn TaskRouter>) -> Self {
        self.router = router;
        self
    }

    /// Workflow id.
    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    /// The router in use.
    pub fn router(&self) -> &dyn TaskRouter {
        self.router.as_ref()
    }

    /// Mutable access to the router.
    pub fn router_mut(&mut self) -> &mut dyn TaskRouter {
        self.router.as_mut()
    }

    /// Build an idle state for a task queue.
    pub fn initial_state(&self, tasks: impl IntoIterator<Item = TaskSpec>) -> OrchestratorState {
        OrchestratorState::new(self.workflow_id.clone(), tasks, self.config.max_retries)
    }

    /// Run a task queue to completion.
    pub async fn execute(&mut self, tasks: impl IntoIterator<Item = TaskSpec>) -> OrchestratorState {
        let state = self.initial_state(tasks);
        self.run(state).await
    }

    /// Drive `state` from `initialize` until `finalize`.
    ///
    /// `initialize` stamps the state with this orchestrator's workflow id and
    /// `config.max_retries`, replacing whatever the caller put there. Build the
    /// state with [`Orchestrator::initial_state`] to keep the two in agreement.
    pub async fn run(&mut self, mut state: OrchestratorState) -> OrchestratorState {
        let mut step = Step::Initialize;

        loop {
            debug!(?step, status = ?state.status, "Entering step");
            step = match step {
                Step::Initialize => {
                    self.initialize(&mut state);
                    Step::GetNextTask
                }
                Step::GetNextTask => {
                    self.get_next_task(&mut state);
                    self.after_get_next_task(&state)
                }
                Step::RouteTask => {
                    self.route_task(&mut state);
                    Step::ExecuteUnit
                }
                Step::ExecuteUnit => {
                    self.execute_unit(&mut state).await;
                    self.after_execute_unit(&state)
                }
                Step::ValidateResult => {
                    self.validate_result(&mut state);
                    self.after_validate_result(&state)
                }
                Step::HandleError => {
                    self.handle_error(&mut state);
                    self.after_handle_error(&state)
                }
                Step::Finalize => {
                    self.finalize(&mut state);
                    break;
                }
            };
        }

        state
    }

    fn initialize(&self, state: &mut OrchestratorState) {
        info!(workflow = %self.workflow_id, tasks = state.task_queue.len(), "Initializing workflow");
        state.workflow_id = self.workflow_id.clone();
        state.status = OrchestratorStatus::Running;
        state.max_retries = self.config.max_retries;
    }

    fn get_next_task(&self, state: &mut OrchestratorState) {
        state.current_task = state.task_queue.pop_front();
        state.retry_count = 0;
        state.context.task_errors.clear();
        state.context.selected_unit = None;

        match &state.current_task {
            Some(task) => {
                state.status = OrchestratorStatus::Running;
                info!(task_type = %task.task_type, remaining = state.task_queue.len(), "Processing task");
            }
            None => info!("No more tasks in queue"),
        }
    }

    fn route_task(&mut self, state: &mut OrchestratorState) {
        let Some(task) = &state.current_task else {
            warn!("No current task to route");
            return;
        };

        let context = RoutingContext::from_task(task);
        let decision = match self.config.strategy {
            Some(strategy) => self.router.route_with(context, strategy),
            None => self.router.route(context),
        };

        match decision.selected_name() {
            Some(name) => {
                info!(unit = %name, score = decision.score, "Routed task");
                state.context.selected_unit = Some(name.to_string());
                state.context.routing_score = Some(decision.score);
            }
            None => {
                error!(reason = %decision.reason, "Failed to route task");
                state.context.selected_unit = None;
                state.context.routing_score = None;
                let task_type = state.current_task_type().to_string();
                state.record_error(TaskError {
                    task_type,
                    unit: None,
                    error: "No suitable unit found".to_string(),
                    reason: Some(decision.reason.clone()),
                });
            }
        }
    }

    async fn execute_unit(&mut self, state: &mut OrchestratorState) {
        let Some(unit) = state.context.selected_unit.clone() else {
            state.status = OrchestratorStatus::Failed;
            return;
        };
        state.status = OrchestratorStatus::Running;

        let input = state
            .current_task
            .as_ref()
            .map(|t| t.input.clone())
            .unwrap_or(serde_json::Value::Null);

        let performance = match self.invoke(&unit, input).await {
            Ok(outcome) => {
                info!(
                    unit = %unit,
                    status = %outcome.status,
                    seconds = outcome.execution_time.unwrap_or_default(),
                    "Unit finished"
                );
                let score = if outcome.status == UnitStatus::Completed { 1.0 } else { 0.0 };
                state.context.last_execution_time = outcome.execution_time;
                state.unit_results.insert(unit.clone(), outcome);
                score
            }
            Err(fault) => {
                error!(unit = %unit, error = %fault, "Unit execution faulted");
                state.unit_results.insert(
                    unit.clone(),
                    UnitOutcome {
                        output: serde_json::Value::Object(Default::default()),
                        status: fault.status(),
                        execution_time: None,
                        error: Some(fault.to_string()),
                    },
                );
                let task_type = state.current_task_type().to_string();
                state.record_error(TaskError {
                    task_type,
                    unit: Some(unit.clone()),
                    error: fault.to_string(),
                    reason: None,
                });
                state.status = OrchestratorStatus::Failed;
                0.0
            }
        };

        if let Some(adaptive) = self.router.as_adaptive_mut() {
            adaptive.record_performance(&unit, performance);
        }
    }

    /// Reserve a slot, run a fresh instance of `unit`, release the slot.
    async fn invoke(&self, unit: &str, input: serde_json::Value) -> Result<UnitOutcome, ExecutionFault> {
        let registration = self
            .registry
            .get(unit)
            .ok_or_else(|| ExecutionFault::NotRegistered(unit.to_string()))?;
        let _slot = self
            .registry
            .acquire_slot(unit)
            .ok_or_else(|| ExecutionFault::CapacityExhausted(unit.to_string()))?;

        info!(unit = %unit, "Executing unit");
        let instance = registration.instantiate();
        let state = UnitState::new(unit, input);
        let started = Instant::now();

        let guarded = AssertUnwindSafe(instance.run(state)).catch_unwind();
        let result = if self.config.enforce_timeouts {
            let seconds = registration.metadata.timeout_seconds;
            tokio::time::timeout(Duration::from_secs(seconds), guarded)
                .await
                .map_err(|_| ExecutionFault::Timeout {
                    unit: unit.to_string(),
                    seconds,
                })?
        } else {
            guarded.await
        };
        let elapsed = started.elapsed().as_secs_f64();

        let finished = result
            .map_err(|panic| ExecutionFault::Unit {
                unit: unit.to_string(),
                message: format!("panicked: {}", panic_message(&*panic)),
            })?
            .map_err(|e| ExecutionFault::Unit {
                unit: unit.to_string(),
                message: e.to_string(),
            })?;

        Ok(UnitOutcome {
            output: finished.output_data,
            status: finished.status,
            execution_time: Some(elapsed),
            error: finished.error,
        })
    }

    fn validate_result(&self, state: &mut OrchestratorState) {
        let unit = state.context.selected_unit.clone().unwrap_or_default();
        let outcome = state.unit_results.get(&unit).cloned();

        match outcome {
            Some(result) if result.status == UnitStatus::Completed => {
                if let Some(task) = state.current_task.clone() {
                    state.completed_tasks.push(CompletedTask { task, result, unit });
                }
                state.context.validation_passed = true;
                info!("Task validation successful");
            }
            other => {
                state.context.validation_passed = false;
                let (status, reason) = match other {
                    Some(result) => (result.status.to_string(), result.error),
                    None => ("missing".to_string(), None),
                };
                warn!(unit = %unit, status = %status, "Task validation failed");
                let task_type = state.current_task_type().to_string();
                state.record_error(TaskError {
                    task_type,
                    unit: Some(unit),
                    error: format!("Unit reported status '{status}'"),
                    reason,
                });
            }
        }
    }

    fn handle_error(&self, state: &mut OrchestratorState) {
        state.retry_count += 1;
        info!(retry = state.retry_count, max = state.max_retries, "Handling error");

        if state.retry_count <= state.max_retries {
            if let (Some(failed), Some(task)) = (&state.context.selected_unit, state.current_task.as_mut()) {
                info!(unit = %failed, "Attempting re-route");
                task.exclude_units.insert(failed.clone());
            }
            state.status = OrchestratorStatus::Retry;
        } else if let Some(task) = state.current_task.clone() {
            error!(task_type = %task.task_type, attempts = state.retry_count, "Task failed");
            state.failed_tasks.push(FailedTask {
                task,
                errors: state.context.task_errors.clone(),
                attempts: state.retry_count,
            });
            state.status = OrchestratorStatus::Failed;
        }
    }

    fn finalize(&mut self, state: &mut OrchestratorState) {
        state.status = if !state.failed_tasks.is_empty() && state.completed_tasks.is_empty() {
            OrchestratorStatus::Failed
        } else {
            OrchestratorStatus::Completed
        };

        self.runs += 1;
        self.history.push_back(ExecutionSummary {
            workflow_id: state.workflow_id.clone(),
            status: state.status,
            completed_tasks: state.completed_tasks.len(),
            failed_tasks: state.failed_tasks.len(),
            errors: state.errors.clone(),
            finished_at: chrono::Utc::now(),
        });
        while self.history.len() > self.config.history_limit.max(1) {
            self.history.pop_front();
        }

        info!(
            workflow = %self.workflow_id,
            completed = state.completed_tasks.len(),
            failed = state.failed_tasks.len(),
            "Workflow finalized"
        );
    }

    fn after_get_next_task(&self, state: &OrchestratorState) -> Step {
        if state.current_task.is_some() {
            Step::RouteTask
        } else {
            Step::Finalize
        }
    }

    fn after_execute_unit(&self, state: &OrchestratorState) -> Step {
        if state.status == OrchestratorStatus::Failed {
            Step::HandleError
        } else {
            Step::ValidateResult
        }
    }

    fn after_validate_result(&self, state: &OrchestratorState) -> Step {
        if state.context.validation_passed {
            Step::GetNextTask
        } else {
            Step::HandleError
        }
    }

    fn after_handle_error(&self, state: &OrchestratorState) -> Step {
        if state.status == OrchestratorStatus::Retry {
            Step::RouteTask
        } else if state.task_queue.is_empty() {
            Step::Finalize
        } else {
            Step::GetNextTask
        }
    }

    /// Execution statistics.
    pub fn get_execution_stats(&self) -> ExecutionStats {
        let skip = self.history.len().saturating_sub(STATS_HISTORY_TAIL);
        ExecutionStats {
            workflow_id: self.workflow_id.clone(),
            total_executions: self.runs,
            router_stats: self.router.get_routing_stats(),
            registry_stats: self.registry.get_stats(),
            execution_history: self.history.iter().skip(skip).cloned().collect(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
