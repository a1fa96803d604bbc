use async_trait::async_trait;
use capflow_core::{Capability, TaskSpec, Unit, UnitBuilder, UnitMetadata, UnitState};
use capflow_orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorStatus};
use capflow_registry::CapabilityRegistry;
use capflow_routing::RoutingStrategy;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Copy)]
enum Behavior {
    Complete,
    ReportFailure,
    Raise,
    Panic,
}

#[derive(Clone, Copy)]
struct Scripted(Behavior);

#[async_trait]
impl Unit for Scripted {
    async fn run(&self, mut state: UnitState) -> anyhow::Result<UnitState> {
        state.mark_started();
        match self.0 {
            Behavior::Complete => {
                let name = state.unit_name.clone();
                state.set_output("handled_by", serde_json::json!(name));
                state.mark_completed(None);
                Ok(state)
            }
            Behavior::ReportFailure => {
                state.mark_failed("unit gave up");
                Ok(state)
            }
            Behavior::Raise => anyhow::bail!("boom"),
            Behavior::Panic => panic!("unit blew up"),
        }
    }
}

impl UnitBuilder for Scripted {
    fn instantiate(&self) -> Box<dyn Unit> {
        Box::new(*self)
    }
}

fn register(registry: &CapabilityRegistry, name: &str, caps: &[Capability], priority: i32, behavior: Behavior) {
    let mut metadata = UnitMetadata::new(name, format!("{name} unit")).priority(priority);
    for cap in caps {
        metadata = metadata.capability(*cap);
    }
    registry.register(metadata, Scripted(behavior)).unwrap();
}

fn config(max_retries: u32) -> OrchestratorConfig {
    OrchestratorConfig {
        max_retries,
        ..Default::default()
    }
}

#[tokio::test]
async fn always_failing_unit_exhausts_retries() {
    let registry = Arc::new(CapabilityRegistry::new());
    register(&registry, "broken", &[Capability::Testing], 50, Behavior::ReportFailure);

    let mut orchestrator = Orchestrator::new("retries", registry, config(3));
    let state = orchestrator
        .execute(vec![TaskSpec::new("test").require(Capability::Testing)])
        .await;

    assert_eq!(state.status, OrchestratorStatus::Failed);
    assert!(state.completed_tasks.is_empty());
    assert_eq!(state.failed_tasks.len(), 1);

    let failed = &state.failed_tasks[0];
    assert_eq!(failed.attempts, 4);
    assert!(failed.task.exclude_units.contains("broken"));
    // one validation failure, then three routing failures once the unit is excluded
    assert_eq!(failed.errors.len(), 4);
    assert_eq!(failed.errors[0].unit.as_deref(), Some("broken"));
    assert!(failed.errors[1..].iter().all(|e| e.unit.is_none()));
}

#[tokio::test]
async fn disjoint_tasks_both_complete() {
    let registry = Arc::new(CapabilityRegistry::new());
    register(&registry, "coder", &[Capability::CodeGeneration], 50, Behavior::Complete);
    register(&registry, "checker", &[Capability::ErrorChecking], 50, Behavior::Complete);

    let mut orchestrator = Orchestrator::new("pipeline", registry, config(3));
    let state = orchestrator
        .execute(vec![
            TaskSpec::new("generate").require(Capability::CodeGeneration),
            TaskSpec::new("check").require(Capability::ErrorChecking),
        ])
        .await;

    assert_eq!(state.status, OrchestratorStatus::Completed);
    assert!(state.failed_tasks.is_empty());
    let units: Vec<_> = state.completed_tasks.iter().map(|t| t.unit.as_str()).collect();
    assert_eq!(units, ["coder", "checker"]);
    assert_eq!(state.completed_tasks[1].result.output["handled_by"], "checker");
    assert!(state.errors.is_empty());
}

#[tokio::test]
async fn partial_success_is_completed() {
    let registry = Arc::new(CapabilityRegistry::new());
    register(&registry, "coder", &[Capability::CodeGeneration], 50, Behavior::Complete);

    let mut orchestrator = Orchestrator::new("partial", registry, config(1));
    let state = orchestrator
        .execute(vec![
            TaskSpec::new("generate").require(Capability::CodeGeneration),
            TaskSpec::new("docs").require(Capability::Documentation),
        ])
        .await;

    assert_eq!(state.status, OrchestratorStatus::Completed);
    assert_eq!(state.completed_tasks.len(), 1);
    assert_eq!(state.failed_tasks.len(), 1);
    assert_eq!(state.failed_tasks[0].task.task_type, "docs");
    assert_eq!(state.failed_tasks[0].attempts, 2);
}

#[tokio::test]
async fn only_failures_is_failed() {
    let registry = Arc::new(CapabilityRegistry::new());

    let mut orchestrator = Orchestrator::new("hopeless", registry, config(0));
    let state = orchestrator
        .execute(vec![
            TaskSpec::new("a").require(Capability::Testing),
            TaskSpec::new("b").require(Capability::Debugging),
        ])
        .await;

    assert_eq!(state.status, OrchestratorStatus::Failed);
    assert_eq!(state.failed_tasks.len(), 2);
    assert!(state.failed_tasks.iter().all(|t| t.attempts == 1));
    assert_eq!(state.errors.len(), 2);
}

#[tokio::test]
async fn failed_status_reroutes_to_alternative() {
    let registry = Arc::new(CapabilityRegistry::new());
    register(&registry, "flaky", &[Capability::Refactoring], 90, Behavior::ReportFailure);
    register(&registry, "steady", &[Capability::Refactoring], 10, Behavior::Complete);

    let mut orchestrator = Orchestrator::new("reroute", registry, config(3));
    let state = orchestrator
        .execute(vec![TaskSpec::new("refactor").require(Capability::Refactoring)])
        .await;

    assert_eq!(state.status, OrchestratorStatus::Completed);
    assert_eq!(state.completed_tasks.len(), 1);
    assert_eq!(state.completed_tasks[0].unit, "steady");
    assert!(state.completed_tasks[0].task.exclude_units.contains("flaky"));
    assert_eq!(state.errors.len(), 1);
    assert_eq!(state.errors[0].reason.as_deref(), Some("unit gave up"));

    let adaptive = orchestrator.router_mut().as_adaptive_mut().unwrap();
    assert_eq!(adaptive.get_average_performance("flaky"), 0.0);
    assert_eq!(adaptive.get_average_performance("steady"), 1.0);
}

#[tokio::test]
async fn raised_error_releases_slot() {
    let registry = Arc::new(CapabilityRegistry::new());
    register(&registry, "raiser", &[Capability::Debugging], 50, Behavior::Raise);

    let mut orchestrator = Orchestrator::new("fault", registry.clone(), config(0));
    let state = orchestrator
        .execute(vec![TaskSpec::new("debug").require(Capability::Debugging)])
        .await;

    assert_eq!(state.status, OrchestratorStatus::Failed);
    assert_eq!(registry.get("raiser").unwrap().active_executions, 0);
    assert!(state.errors[0].error.contains("boom"));
    assert_eq!(
        state.unit_results["raiser"].status,
        capflow_core::UnitStatus::Failed
    );
}

#[tokio::test]
async fn retry_count_resets_per_task() {
    let registry = Arc::new(CapabilityRegistry::new());
    register(&registry, "coder", &[Capability::CodeGeneration], 50, Behavior::Complete);

    let mut orchestrator = Orchestrator::new("reset", registry, config(2));
    let state = orchestrator
        .execute(vec![
            TaskSpec::new("missing").require(Capability::Testing),
            TaskSpec::new("generate").require(Capability::CodeGeneration),
        ])
        .await;

    assert_eq!(state.failed_tasks[0].attempts, 3);
    assert_eq!(state.completed_tasks.len(), 1);
    assert_eq!(state.retry_count, 0);
    assert_eq!(state.status, OrchestratorStatus::Completed);
}

#[tokio::test]
async fn configured_strategy_overrides_default() {
    let registry = Arc::new(CapabilityRegistry::new());
    register(
        &registry,
        "generalist",
        &[Capability::CodeGeneration, Capability::Documentation],
        10,
        Behavior::Complete,
    );
    register(&registry, "specialist", &[Capability::CodeGeneration], 80, Behavior::Complete);

    let config = OrchestratorConfig {
        strategy: Some(RoutingStrategy::RoundRobin),
        adaptive_routing: false,
        ..Default::default()
    };
    let mut orchestrator = Orchestrator::new("rr", registry, config);
    let tasks = (0..3).map(|_| TaskSpec::new("generate").require(Capability::CodeGeneration));
    let state = orchestrator.execute(tasks).await;

    let units: Vec<_> = state.completed_tasks.iter().map(|t| t.unit.as_str()).collect();
    assert_eq!(units, ["generalist", "specialist", "generalist"]);

    let stats = orchestrator.get_execution_stats();
    assert_eq!(stats.router_stats.total_decisions, 3);
    assert_eq!(stats.router_stats.routes_per_unit["generalist"], 2);
}

#[tokio::test]
async fn execution_stats_track_runs() {
    let registry = Arc::new(CapabilityRegistry::new());
    register(&registry, "coder", &[Capability::CodeGeneration], 50, Behavior::Complete);

    let (mut orchestrator, state) = Orchestrator::create(
        "stats",
        vec![TaskSpec::new("generate").require(Capability::CodeGeneration)],
        registry,
        OrchestratorConfig::default(),
    );
    assert_eq!(state.status, OrchestratorStatus::Idle);

    let state = orchestrator.run(state).await;
    assert_eq!(state.status, OrchestratorStatus::Completed);
    orchestrator.execute(Vec::new()).await;

    let stats = orchestrator.get_execution_stats();
    assert_eq!(stats.total_executions, 2);
    assert_eq!(stats.execution_history.len(), 2);
    assert_eq!(stats.execution_history[0].completed_tasks, 1);
    assert_eq!(stats.registry_stats.total_units, 1);
    assert_eq!(stats.workflow_id.as_str(), "stats");
}

#[tokio::test]
async fn panicking_unit_is_contained() {
    let registry = Arc::new(CapabilityRegistry::new());
    register(&registry, "panicky", &[Capability::Testing], 50, Behavior::Panic);
    register(&registry, "coder", &[Capability::CodeGeneration], 50, Behavior::Complete);

    let mut orchestrator = Orchestrator::new("panic", registry.clone(), config(0));
    let state = orchestrator
        .execute(vec![
            TaskSpec::new("test").require(Capability::Testing),
            TaskSpec::new("generate").require(Capability::CodeGeneration),
        ])
        .await;

    assert_eq!(state.status, OrchestratorStatus::Completed);
    assert_eq!(state.failed_tasks.len(), 1);
    assert_eq!(state.failed_tasks[0].task.task_type, "test");
    assert!(state.failed_tasks[0].errors[0].error.contains("unit blew up"));
    assert_eq!(state.completed_tasks.len(), 1);
    assert_eq!(state.completed_tasks[0].unit, "coder");
    assert_eq!(registry.get("panicky").unwrap().active_executions, 0);
    assert_eq!(orchestrator.get_execution_stats().total_executions, 1);
}

/// Tracks how many instances run at once.
#[derive(Clone)]
struct Gauge {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl Unit for Gauge {
    async fn run(&self, mut state: UnitState) -> anyhow::Result<UnitState> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        state.mark_completed(None);
        Ok(state)
    }
}

impl UnitBuilder for Gauge {
    fn instantiate(&self) -> Box<dyn Unit> {
        Box::new(self.clone())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn orchestrators_share_registry_across_tasks() {
    let registry = Arc::new(CapabilityRegistry::new());
    let gauge = Gauge {
        current: Arc::new(AtomicUsize::new(0)),
        peak: Arc::new(AtomicUsize::new(0)),
    };
    registry
        .register(
            UnitMetadata::new("single", "one at a time")
                .capability(Capability::Testing)
                .max_concurrency(1),
            gauge.clone(),
        )
        .unwrap();

    let handles: Vec<_> = ["left", "right"]
        .into_iter()
        .map(|id| {
            let mut orchestrator = Orchestrator::new(id, registry.clone(), config(3));
            let tasks: Vec<_> = (0..4)
                .map(|_| TaskSpec::new("test").require(Capability::Testing))
                .collect();
            tokio::spawn(async move { orchestrator.execute(tasks).await })
        })
        .collect();

    for handle in handles {
        let state = handle.await.unwrap();
        assert!(matches!(
            state.status,
            OrchestratorStatus::Completed | OrchestratorStatus::Failed
        ));
        assert!(state.task_queue.is_empty());
        assert_eq!(state.completed_tasks.len() + state.failed_tasks.len(), 4);
    }

    assert!(gauge.peak.load(Ordering::SeqCst) <= 1);
    assert_eq!(registry.get("single").unwrap().active_executions, 0);
}
