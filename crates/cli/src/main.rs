//! capflow CLI - capability-routed task orchestration.

use anyhow::{Context, Result};
use capflow_core::{Capability, TaskSpec, WorkflowId};
use capflow_orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorState};
use capflow_registry::CapabilityRegistry;
use capflow_routing::{Router, RoutingContext, RoutingDecision, RoutingStrategy, TaskRouter};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "capflow")]
#[command(about = "Route tasks to capability-described units and run them", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a task queue through the orchestrator
    Run {
        /// JSON file holding an array of tasks; a demo queue is used when omitted
        #[arg(long)]
        tasks: Option<PathBuf>,
        /// Workflow id (generated when omitted)
        #[arg(long)]
        workflow_id: Option<String>,
        /// Re-routes allowed per task
        #[arg(long, default_value = "3")]
        max_retries: u32,
        /// Routing strategy (best_match, round_robin, least_loaded, priority)
        #[arg(long)]
        strategy: Option<RoutingStrategy>,
        /// Disable performance-adjusted routing
        #[arg(long)]
        static_routing: bool,
        /// Abort units that overrun their declared timeout
        #[arg(long)]
        enforce_timeouts: bool,
    },
    /// Show the registered units
    Units,
    /// Route a single request and print the decision
    Route {
        /// Required capability (repeatable)
        #[arg(long = "capability", required = true)]
        capabilities: Vec<Capability>,
        /// Context tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Routing strategy
        #[arg(long, default_value = "best_match")]
        strategy: RoutingStrategy,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let registry = Arc::new(CapabilityRegistry::new());
    capflow_units::register_defaults(&registry)?;

    match cli.command {
        Commands::Run {
            tasks,
            workflow_id,
            max_retries,
            strategy,
            static_routing,
            enforce_timeouts,
        } => {
            let tasks = match tasks {
                Some(path) => load_tasks(&path)?,
                None => demo_tasks(),
            };
            let workflow_id = workflow_id.map(WorkflowId::from).unwrap_or_default();
            let config = OrchestratorConfig {
                max_retries,
                strategy,
                adaptive_routing: !static_routing,
                enforce_timeouts,
                ..Default::default()
            };

            let (mut orchestrator, state) = Orchestrator::create(workflow_id, tasks, registry, config);
            let state = orchestrator.run(state).await;
            info!(status = ?state.status, "Workflow finished");

            let report = json!({
                "summary": summarize(&state),
                "state": state,
                "stats": orchestrator.get_execution_stats(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Units => {
            println!("{}", serde_json::to_string_pretty(&registry.get_stats())?);
        }
        Commands::Route {
            capabilities,
            tags,
            strategy,
        } => {
            let mut context = RoutingContext::new("cli");
            for capability in capabilities {
                context = context.require(capability);
            }
            for tag in tags {
                context = context.tag(tag);
            }

            let mut router = Router::new(registry);
            let decision = TaskRouter::route_with(&mut router, context, strategy);
            println!("{}", serde_json::to_string_pretty(&describe(&decision))?);
        }
    }

    Ok(())
}

fn load_tasks(path: &Path) -> Result<Vec<TaskSpec>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing tasks in {}", path.display()))
}

fn demo_tasks() -> Vec<TaskSpec> {
    vec![
        TaskSpec::new("generate")
            .require(Capability::CodeGeneration)
            .tag("java")
            .input(json!({"requirements": "Create a greeting service", "language": "java"})),
        TaskSpec::new("check")
            .require(Capability::ErrorChecking)
            .tag("java")
            .input(json!({"code": "class Greeter {}"})),
        TaskSpec::new("refactor")
            .require(Capability::Refactoring)
            .input(json!({"code": "public class Greeter {}"})),
    ]
}

fn summarize(state: &OrchestratorState) -> serde_json::Value {
    json!({
        "workflow_id": state.workflow_id,
        "status": state.status,
        "completed": state.completed_tasks.iter().map(|t| json!({"task": t.task.task_type, "unit": t.unit})).collect::<Vec<_>>(),
        "failed": state.failed_tasks.iter().map(|t| json!({"task": t.task.task_type, "attempts": t.attempts})).collect::<Vec<_>>(),
        "errors": state.errors.len(),
    })
}

fn describe(decision: &RoutingDecision) -> serde_json::Value {
    json!({
        "selected": decision.selected_name(),
        "score": decision.score,
        "reason": decision.reason,
        "strategy": decision.strategy,
        "alternatives": decision
            .alternatives
            .iter()
            .map(|(unit, score)| json!({"unit": unit.name(), "score": score}))
            .collect::<Vec<_>>(),
    })
}
