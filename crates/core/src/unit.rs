//! Executable units: their metadata, state shape, and the run contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::{Capability, Time};

/// Base score awarded once every required capability is present.
const BASE_SCORE: f64 = 0.5;
/// Weight of the context-tag overlap ratio.
const TAG_WEIGHT: f64 = 0.2;
/// Ceiling of the priority bonus.
const MAX_PRIORITY_BONUS: f64 = 0.3;

/// Descriptor of an executable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitMetadata {
    /// Unique name across a registry
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Capabilities this unit provides
    pub capabilities: BTreeSet<Capability>,

    /// Free-form tags used for contextual scoring
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Higher is preferred
    #[serde(default)]
    pub priority: i32,

    /// Maximum concurrent executions (0 = unbounded)
    #[serde(default)]
    pub max_concurrency: usize,

    /// Declared execution budget in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Expected input shape
    #[serde(default)]
    pub input_schema: serde_json::Value,

    /// Produced output shape
    #[serde(default)]
    pub output_schema: serde_json::Value,
}

fn default_timeout_seconds() -> u64 {
    300
}

impl UnitMetadata {
    /// Create metadata with no tags, priority 0, unbounded concurrency.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            capabilities: BTreeSet::new(),
            tags: BTreeSet::new(),
            priority: 0,
            max_concurrency: 0,
            timeout_seconds: default_timeout_seconds(),
            input_schema: serde_json::Value::Null,
            output_schema: serde_json::Value::Null,
        }
    }

    /// Add a capability.
    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    /// Add a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Set priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set max concurrency (0 = unbounded).
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Set the declared timeout.
    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Set input and output schema descriptors.
    pub fn schemas(mut self, input: serde_json::Value, output: serde_json::Value) -> Self {
        self.input_schema = input;
        self.output_schema = output;
        self
    }

    /// Whether this unit supports a capability.
    pub fn matches_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Whether this unit carries every one of `tags`.
    pub fn matches_tags(&self, tags: &BTreeSet<String>) -> bool {
        tags.is_subset(&self.tags)
    }

    /// Score this unit against a set of requirements.
    ///
    /// Returns 0.0 when `required` is not a subset of the unit's
    /// capabilities. Otherwise `0.5 + tag overlap * 0.2 + priority bonus`,
    /// capped at 1.0, where the priority bonus is `priority / 100` clamped
    /// to `[0, 0.3]`.
    pub fn score_match(&self, required: &BTreeSet<Capability>, context_tags: &BTreeSet<String>) -> f64 {
        if !required.is_subset(&self.capabilities) {
            return 0.0;
        }

        let overlap = self.tags.intersection(context_tags).count() as f64;
        let tag_score = overlap / context_tags.len().max(1) as f64 * TAG_WEIGHT;
        let priority_score = (self.priority as f64 / 100.0).clamp(0.0, MAX_PRIORITY_BONUS);

        (BASE_SCORE + tag_score + priority_score).min(1.0)
    }
}

/// Lifecycle of a single unit execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Not started yet
    Pending,
    /// Currently running
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Exceeded its execution budget
    Timeout,
}

impl UnitStatus {
    /// The snake_case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Pending => "pending",
            UnitStatus::Running => "running",
            UnitStatus::Completed => "completed",
            UnitStatus::Failed => "failed",
            UnitStatus::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State handed to a unit and returned by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitState {
    /// Name of the unit being run
    pub unit_name: String,

    /// Task input
    pub input_data: serde_json::Value,

    /// Output produced by the unit
    pub output_data: serde_json::Value,

    /// Execution status
    pub status: UnitStatus,

    /// Error message if failed
    pub error: Option<String>,

    /// Scratch data the unit keeps between its own steps
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Start timestamp
    pub started_at: Option<Time>,

    /// Completion timestamp
    pub completed_at: Option<Time>,
}

impl UnitState {
    /// Create a pending state for a unit.
    pub fn new(unit_name: impl Into<String>, input_data: serde_json::Value) -> Self {
        Self {
            unit_name: unit_name.into(),
            input_data,
            output_data: serde_json::Value::Object(Default::default()),
            status: UnitStatus::Pending,
            error: None,
            metadata: serde_json::Map::new(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Mark execution as started.
    pub fn mark_started(&mut self) {
        self.status = UnitStatus::Running;
        self.started_at = Some(chrono::Utc::now());
    }

    /// Mark execution as completed, replacing the output when one is given.
    pub fn mark_completed(&mut self, output: Option<serde_json::Value>) {
        self.status = UnitStatus::Completed;
        self.completed_at = Some(chrono::Utc::now());
        if let Some(output) = output {
            self.output_data = output;
        }
    }

    /// Mark execution as failed.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = UnitStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(chrono::Utc::now());
    }

    /// Set a field of the output object.
    pub fn set_output(&mut self, key: &str, value: serde_json::Value) {
        if !self.output_data.is_object() {
            self.output_data = serde_json::Value::Object(Default::default());
        }
        if let Some(map) = self.output_data.as_object_mut() {
            map.insert(key.to_string(), value);
        }
    }

    /// Read a string field of the input object.
    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.input_data.get(key).and_then(|v| v.as_str())
    }

    /// Execution time in seconds, once both timestamps are set.
    pub fn execution_time(&self) -> Option<f64> {
        let (start, end) = (self.started_at?, self.completed_at?);
        Some((end - start).num_microseconds()? as f64 / 1_000_000.0)
    }
}

/// A runnable unit instance.
///
/// Instances are created fresh for every execution by a [`UnitBuilder`].
/// By completion the returned state must carry `output_data`, a terminal
/// `status` and, on failure, `error`. Returning `Err` is treated as an
/// execution fault.
#[async_trait]
pub trait Unit: Send + Sync {
    /// Run the unit against the given state.
    async fn run(&self, state: UnitState) -> Result<UnitState, anyhow::Error>;
}

/// Produces fresh unit instances.
pub trait UnitBuilder: Send + Sync {
    /// Create a new runnable instance.
    fn instantiate(&self) -> Box<dyn Unit>;
}
