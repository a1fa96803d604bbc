//! Routing inputs and outputs.

use capflow_core::{Capability, TaskSpec, Time};
use capflow_registry::Registration;
use std::collections::BTreeSet;

use crate::RoutingStrategy;

/// What a task needs from the unit that will run it.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutingContext {
    /// Task type label
    pub task_type: String,

    /// Capabilities the unit must have
    pub required_capabilities: BTreeSet<Capability>,

    /// Tags used for contextual scoring
    pub context_tags: BTreeSet<String>,

    /// Task input
    pub input_data: serde_json::Value,

    /// Units that must not be selected
    pub exclude_units: BTreeSet<String>,
}

impl RoutingContext {
    /// Create a context with no requirements.
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            required_capabilities: BTreeSet::new(),
            context_tags: BTreeSet::new(),
            input_data: serde_json::Value::Null,
            exclude_units: BTreeSet::new(),
        }
    }

    /// Build the context for a queued task.
    pub fn from_task(task: &TaskSpec) -> Self {
        Self {
            task_type: task.task_type.clone(),
            required_capabilities: task.required_capabilities.clone(),
            context_tags: task.tags.clone(),
            input_data: task.input.clone(),
            exclude_units: task.exclude_units.clone(),
        }
    }

    /// Require a capability.
    pub fn require(mut self, capability: Capability) -> Self {
        self.required_capabilities.insert(capability);
        self
    }

    /// Add a context tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.context_tags.insert(tag.into());
        self
    }

    /// Set the input payload.
    pub fn input(mut self, input: serde_json::Value) -> Self {
        self.input_data = input;
        self
    }

    /// Exclude a unit.
    pub fn exclude(mut self, unit: impl Into<String>) -> Self {
        self.exclude_units.insert(unit.into());
        self
    }
}

/// Outcome of one routing call.
///
/// Finding no unit is a normal outcome: `selected` is `None`, `score` is 0
/// and `reason` says why.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    /// Selected unit, if any
    pub selected: Option<Registration>,

    /// Score of the selection in [0, 1]
    pub score: f64,

    /// Human-readable explanation
    pub reason: String,

    /// Ranked runners-up with their scores
    pub alternatives: Vec<(Registration, f64)>,

    /// Strategy that produced the decision
    pub strategy: RoutingStrategy,

    /// Context the decision was made for
    pub context: RoutingContext,

    /// When the decision was made
    pub decided_at: Time,
}

impl RoutingDecision {
    /// A decision that selected `unit`.
    pub fn selected(
        context: RoutingContext,
        strategy: RoutingStrategy,
        unit: Registration,
        score: f64,
        reason: impl Into<String>,
        alternatives: Vec<(Registration, f64)>,
    ) -> Self {
        Self {
            selected: Some(unit),
            score,
            reason: reason.into(),
            alternatives,
            strategy,
            context,
            decided_at: chrono::Utc::now(),
        }
    }

    /// A decision that found nothing.
    pub fn no_match(context: RoutingContext, strategy: RoutingStrategy, reason: impl Into<String>) -> Self {
        Self {
            selected: None,
            score: 0.0,
            reason: reason.into(),
            alternatives: Vec::new(),
            strategy,
            context,
            decided_at: chrono::Utc::now(),
        }
    }

    /// Whether a unit was selected.
    pub fn is_match(&self) -> bool {
        self.selected.is_some()
    }

    /// Name of the selected unit.
    pub fn selected_name(&self) -> Option<&str> {
        self.selected.as_ref().map(Registration::name)
    }
}
