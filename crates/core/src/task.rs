//! Task descriptors accepted by an orchestrator queue.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::Capability;

/// A task waiting to be routed to a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task type label
    #[serde(rename = "type")]
    pub task_type: String,

    /// Capabilities the executing unit must have
    pub required_capabilities: BTreeSet<Capability>,

    /// Context tags for scoring
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Opaque input handed to the unit
    #[serde(default)]
    pub input: serde_json::Value,

    /// Units that must not be selected; grows across retries
    #[serde(default, alias = "exclude_subgraphs")]
    pub exclude_units: BTreeSet<String>,
}

impl TaskSpec {
    /// Create a task with no requirements.
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            required_capabilities: BTreeSet::new(),
            tags: BTreeSet::new(),
            input: serde_json::Value::Null,
            exclude_units: BTreeSet::new(),
        }
    }

    /// Require a capability.
    pub fn require(mut self, capability: Capability) -> Self {
        self.required_capabilities.insert(capability);
        self
    }

    /// Add a context tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// Set the input payload.
    pub fn input(mut self, input: serde_json::Value) -> Self {
        self.input = input;
        self
    }

    /// Exclude a unit from selection.
    pub fn exclude(mut self, unit: impl Into<String>) -> Self {
        self.exclude_units.insert(unit.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_builder() {
        let task = TaskSpec::new("generate")
            .require(Capability::CodeGeneration)
            .tag("java")
            .input(serde_json::json!({"requirements": "hello"}))
            .exclude("legacy_gen");

        assert_eq!(task.task_type, "generate");
        assert!(task.required_capabilities.contains(&Capability::CodeGeneration));
        assert!(task.tags.contains("java"));
        assert!(task.exclude_units.contains("legacy_gen"));
    }

    #[test]
    fn test_task_from_descriptor_json() {
        let json = r#"{
            "type": "check",
            "required_capabilities": ["error_checking"],
            "input": {"code": "class A {}"},
            "exclude_subgraphs": ["slow_checker"]
        }"#;

        let task: TaskSpec = serde_json::from_str(json).unwrap();
        assert_eq!(task.task_type, "check");
        assert!(task.required_capabilities.contains(&Capability::ErrorChecking));
        assert!(task.tags.is_empty());
        assert!(task.exclude_units.contains("slow_checker"));
    }

    #[test]
    fn test_task_rejects_unknown_capability() {
        let json = r#"{"type": "x", "required_capabilities": ["telepathy"]}"#;
        assert!(serde_json::from_str::<TaskSpec>(json).is_err());
    }
}
