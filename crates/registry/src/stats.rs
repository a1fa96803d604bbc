//! Registry statistics snapshots.

use capflow_core::Capability;
use serde::Serialize;
use std::collections::BTreeMap;

/// Point-in-time view of one registered unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitSnapshot {
    /// Unit name
    pub name: String,
    /// Advertised capabilities
    pub capabilities: Vec<Capability>,
    /// Executions currently holding a slot
    pub active_executions: usize,
    /// Concurrency cap (0 = unbounded)
    pub max_concurrency: usize,
    /// Whether another execution would be admitted
    pub can_execute: bool,
}

/// Point-in-time view of the whole registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryStats {
    /// Number of registered units
    pub total_units: usize,
    /// Units per capability
    pub capabilities: BTreeMap<Capability, usize>,
    /// Sum of active executions across units
    pub total_active_executions: usize,
    /// Per-unit snapshots, ordered by name
    pub units: Vec<UnitSnapshot>,
}
