//! Routing statistics.

use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregate view of routing decisions since the last history clear.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoutingStats {
    /// Decisions made
    pub total_decisions: usize,
    /// Decisions with a selected unit
    pub successful_routes: usize,
    /// Decisions without a selected unit
    pub failed_routes: usize,
    /// successful / total, 0 when no decisions
    pub success_rate: f64,
    /// Mean score over successful decisions
    pub average_score: f64,
    /// Selections per unit
    pub routes_per_unit: BTreeMap<String, usize>,
    /// Current round-robin cursor
    pub round_robin_cursor: usize,
}
