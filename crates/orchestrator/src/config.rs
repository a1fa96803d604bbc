//! Orchestrator configuration.

use capflow_routing::RoutingStrategy;

/// Configuration for an orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Re-routes allowed per task after the first attempt
    pub max_retries: u32,
    /// Strategy to route with (None = the router's default)
    pub strategy: Option<RoutingStrategy>,
    /// Use the performance-adaptive router
    pub adaptive_routing: bool,
    /// Learning rate for adaptive routing
    pub learning_rate: f64,
    /// Enforce each unit's declared timeout
    pub enforce_timeouts: bool,
    /// Finalized runs kept in execution history
    pub history_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            strategy: None,
            adaptive_routing: true,
            learning_rate: 0.1,
            enforce_timeouts: false,
            history_limit: 100,
        }
    }
}
