//! Performance-adaptive routing.

use capflow_registry::{rank_candidates, CapabilityRegistry};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::router::MAX_ALTERNATIVES;
use crate::{Router, RouterConfig, RoutingContext, RoutingDecision, RoutingStats, RoutingStrategy, TaskRouter};

/// Number of recent performance scores kept per unit.
pub const PERFORMANCE_WINDOW: usize = 100;

/// Average reported for a unit with no recorded performance.
const NEUTRAL_PERFORMANCE: f64 = 0.5;

/// Router that blends observed performance into best-match scoring.
///
/// For [`RoutingStrategy::BestMatch`] each capable unit is scored as
/// `base * (1 - rate) + performance * rate`. Other strategies behave
/// exactly like [`Router`].
pub struct AdaptiveRouter {
    base: Router,
    learning_rate: f64,
    performance: HashMap<String, VecDeque<f64>>,
}

impl AdaptiveRouter {
    /// Create an adaptive router. `learning_rate` is clamped to [0, 1].
    pub fn new(registry: Arc<CapabilityRegistry>, learning_rate: f64) -> Self {
        let learning_rate = learning_rate.clamp(0.0, 1.0);
        info!(learning_rate, "Adaptive router initialized");
        Self {
            base: Router::new(registry).with_strategy(RoutingStrategy::BestMatch),
            learning_rate,
            performance: HashMap::new(),
        }
    }

    /// Set the underlying router configuration.
    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.base = self.base.with_config(config);
        self
    }

    /// Effective learning rate.
    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// The underlying strategy router.
    pub fn router(&self) -> &Router {
        &self.base
    }

    /// Record a performance score in [0, 1] for a unit.
    ///
    /// Non-finite scores are recorded as 0.0.
    pub fn record_performance(&mut self, unit: &str, score: f64) {
        let score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            warn!(unit = %unit, score, "Non-finite performance score recorded as 0");
            0.0
        };
        let window = self.performance.entry(unit.to_string()).or_default();
        window.push_back(score);
        while window.len() > PERFORMANCE_WINDOW {
            window.pop_front();
        }
        debug!(unit = %unit, score, "Recorded performance");
    }

    /// Mean of the recorded window, or 0.5 without data.
    pub fn get_average_performance(&self, unit: &str) -> f64 {
        match self.performance.get(unit) {
            Some(window) if !window.is_empty() => window.iter().sum::<f64>() / window.len() as f64,
            _ => NEUTRAL_PERFORMANCE,
        }
    }

    /// Route with `strategy`; only best-match is performance-adjusted.
    pub fn route_with(&mut self, context: RoutingContext, strategy: RoutingStrategy) -> RoutingDecision {
        if strategy != RoutingStrategy::BestMatch {
            return self.base.route_with(context, strategy);
        }

        info!(task_type = %context.task_type, "Adaptive routing");
        let candidates = self.base.capable_units(&context);
        if candidates.is_empty() {
            let decision =
                RoutingDecision::no_match(context, RoutingStrategy::BestMatch, "No capable units available");
            return self.base.record(decision);
        }

        let mut scored: Vec<_> = candidates
            .into_iter()
            .filter_map(|reg| {
                let base = reg.score_match(&context.required_capabilities, &context.context_tags);
                (base > 0.0).then(|| {
                    let performance = self.get_average_performance(reg.name());
                    let adjusted = base * (1.0 - self.learning_rate) + performance * self.learning_rate;
                    (reg, adjusted)
                })
            })
            .collect();

        if scored.is_empty() {
            let decision = RoutingDecision::no_match(context, RoutingStrategy::BestMatch, "No matching units");
            return self.base.record(decision);
        }

        rank_candidates(&mut scored);
        let (unit, score) = scored.remove(0);
        scored.truncate(MAX_ALTERNATIVES);

        let base = unit.score_match(&context.required_capabilities, &context.context_tags);
        let performance = self.get_average_performance(unit.name());
        let reason = format!("Adaptive best match (base: {base:.3}, perf: {performance:.3})");

        let decision = RoutingDecision::selected(context, RoutingStrategy::BestMatch, unit, score, reason, scored);
        self.base.record(decision)
    }
}

impl TaskRouter for AdaptiveRouter {
    fn route(&mut self, context: RoutingContext) -> RoutingDecision {
        let strategy = self.base.default_strategy();
        AdaptiveRouter::route_with(self, context, strategy)
    }

    fn route_with(&mut self, context: RoutingContext, strategy: RoutingStrategy) -> RoutingDecision {
        AdaptiveRouter::route_with(self, context, strategy)
    }

    fn get_routing_stats(&self) -> RoutingStats {
        self.base.get_routing_stats()
    }

    fn clear_history(&mut self) {
        self.base.clear_history()
    }

    fn as_adaptive_mut(&mut self) -> Option<&mut AdaptiveRouter> {
        Some(self)
    }
}
