//! Strategy-based router.

use capflow_registry::{CapabilityRegistry, Registration};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{AdaptiveRouter, RoutingContext, RoutingDecision, RoutingStats, RoutingStrategy};

/// Maximum number of runners-up kept on a decision.
pub(crate) const MAX_ALTERNATIVES: usize = 5;

/// Load normalization floor for least-loaded scoring.
const LOAD_SCALE_FLOOR: usize = 100;

/// Selects a unit for a routing context.
///
/// Implementations keep routing history and are driven by a single caller;
/// they are not internally synchronized.
pub trait TaskRouter: Send + Sync {
    /// Route with the router's default strategy.
    fn route(&mut self, context: RoutingContext) -> RoutingDecision;

    /// Route with an explicit strategy.
    fn route_with(&mut self, context: RoutingContext, strategy: RoutingStrategy) -> RoutingDecision;

    /// Statistics over recorded decisions.
    fn get_routing_stats(&self) -> RoutingStats;

    /// Forget recorded decisions.
    fn clear_history(&mut self);

    /// Access the adaptive router, for performance feedback.
    fn as_adaptive_mut(&mut self) -> Option<&mut AdaptiveRouter> {
        None
    }
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Strategy used by [`TaskRouter::route`]
    pub default_strategy: RoutingStrategy,
    /// Decisions retained in history; older ones are evicted
    pub history_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_strategy: RoutingStrategy::BestMatch,
            history_capacity: 1000,
        }
    }
}

/// Running totals, kept independently of the bounded history.
#[derive(Debug, Default)]
struct Totals {
    decisions: usize,
    successful: usize,
    score_sum: f64,
    per_unit: BTreeMap<String, usize>,
}

/// Router implementing the fixed [`RoutingStrategy`] set.
pub struct Router {
    registry: Arc<CapabilityRegistry>,
    config: RouterConfig,
    history: VecDeque<RoutingDecision>,
    totals: Totals,
    round_robin_cursor: usize,
}

impl Router {
    /// Create a router over a registry.
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            config: RouterConfig::default(),
            history: VecDeque::new(),
            totals: Totals::default(),
            round_robin_cursor: 0,
        }
    }

    /// Set the configuration.
    pub fn with_config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default strategy.
    pub fn with_strategy(mut self, strategy: RoutingStrategy) -> Self {
        self.config.default_strategy = strategy;
        self
    }

    /// The registry routed against.
    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// Default strategy.
    pub fn default_strategy(&self) -> RoutingStrategy {
        self.config.default_strategy
    }

    /// Retained decisions, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &RoutingDecision> {
        self.history.iter()
    }

    /// Route a task using `strategy`.
    pub fn route_with(&mut self, context: RoutingContext, strategy: RoutingStrategy) -> RoutingDecision {
        info!(task_type = %context.task_type, strategy = %strategy, "Routing task");
        debug!(required = ?context.required_capabilities, exclude = ?context.exclude_units, "Routing requirements");

        let decision = match strategy {
            RoutingStrategy::BestMatch => best_match(&self.registry, context),
            RoutingStrategy::RoundRobin => {
                let candidates = self.capable_units(&context);
                let decision = round_robin(candidates, self.round_robin_cursor, context);
                if decision.is_match() {
                    self.round_robin_cursor += 1;
                }
                decision
            }
            RoutingStrategy::LeastLoaded => {
                let candidates = self.capable_units(&context);
                least_loaded(candidates, context)
            }
            RoutingStrategy::Priority => {
                let candidates = self.capable_units(&context);
                by_priority(candidates, context)
            }
        };

        self.record(decision)
    }

    /// Units able to take the context right now, ordered by name.
    pub(crate) fn capable_units(&self, context: &RoutingContext) -> Vec<Registration> {
        self.registry
            .capable_units(&context.required_capabilities, &context.exclude_units)
    }

    /// Append a decision to history and totals, returning it.
    pub(crate) fn record(&mut self, decision: RoutingDecision) -> RoutingDecision {
        match decision.selected_name() {
            Some(name) => {
                info!(unit = %name, score = decision.score, "Selected unit");
                self.totals.successful += 1;
                self.totals.score_sum += decision.score;
                *self.totals.per_unit.entry(name.to_string()).or_default() += 1;
            }
            None => {
                warn!(task_type = %decision.context.task_type, reason = %decision.reason, "No suitable unit found");
            }
        }
        self.totals.decisions += 1;

        if self.config.history_capacity > 0 {
            while self.history.len() >= self.config.history_capacity {
                self.history.pop_front();
            }
            self.history.push_back(decision.clone());
        }
        decision
    }

    /// Routing statistics.
    pub fn get_routing_stats(&self) -> RoutingStats {
        let t = &self.totals;
        RoutingStats {
            total_decisions: t.decisions,
            successful_routes: t.successful,
            failed_routes: t.decisions - t.successful,
            success_rate: if t.decisions > 0 { t.successful as f64 / t.decisions as f64 } else { 0.0 },
            average_score: if t.successful > 0 { t.score_sum / t.successful as f64 } else { 0.0 },
            routes_per_unit: t.per_unit.clone(),
            round_robin_cursor: self.round_robin_cursor,
        }
    }

    /// Clear history and statistics. The round-robin cursor is kept.
    pub fn clear_history(&mut self) {
        self.history.clear();
        self.totals = Totals::default();
        info!("Routing history cleared");
    }
}

impl TaskRouter for Router {
    fn route(&mut self, context: RoutingContext) -> RoutingDecision {
        let strategy = self.config.default_strategy;
        self.route_with(context, strategy)
    }

    fn route_with(&mut self, context: RoutingContext, strategy: RoutingStrategy) -> RoutingDecision {
        Router::route_with(self, context, strategy)
    }

    fn get_routing_stats(&self) -> RoutingStats {
        Router::get_routing_stats(self)
    }

    fn clear_history(&mut self) {
        Router::clear_history(self)
    }
}

fn best_match(registry: &CapabilityRegistry, context: RoutingContext) -> RoutingDecision {
    let mut scored = registry.scored_candidates(
        &context.required_capabilities,
        &context.context_tags,
        &context.exclude_units,
    );
    if scored.is_empty() {
        return RoutingDecision::no_match(
            context,
            RoutingStrategy::BestMatch,
            "No unit found matching required capabilities",
        );
    }

    let (unit, score) = scored.remove(0);
    scored.truncate(MAX_ALTERNATIVES);
    RoutingDecision::selected(
        context,
        RoutingStrategy::BestMatch,
        unit,
        score,
        "Best match based on capability and context scoring",
        scored,
    )
}

fn round_robin(candidates: Vec<Registration>, cursor: usize, context: RoutingContext) -> RoutingDecision {
    if candidates.is_empty() {
        return RoutingDecision::no_match(context, RoutingStrategy::RoundRobin, "No capable units available");
    }

    let index = cursor % candidates.len();
    let unit = candidates[index].clone();
    let alternatives = candidates
        .into_iter()
        .enumerate()
        .filter(|(i, _)| *i != index)
        .map(|(_, reg)| (reg, 0.5))
        .collect();

    RoutingDecision::selected(
        context,
        RoutingStrategy::RoundRobin,
        unit,
        0.5,
        format!("Round-robin selection (index: {cursor})"),
        alternatives,
    )
}

fn load_score(reg: &Registration) -> f64 {
    1.0 - reg.active_executions as f64 / reg.metadata.max_concurrency.max(LOAD_SCALE_FLOOR) as f64
}

fn least_loaded(mut candidates: Vec<Registration>, context: RoutingContext) -> RoutingDecision {
    if candidates.is_empty() {
        return RoutingDecision::no_match(context, RoutingStrategy::LeastLoaded, "No capable units available");
    }

    candidates.sort_by(|a, b| {
        a.active_executions
            .cmp(&b.active_executions)
            .then_with(|| b.metadata.priority.cmp(&a.metadata.priority))
    });

    let unit = candidates.remove(0);
    let score = load_score(&unit);
    let alternatives = candidates
        .into_iter()
        .take(MAX_ALTERNATIVES)
        .map(|reg| {
            let s = load_score(&reg);
            (reg, s)
        })
        .collect();
    let reason = format!("Least loaded ({} active executions)", unit.active_executions);

    RoutingDecision::selected(context, RoutingStrategy::LeastLoaded, unit, score, reason, alternatives)
}

fn priority_score(reg: &Registration) -> f64 {
    (reg.metadata.priority as f64 / 100.0).clamp(0.0, 1.0)
}

fn by_priority(mut candidates: Vec<Registration>, context: RoutingContext) -> RoutingDecision {
    if candidates.is_empty() {
        return RoutingDecision::no_match(context, RoutingStrategy::Priority, "No capable units available");
    }

    candidates.sort_by(|a, b| b.metadata.priority.cmp(&a.metadata.priority));

    let unit = candidates.remove(0);
    let score = priority_score(&unit);
    let alternatives = candidates
        .into_iter()
        .take(MAX_ALTERNATIVES)
        .map(|reg| {
            let s = priority_score(&reg);
            (reg, s)
        })
        .collect();
    let reason = format!("Highest priority ({})", unit.metadata.priority);

    RoutingDecision::selected(context, RoutingStrategy::Priority, unit, score, reason, alternatives)
}
