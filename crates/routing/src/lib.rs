//! Routing layer - selects a registered unit for a task.
//!
//! [`Router`] implements the fixed strategies in [`RoutingStrategy`];
//! [`AdaptiveRouter`] blends recorded execution performance into
//! best-match scoring. Both sit behind the [`TaskRouter`] trait.

#![warn(missing_docs)]

mod adaptive;
mod context;
mod router;
mod stats;
mod strategy;

pub use adaptive::{AdaptiveRouter, PERFORMANCE_WINDOW};
pub use context::{RoutingContext, RoutingDecision};
pub use router::{Router, RouterConfig, TaskRouter};
pub use stats::RoutingStats;
pub use strategy::RoutingStrategy;

#[cfg(test)]
mod testing;
