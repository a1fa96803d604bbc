//! Routing strategies.

use capflow_core::CapflowError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Strategy used to pick a unit among the capable ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Highest match score, ties broken by priority
    #[default]
    BestMatch,
    /// Rotate through capable units
    RoundRobin,
    /// Fewest active executions, ties broken by priority
    LeastLoaded,
    /// Highest priority only
    Priority,
}

impl RoutingStrategy {
    /// The snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingStrategy::BestMatch => "best_match",
            RoutingStrategy::RoundRobin => "round_robin",
            RoutingStrategy::LeastLoaded => "least_loaded",
            RoutingStrategy::Priority => "priority",
        }
    }
}

impl std::fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoutingStrategy {
    type Err = CapflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "best_match" => Ok(RoutingStrategy::BestMatch),
            "round_robin" => Ok(RoutingStrategy::RoundRobin),
            "least_loaded" => Ok(RoutingStrategy::LeastLoaded),
            "priority" => Ok(RoutingStrategy::Priority),
            _ => Err(CapflowError::UnknownStrategy(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strategy() {
        assert_eq!("best_match".parse::<RoutingStrategy>().unwrap(), RoutingStrategy::BestMatch);
        assert_eq!("round-robin".parse::<RoutingStrategy>().unwrap(), RoutingStrategy::RoundRobin);
        assert_eq!("LEAST_LOADED".parse::<RoutingStrategy>().unwrap(), RoutingStrategy::LeastLoaded);
        assert!("random".parse::<RoutingStrategy>().is_err());
    }

    #[test]
    fn test_default_is_best_match() {
        assert_eq!(RoutingStrategy::default(), RoutingStrategy::BestMatch);
    }
}
