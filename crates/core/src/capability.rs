//! The closed set of capabilities a unit can advertise.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::CapflowError;

/// A skill an executable unit advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Produce new code from requirements
    CodeGeneration,
    /// Detect compilation or static errors
    ErrorChecking,
    /// Review existing code
    CodeReview,
    /// Restructure code without changing behavior
    Refactoring,
    /// Write or run tests
    Testing,
    /// Produce documentation
    Documentation,
    /// Locate and explain defects
    Debugging,
    /// Improve performance characteristics
    Optimization,
}

impl Capability {
    /// Every capability, in declaration order.
    pub const ALL: [Capability; 8] = [
        Capability::CodeGeneration,
        Capability::ErrorChecking,
        Capability::CodeReview,
        Capability::Refactoring,
        Capability::Testing,
        Capability::Documentation,
        Capability::Debugging,
        Capability::Optimization,
    ];

    /// The snake_case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::CodeGeneration => "code_generation",
            Capability::ErrorChecking => "error_checking",
            Capability::CodeReview => "code_review",
            Capability::Refactoring => "refactoring",
            Capability::Testing => "testing",
            Capability::Documentation => "documentation",
            Capability::Debugging => "debugging",
            Capability::Optimization => "optimization",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = CapflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Capability::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| CapflowError::UnknownCapability(s.to_string()))
    }
}
