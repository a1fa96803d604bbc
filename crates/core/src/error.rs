//! Shared error types.

/// Errors raised by the shared contracts.
#[derive(Debug, thiserror::Error)]
pub enum CapflowError {
    /// A capability name outside the closed set
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    /// A routing strategy name that is not recognized
    #[error("Unknown routing strategy: {0}")]
    UnknownStrategy(String),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias for the shared contracts.
pub type Result<T> = std::result::Result<T, CapflowError>;
