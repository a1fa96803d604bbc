//! Units assembled from metadata and an async closure.

use crate::UnitDefinition;
use async_trait::async_trait;
use capflow_core::{Unit, UnitBuilder, UnitMetadata, UnitState};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by a [`FnUnit`] body.
pub type UnitFuture = Pin<Box<dyn Future<Output = Result<UnitState, anyhow::Error>> + Send>>;

type Body = Arc<dyn Fn(UnitState) -> UnitFuture + Send + Sync>;

/// A unit whose behavior is a closure.
///
/// ```ignore
/// let unit = FnUnit::new(
///     UnitMetadata::new("echo", "Echo input").capability(Capability::Documentation),
///     |mut state| async move {
///         let input = state.input_data.clone();
///         state.mark_completed(Some(input));
///         Ok(state)
///     },
/// );
/// register_unit(&registry, unit)?;
/// ```
#[derive(Clone)]
pub struct FnUnit {
    metadata: UnitMetadata,
    body: Body,
}

impl FnUnit {
    /// Create a unit from metadata and a body.
    pub fn new<F, Fut>(metadata: UnitMetadata, body: F) -> Self
    where
        F: Fn(UnitState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<UnitState, anyhow::Error>> + Send + 'static,
    {
        Self {
            metadata,
            body: Arc::new(move |state| Box::pin(body(state))),
        }
    }
}

impl std::fmt::Debug for FnUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnUnit").field("name", &self.metadata.name).finish_non_exhaustive()
    }
}

#[async_trait]
impl Unit for FnUnit {
    async fn run(&self, state: UnitState) -> Result<UnitState, anyhow::Error> {
        (self.body)(state).await
    }
}

impl UnitBuilder for FnUnit {
    fn instantiate(&self) -> Box<dyn Unit> {
        Box::new(self.clone())
    }
}

impl UnitDefinition for FnUnit {
    fn metadata(&self) -> UnitMetadata {
        self.metadata.clone()
    }
}
