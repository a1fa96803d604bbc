//! Test fixtures shared by the routing tests.

use async_trait::async_trait;
use capflow_core::{Capability, Unit, UnitBuilder, UnitMetadata, UnitState};
use capflow_registry::CapabilityRegistry;
use std::sync::Arc;

struct Noop;

#[async_trait]
impl Unit for Noop {
    async fn run(&self, mut state: UnitState) -> anyhow::Result<UnitState> {
        state.mark_completed(None);
        Ok(state)
    }
}

pub struct NoopBuilder;

impl UnitBuilder for NoopBuilder {
    fn instantiate(&self) -> Box<dyn Unit> {
        Box::new(Noop)
    }
}

pub fn meta(name: &str, caps: &[Capability], tags: &[&str], priority: i32) -> UnitMetadata {
    let mut m = UnitMetadata::new(name, format!("{name} unit")).priority(priority);
    for c in caps {
        m = m.capability(*c);
    }
    for t in tags {
        m = m.tag(*t);
    }
    m
}

/// Two code generators and an error checker.
pub fn populated() -> Arc<CapabilityRegistry> {
    let registry = Arc::new(CapabilityRegistry::new());
    registry
        .register(meta("basic_codegen", &[Capability::CodeGeneration], &["java"], 30), NoopBuilder)
        .unwrap();
    registry
        .register(
            meta(
                "advanced_codegen",
                &[Capability::CodeGeneration, Capability::ErrorChecking],
                &["java", "python"],
                70,
            ),
            NoopBuilder,
        )
        .unwrap();
    registry
        .register(meta("error_checker", &[Capability::ErrorChecking], &["java"], 50), NoopBuilder)
        .unwrap();
    registry
}
