//! The capability registry.

use capflow_core::{Capability, Time, Unit, UnitBuilder, UnitMetadata};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::{ExecutionSlot, RegistryStats, UnitSnapshot};

/// Result alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur during registry operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A unit with this name is already registered
    #[error("Unit '{0}' already registered")]
    DuplicateName(String),
}

/// A registered unit: metadata, builder and live execution counter.
///
/// Values handed out by the registry are snapshots; `active_executions`
/// reflects the counter at the time of the lookup.
#[derive(Clone)]
pub struct Registration {
    /// Unit metadata
    pub metadata: Arc<UnitMetadata>,

    /// Registration timestamp
    pub registered_at: Time,

    /// Executions currently holding a slot
    pub active_executions: usize,

    builder: Arc<dyn UnitBuilder>,
}

impl Registration {
    fn new(metadata: UnitMetadata, builder: Arc<dyn UnitBuilder>) -> Self {
        Self {
            metadata: Arc::new(metadata),
            registered_at: chrono::Utc::now(),
            active_executions: 0,
            builder,
        }
    }

    /// Unit name.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Whether another execution would be admitted.
    pub fn can_execute(&self) -> bool {
        self.metadata.max_concurrency == 0 || self.active_executions < self.metadata.max_concurrency
    }

    /// Create a fresh runnable instance.
    pub fn instantiate(&self) -> Box<dyn Unit> {
        self.builder.instantiate()
    }

    /// Score this unit against requirements, see [`UnitMetadata::score_match`].
    pub fn score_match(&self, required: &BTreeSet<Capability>, context_tags: &BTreeSet<String>) -> f64 {
        self.metadata.score_match(required, context_tags)
    }

    fn snapshot(&self) -> UnitSnapshot {
        UnitSnapshot {
            name: self.metadata.name.clone(),
            capabilities: self.metadata.capabilities.iter().copied().collect(),
            active_executions: self.active_executions,
            max_concurrency: self.metadata.max_concurrency,
            can_execute: self.can_execute(),
        }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.metadata.name)
            .field("priority", &self.metadata.priority)
            .field("active_executions", &self.active_executions)
            .field("registered_at", &self.registered_at)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct Inner {
    units: BTreeMap<String, Registration>,
    by_capability: HashMap<Capability, BTreeSet<String>>,
    by_tag: HashMap<String, BTreeSet<String>>,
}

impl Inner {
    fn resolve<'a>(&'a self, names: impl IntoIterator<Item = &'a String>) -> Vec<Registration> {
        names
            .into_iter()
            .filter_map(|name| self.units.get(name).cloned())
            .collect()
    }
}

/// Thread-safe registry of executable units.
///
/// Every lookup and mutation goes through a single lock. Methods never
/// call each other while holding it.
#[derive(Default)]
pub struct CapabilityRegistry {
    inner: Mutex<Inner>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a unit.
    pub fn register<B>(&self, metadata: UnitMetadata, builder: B) -> Result<()>
    where
        B: UnitBuilder + 'static,
    {
        self.register_shared(metadata, Arc::new(builder))
    }

    /// Register a unit with an already shared builder.
    pub fn register_shared(&self, metadata: UnitMetadata, builder: Arc<dyn UnitBuilder>) -> Result<()> {
        let mut inner = self.lock();
        let name = metadata.name.clone();

        if inner.units.contains_key(&name) {
            warn!(unit = %name, "Rejected duplicate registration");
            return Err(RegistryError::DuplicateName(name));
        }

        for capability in &metadata.capabilities {
            inner.by_capability.entry(*capability).or_default().insert(name.clone());
        }
        for tag in &metadata.tags {
            inner.by_tag.entry(tag.clone()).or_default().insert(name.clone());
        }

        info!(
            unit = %name,
            capabilities = ?metadata.capabilities,
            priority = metadata.priority,
            "Registered unit"
        );
        inner.units.insert(name, Registration::new(metadata, builder));
        Ok(())
    }

    /// Remove a unit. Returns false if it was not registered.
    pub fn deregister(&self, name: &str) -> bool {
        let mut inner = self.lock();
        let Some(registration) = inner.units.remove(name) else {
            return false;
        };

        for capability in &registration.metadata.capabilities {
            if let Some(names) = inner.by_capability.get_mut(capability) {
                names.remove(name);
                if names.is_empty() {
                    inner.by_capability.remove(capability);
                }
            }
        }
        for tag in &registration.metadata.tags {
            if let Some(names) = inner.by_tag.get_mut(tag) {
                names.remove(name);
                if names.is_empty() {
                    inner.by_tag.remove(tag);
                }
            }
        }

        info!(unit = %name, "Deregistered unit");
        true
    }

    /// Get a unit by name.
    pub fn get(&self, name: &str) -> Option<Registration> {
        self.lock().units.get(name).cloned()
    }

    /// List all units, ordered by name.
    pub fn list_all(&self) -> Vec<Registration> {
        self.lock().units.values().cloned().collect()
    }

    /// Number of registered units.
    pub fn len(&self) -> usize {
        self.lock().units.len()
    }

    /// Whether no unit is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().units.is_empty()
    }

    /// Find units advertising a capability.
    pub fn find_by_capability(&self, capability: Capability) -> Vec<Registration> {
        let inner = self.lock();
        match inner.by_capability.get(&capability) {
            Some(names) => inner.resolve(names),
            None => Vec::new(),
        }
    }

    /// Find units carrying every one of `tags`.
    ///
    /// An empty `tags` set matches nothing.
    pub fn find_by_tags(&self, tags: &BTreeSet<String>) -> Vec<Registration> {
        let inner = self.lock();
        let mut matching: Option<BTreeSet<String>> = None;

        for tag in tags {
            let names = inner.by_tag.get(tag).cloned().unwrap_or_default();
            matching = Some(match matching {
                None => names,
                Some(current) => current.intersection(&names).cloned().collect(),
            });
        }

        match matching {
            Some(names) => inner.resolve(&names),
            None => Vec::new(),
        }
    }

    /// Units that meet `required`, are not excluded and can accept work.
    /// Ordered by name.
    pub fn capable_units(&self, required: &BTreeSet<Capability>, exclude: &BTreeSet<String>) -> Vec<Registration> {
        self.lock()
            .units
            .values()
            .filter(|reg| {
                !exclude.contains(reg.name())
                    && required.is_subset(&reg.metadata.capabilities)
                    && reg.can_execute()
            })
            .cloned()
            .collect()
    }

    /// Score every admissible unit and keep the positive scores, best first.
    ///
    /// Ties on score are broken by higher priority, then by name.
    pub fn scored_candidates(
        &self,
        required: &BTreeSet<Capability>,
        context_tags: &BTreeSet<String>,
        exclude: &BTreeSet<String>,
    ) -> Vec<(Registration, f64)> {
        let inner = self.lock();
        let mut scored: Vec<(Registration, f64)> = inner
            .units
            .values()
            .filter(|reg| !exclude.contains(reg.name()) && reg.can_execute())
            .map(|reg| (reg.clone(), reg.score_match(required, context_tags)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        drop(inner);

        rank_candidates(&mut scored);
        scored
    }

    /// Best admissible unit for the requirements, if any scores above zero.
    pub fn find_best_match(
        &self,
        required: &BTreeSet<Capability>,
        context_tags: &BTreeSet<String>,
        exclude: &BTreeSet<String>,
    ) -> Option<Registration> {
        let best = self
            .scored_candidates(required, context_tags, exclude)
            .into_iter()
            .next()
            .map(|(reg, _)| reg);

        if let Some(reg) = &best {
            debug!(unit = %reg.name(), "Best match found");
        }
        best
    }

    /// Reserve an execution slot. Fails if unknown or at capacity.
    pub fn increment_active(&self, name: &str) -> bool {
        let mut inner = self.lock();
        let Some(reg) = inner.units.get_mut(name) else {
            return false;
        };
        if !reg.can_execute() {
            debug!(unit = %name, active = reg.active_executions, "Unit at capacity");
            return false;
        }
        reg.active_executions += 1;
        true
    }

    /// Release an execution slot. Never goes below zero; false if unknown.
    pub fn decrement_active(&self, name: &str) -> bool {
        let mut inner = self.lock();
        let Some(reg) = inner.units.get_mut(name) else {
            return false;
        };
        reg.active_executions = reg.active_executions.saturating_sub(1);
        true
    }

    /// Reserve a slot released automatically when the guard drops.
    pub fn acquire_slot(&self, name: &str) -> Option<ExecutionSlot<'_>> {
        self.increment_active(name)
            .then(|| ExecutionSlot::new(self, name.to_string()))
    }

    /// Registry statistics.
    pub fn get_stats(&self) -> RegistryStats {
        let inner = self.lock();
        RegistryStats {
            total_units: inner.units.len(),
            capabilities: inner
                .by_capability
                .iter()
                .map(|(cap, names)| (*cap, names.len()))
                .collect(),
            total_active_executions: inner.units.values().map(|r| r.active_executions).sum(),
            units: inner.units.values().map(Registration::snapshot).collect(),
        }
    }
}

/// Sort scored candidates best first: higher score, then higher priority,
/// then name.
pub fn rank_candidates(scored: &mut [(Registration, f64)]) {
    scored.sort_by(|(a, score_a), (b, score_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.metadata.priority.cmp(&a.metadata.priority))
            .then_with(|| a.name().cmp(b.name()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use capflow_core::UnitState;

    struct Noop;

    #[async_trait]
    impl Unit for Noop {
        async fn run(&self, mut state: UnitState) -> anyhow::Result<UnitState> {
            state.mark_completed(None);
            Ok(state)
        }
    }

    struct NoopBuilder;

    impl UnitBuilder for NoopBuilder {
        fn instantiate(&self) -> Box<dyn Unit> {
            Box::new(Noop)
        }
    }

    fn meta(name: &str, caps: &[Capability], tags: &[&str], priority: i32) -> UnitMetadata {
        let mut m = UnitMetadata::new(name, format!("{name} unit")).priority(priority);
        for c in caps {
            m = m.capability(*c);
        }
        for t in tags {
            m = m.tag(*t);
        }
        m
    }

    fn caps(list: &[Capability]) -> BTreeSet<Capability> {
        list.iter().copied().collect()
    }

    fn set(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn names(regs: &[Registration]) -> BTreeSet<String> {
        regs.iter().map(|r| r.name().to_string()).collect()
    }

    fn populated() -> CapabilityRegistry {
        let registry = CapabilityRegistry::new();
        registry
            .register(meta("codegen", &[Capability::CodeGeneration], &["java", "python"], 50), NoopBuilder)
            .unwrap();
        registry
            .register(
                meta("checker", &[Capability::ErrorChecking, Capability::Debugging], &["java"], 70),
                NoopBuilder,
            )
            .unwrap();
        registry
            .register(
                meta("refactorer", &[Capability::Refactoring, Capability::Optimization], &["python"], 40),
                NoopBuilder,
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_register_and_get() {
        let registry = populated();
        assert_eq!(registry.len(), 3);

        let reg = registry.get("codegen").unwrap();
        assert_eq!(reg.metadata.priority, 50);
        assert_eq!(reg.active_executions, 0);
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_register_duplicate_fails() {
        let registry = populated();
        let err = registry
            .register(meta("codegen", &[Capability::Testing], &[], 0), NoopBuilder)
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateName("codegen".to_string()));
        // original registration untouched
        assert!(registry.get("codegen").unwrap().metadata.matches_capability(Capability::CodeGeneration));
    }

    #[test]
    fn test_deregister_prunes_indices() {
        let registry = populated();
        assert!(registry.deregister("checker"));
        assert!(!registry.deregister("checker"));

        assert!(registry.get("checker").is_none());
        assert!(registry.find_by_capability(Capability::ErrorChecking).is_empty());
        assert_eq!(names(&registry.find_by_tags(&set(&["java"]))), set(&["codegen"]));
        assert!(!registry.get_stats().capabilities.contains_key(&Capability::Debugging));
    }

    #[test]
    fn test_find_by_capability_matches_exactly() {
        let registry = populated();
        for cap in Capability::ALL {
            let expected: BTreeSet<String> = registry
                .list_all()
                .into_iter()
                .filter(|r| r.metadata.matches_capability(cap))
                .map(|r| r.name().to_string())
                .collect();
            assert_eq!(names(&registry.find_by_capability(cap)), expected, "capability {cap}");
        }
    }

    #[test]
    fn test_find_by_tags_intersects() {
        let registry = populated();
        assert_eq!(names(&registry.find_by_tags(&set(&["java"]))), set(&["checker", "codegen"]));
        assert_eq!(names(&registry.find_by_tags(&set(&["java", "python"]))), set(&["codegen"]));
        assert!(registry.find_by_tags(&set(&["go"])).is_empty());
        assert!(registry.find_by_tags(&BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_find_best_match_prefers_priority() {
        let registry = CapabilityRegistry::new();
        registry.register(meta("a", &[Capability::CodeGeneration], &[], 30), NoopBuilder).unwrap();
        registry
            .register(meta("b", &[Capability::CodeGeneration, Capability::CodeReview], &[], 80), NoopBuilder)
            .unwrap();

        let best = registry
            .find_best_match(&caps(&[Capability::CodeGeneration]), &BTreeSet::new(), &BTreeSet::new())
            .unwrap();
        assert_eq!(best.name(), "b");
    }

    #[test]
    fn test_find_best_match_tie_broken_by_priority() {
        let registry = CapabilityRegistry::new();
        // both bonuses capped at 0.3, so scores tie
        registry.register(meta("low", &[Capability::Testing], &[], 40), NoopBuilder).unwrap();
        registry.register(meta("high", &[Capability::Testing], &[], 90), NoopBuilder).unwrap();

        let best = registry
            .find_best_match(&caps(&[Capability::Testing]), &BTreeSet::new(), &BTreeSet::new())
            .unwrap();
        assert_eq!(best.name(), "high");
    }

    #[test]
    fn test_find_best_match_respects_exclusions_and_capacity() {
        let registry = CapabilityRegistry::new();
        registry
            .register(meta("busy", &[Capability::Testing], &[], 90).max_concurrency(1), NoopBuilder)
            .unwrap();
        registry.register(meta("excluded", &[Capability::Testing], &[], 80), NoopBuilder).unwrap();
        registry.register(meta("spare", &[Capability::Testing], &[], 10), NoopBuilder).unwrap();

        assert!(registry.increment_active("busy"));
        let best = registry
            .find_best_match(&caps(&[Capability::Testing]), &BTreeSet::new(), &set(&["excluded"]))
            .unwrap();
        assert_eq!(best.name(), "spare");

        let none = registry.find_best_match(
            &caps(&[Capability::Testing]),
            &BTreeSet::new(),
            &set(&["excluded", "spare"]),
        );
        assert!(none.is_none());
    }

    #[test]
    fn test_find_best_match_none_without_capability() {
        let registry = populated();
        let best = registry.find_best_match(&caps(&[Capability::Documentation]), &BTreeSet::new(), &BTreeSet::new());
        assert!(best.is_none());
    }

    #[test]
    fn test_concurrency_limit() {
        let registry = CapabilityRegistry::new();
        registry
            .register(meta("c", &[Capability::Testing], &[], 0).max_concurrency(2), NoopBuilder)
            .unwrap();

        assert!(registry.increment_active("c"));
        assert!(registry.increment_active("c"));
        assert!(!registry.increment_active("c"));
        assert_eq!(registry.get("c").unwrap().active_executions, 2);

        assert!(registry.decrement_active("c"));
        assert!(registry.increment_active("c"));
    }

    #[test]
    fn test_decrement_floors_at_zero() {
        let registry = populated();
        assert!(registry.decrement_active("codegen"));
        assert_eq!(registry.get("codegen").unwrap().active_executions, 0);
        assert!(!registry.decrement_active("missing"));
        assert!(!registry.increment_active("missing"));
    }

    #[test]
    fn test_slot_released_on_drop() {
        let registry = CapabilityRegistry::new();
        registry
            .register(meta("c", &[Capability::Testing], &[], 0).max_concurrency(1), NoopBuilder)
            .unwrap();

        {
            let slot = registry.acquire_slot("c").unwrap();
            assert_eq!(slot.unit_name(), "c");
            assert!(registry.acquire_slot("c").is_none());
        }
        assert_eq!(registry.get("c").unwrap().active_executions, 0);
        assert!(registry.acquire_slot("c").is_some());
    }

    #[test]
    fn test_slot_released_on_panic() {
        let registry = CapabilityRegistry::new();
        registry.register(meta("c", &[Capability::Testing], &[], 0), NoopBuilder).unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _slot = registry.acquire_slot("c").unwrap();
            panic!("unit blew up");
        }));
        assert!(result.is_err());
        assert_eq!(registry.get("c").unwrap().active_executions, 0);
    }

    #[test]
    fn test_stats() {
        let registry = populated();
        registry.increment_active("codegen");

        let stats = registry.get_stats();
        assert_eq!(stats.total_units, 3);
        assert_eq!(stats.total_active_executions, 1);
        assert_eq!(stats.capabilities.get(&Capability::ErrorChecking), Some(&1));
        assert_eq!(stats.units.len(), 3);
        let codegen = stats.units.iter().find(|u| u.name == "codegen").unwrap();
        assert_eq!(codegen.active_executions, 1);
        assert!(codegen.can_execute);
    }
}
