//! Scoped capacity reservation.

use crate::CapabilityRegistry;

/// A reserved execution slot on a registered unit.
///
/// Obtained from [`CapabilityRegistry::acquire_slot`]. The slot is released
/// when the guard is dropped, on every exit path.
#[must_use = "the slot is released as soon as the guard is dropped"]
pub struct ExecutionSlot<'a> {
    registry: &'a CapabilityRegistry,
    name: String,
}

impl<'a> ExecutionSlot<'a> {
    pub(crate) fn new(registry: &'a CapabilityRegistry, name: String) -> Self {
        Self { registry, name }
    }

    /// Name of the unit the slot belongs to.
    pub fn unit_name(&self) -> &str {
        &self.name
    }
}

impl Drop for ExecutionSlot<'_> {
    fn drop(&mut self) {
        self.registry.decrement_active(&self.name);
    }
}

impl std::fmt::Debug for ExecutionSlot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionSlot").field("unit", &self.name).finish()
    }
}
