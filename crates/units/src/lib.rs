//! Ready-made units and a closure-based unit template.

mod builtin;
mod template;

pub use builtin::*;
pub use template::{FnUnit, UnitFuture};

use capflow_core::{UnitBuilder, UnitMetadata};
use capflow_registry::{CapabilityRegistry, Result};

/// A unit that knows its own metadata.
pub trait UnitDefinition: UnitBuilder {
    /// Metadata the unit registers under.
    fn metadata(&self) -> UnitMetadata;
}

/// Register a self-describing unit.
pub fn register_unit<D>(registry: &CapabilityRegistry, unit: D) -> Result<()>
where
    D: UnitDefinition + 'static,
{
    registry.register(unit.metadata(), unit)
}

/// Register the code generation, error checking and refactoring units.
pub fn register_defaults(registry: &CapabilityRegistry) -> Result<()> {
    register_unit(registry, CodeGenerationUnit::default())?;
    register_unit(registry, ErrorCheckingUnit::default())?;
    register_unit(registry, RefactoringUnit::default())?;
    Ok(())
}
