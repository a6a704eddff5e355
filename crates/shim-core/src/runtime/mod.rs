//! Runtime side of the interception layer.
//!
//! Rewritten code calls into a [`MockRegistry`] through the hooks; tests use
//! the same registry to install and restore overrides.

pub mod behavior;
pub mod constants;
pub mod dispatch;
pub mod generator;
pub mod registry;
pub mod units;
pub mod value;


use std::sync::OnceLock;

pub use behavior::{
    Behavior, Binding, CallSite, InterceptionId, Invocation, OverrideEntry, PointKind,
    Replacement, ReplacementSource,
};
pub use constants::{ConstantAccess, ConstantError, ConstantResolver};
pub use generator::{ByValue, HostGenerator, IterGenerator, Yielded};
pub use registry::{HookOutcome, MockRegistry, RegistryError};
pub use units::UnitTable;
pub use value::{ObjectRef, Value, ValueError};

static GLOBAL: OnceLock<MockRegistry> = OnceLock::new();

/// Create the process-wide registry, owned by the calling thread.
/// Later calls return the existing registry.
pub fn init_global() -> &'static MockRegistry {
    GLOBAL.get_or_init(MockRegistry::new)
}

/// The process-wide registry, once [`init_global`] has run
pub fn global() -> Result<&'static MockRegistry, RegistryError> {
    GLOBAL.get().ok_or(RegistryError::Uninitialized)
}
