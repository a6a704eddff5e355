//! # Shim Core
//!
//! Source-rewriting interception layer, including:
//! - Host dialect AST, parser and printer behind the [`bridge::AstBridge`] seam
//! - Rewriter inserting interception points into functions, methods,
//!   constructors, generators, class-constant fetches and `exit`
//! - Mock registry holding the overrides rewritten code consults at runtime
//! - Content-addressed cache of rewritten units
//! - File resolution and the loader pipeline tying these together
//!
//! The `shim-cli` crate drives the loader from the command line; test
//! harnesses embed [`runtime::MockRegistry`] directly.

#![warn(clippy::all)]

pub mod ast;
pub mod bridge;
pub mod cache;
pub mod config;
pub mod hooks;
pub mod loader;
pub mod parser;
pub mod records;
pub mod resolver;
pub mod rewrite;
pub mod runtime;

// Re-export commonly used types
pub use ast::{HostAst, Scope, ToSource, UnitMember, Visibility};
pub use bridge::{AstBridge, HostBridge};
pub use cache::{CacheEntry, CacheError, CacheStats, RewriteCache};
pub use config::{ConfigError, ShimConfig};
pub use hooks::Hook;
pub use loader::{LoadError, LoadedUnit, Loader};
pub use parser::{create_parser, ParseError, Parser};
pub use records::{CallableKind, ModuleRecord, UnitRecord};
pub use resolver::{FileResolver, Resolved};
pub use rewrite::{RewriteError, RewriteOutput, Rewriter};
pub use runtime::{
    Behavior, CallSite, ConstantAccess, ConstantError, InterceptionId, MockRegistry,
    RegistryError, Replacement, Value,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Version of the rewrite output format. Cached units written under any
/// other version are discarded.
pub const ENGINE_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "+hooks.2");

/// Initialize tracing for shim components.
///
/// Honours `RUST_LOG`; defaults to `shim_core=info`. Safe to call twice.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("shim_core=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Error types for shim operations
#[derive(thiserror::Error, Debug)]
pub enum ShimError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Rewrite error: {0}")]
    Rewrite(#[from] RewriteError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Constant error: {0}")]
    Constant(#[from] ConstantError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for shim operations
pub type Result<T> = std::result::Result<T, ShimError>;
