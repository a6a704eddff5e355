//! Runtime configuration for the loader pipeline.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rewrite::DEFAULT_MAX_DEPTH;

pub const ENV_CACHE_DIR: &str = "SHIM_CACHE_DIR";
pub const ENV_SEARCH_PATH: &str = "SHIM_SEARCH_PATH";
pub const ENV_DEBUG: &str = "SHIM_DEBUG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShimConfig {
    /// Where rewritten units and the cache index live
    pub cache_dir: PathBuf,
    /// Directories searched, in order, for relative module references
    pub search_paths: Vec<PathBuf>,
    /// File extensions that are rewritten; anything else loads natively
    pub extensions: Vec<String>,
    /// Route class-constant fetches through the constant accessor
    pub rewrite_constants: bool,
    /// Route `exit` through the exit hook
    pub rewrite_exit: bool,
    /// Guard call sites of functions the file does not declare
    pub rewrite_host_calls: bool,
    /// Maximum AST nesting the rewriter accepts
    pub max_depth: usize,
    /// Enable debug logging
    pub debug: bool,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".shim-cache"),
            search_paths: Vec::new(),
            extensions: vec!["shim".to_string()],
            rewrite_constants: true,
            rewrite_exit: true,
            rewrite_host_calls: true,
            max_depth: DEFAULT_MAX_DEPTH,
            debug: false,
        }
    }
}

impl ShimConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    pub fn with_env(self) -> Self {
        self.with_vars(|key| std::env::var_os(key))
    }

    /// Apply overrides from an arbitrary variable source
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|v| !v.is_empty()) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(paths) = lookup(ENV_SEARCH_PATH).filter(|v| !v.is_empty()) {
            self.search_paths = std::env::split_paths(&paths).collect();
        }
        if let Some(debug) = lookup(ENV_DEBUG) {
            let debug = debug.to_string_lossy().to_ascii_lowercase();
            self.debug = matches!(debug.as_str(), "1" | "true" | "yes" | "on");
        }
        self
    }

    /// Whether a resolved file is one this layer rewrites
    pub fn handles(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }
}
