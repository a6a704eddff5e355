//! Loader pipeline: resolve, consult the cache, rewrite on a miss.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::bridge::{AstBridge, HostBridge};
use crate::cache::{CacheError, RewriteCache};
use crate::config::ShimConfig;
use crate::parser::ParseError;
use crate::records::ModuleRecord;
use crate::resolver::{FileResolver, Resolved};
use crate::rewrite::{RewriteError, Rewriter};
use crate::ENGINE_VERSION;

/// Name used in errors for sources that did not come from a file
const INLINE_SOURCE: &str = "<inline>";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("cannot rewrite {path}: {source}")]
    Rewrite {
        path: PathBuf,
        #[source]
        source: RewriteError,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// A rewritten unit ready for the host to load
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedUnit {
    /// The resolved original file
    pub source: PathBuf,
    /// Where the rewritten source lives in the cache
    pub output_path: PathBuf,
    pub output: String,
    pub records: ModuleRecord,
    pub cache_hit: bool,
}

pub struct Loader {
    config: ShimConfig,
    resolver: FileResolver,
    cache: RewriteCache,
    bridge: Box<dyn AstBridge>,
    rewriter: Mutex<Rewriter>,
}

impl Loader {
    /// A loader for the host dialect with its cache at `config.cache_dir`
    pub fn new(config: ShimConfig) -> Result<Self, LoadError> {
        let cache = RewriteCache::open(&config.cache_dir, ENGINE_VERSION)?;
        Ok(Self {
            resolver: FileResolver::from_config(&config),
            rewriter: Mutex::new(Rewriter::from_config(&config)),
            bridge: Box::new(HostBridge::new()),
            cache,
            config,
        })
    }

    pub fn with_bridge(mut self, bridge: Box<dyn AstBridge>) -> Self {
        self.bridge = bridge;
        self
    }

    pub fn with_resolver(mut self, resolver: FileResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &ShimConfig {
        &self.config
    }

    pub fn cache(&self) -> &RewriteCache {
        &self.cache
    }

    pub fn resolver(&self) -> &FileResolver {
        &self.resolver
    }

    /// Loader hook entry point.
    ///
    /// `None` means "not ours": the reference did not resolve, names a
    /// stream, or is a file this layer does not rewrite. The host then loads
    /// it natively.
    pub fn load(
        &self,
        reference: &str,
        origin: Option<&Path>,
    ) -> Result<Option<LoadedUnit>, LoadError> {
        let path = match self.resolver.resolve(reference, origin) {
            Some(Resolved::File(path)) => path,
            Some(Resolved::Stream(stream)) => {
                debug!(stream, "stream reference left to the host");
                return Ok(None);
            }
            None => {
                debug!(reference, "unresolved reference left to the host");
                return Ok(None);
            }
        };

        if !self.config.handles(&path) || !path.is_file() {
            debug!(path = %path.display(), "not rewriting");
            return Ok(None);
        }

        self.rewrite_file(&path).map(Some)
    }

    /// Rewrite one file, reusing the cached output when its content is unchanged
    pub fn rewrite_file(&self, path: &Path) -> Result<LoadedUnit, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if let Some(hit) = self.cache.lookup(path, &content)? {
            return Ok(LoadedUnit {
                source: path.to_path_buf(),
                output_path: hit.path,
                output: hit.output,
                records: hit.records,
                cache_hit: true,
            });
        }

        let (output, records) = self.rewrite_source(&content, Some(path))?;
        let output_path = self.cache.store(path, &content, &output, &records)?;
        info!(
            source = %path.display(),
            output = %output_path.display(),
            "rewrote unit"
        );

        Ok(LoadedUnit {
            source: path.to_path_buf(),
            output_path,
            output,
            records,
            cache_hit: false,
        })
    }

    /// Parse, rewrite and print `content` without touching the cache
    pub fn rewrite_source(
        &self,
        content: &str,
        source: Option<&Path>,
    ) -> Result<(String, ModuleRecord), LoadError> {
        let path = source.map_or_else(|| PathBuf::from(INLINE_SOURCE), Path::to_path_buf);
        let program = self
            .bridge
            .parse(content)
            .map_err(|source| LoadError::Parse {
                path: path.clone(),
                source,
            })?;

        let name = source.map(|p| p.to_string_lossy().into_owned());
        let rewritten = self
            .rewriter
            .lock()
            .rewrite(program, name.as_deref())
            .map_err(|source| LoadError::Rewrite { path, source })?;

        Ok((self.bridge.print(&rewritten.program), rewritten.module))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn loader(dir: &Path) -> Loader {
        let config = ShimConfig {
            cache_dir: dir.join("cache"),
            ..ShimConfig::default()
        };
        Loader::new(config)
            .expect("loader")
            .with_resolver(FileResolver::new(vec![]).with_cwd(dir))
    }

    #[test]
    fn test_load_rewrites_then_hits_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.shim"), "fn answer() { return 42; }").expect("write");
        let loader = loader(dir.path());

        let first = loader.load("a.shim", None).expect("load").expect("ours");
        assert!(!first.cache_hit);
        assert!(first.output.starts_with("__shim::declare("));
        assert!(first.output.contains("__shim::intercepted(null, null, \"answer\")"));
        assert!(first.records.functions.contains_key("answer"));

        let second = loader.load("a.shim", None).expect("load").expect("ours");
        assert!(second.cache_hit);
        assert_eq!(second.output, first.output);
        assert_eq!(second.output_path, first.output_path);
    }

    #[test]
    fn test_load_declines_foreign_references() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("notes.txt"), "text").expect("write");
        let loader = loader(dir.path());

        assert!(loader.load("", None).expect("load").is_none());
        assert!(loader.load("mem://x", None).expect("load").is_none());
        assert!(loader.load("notes.txt", None).expect("load").is_none());
        assert!(loader.load("missing.shim", None).expect("load").is_none());
    }

    #[test]
    fn test_parse_errors_are_fatal_for_the_unit() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("bad.shim"), "fn broken( {").expect("write");
        let loader = loader(dir.path());

        let err = loader.load("bad.shim", None).unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));
        assert!(err.to_string().contains("bad.shim"));
    }

    #[test]
    fn test_rewrite_errors_surface() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loader = loader(dir.path());
        let err = loader
            .rewrite_source("fn f() { return self::X; }", None)
            .unwrap_err();
        assert!(matches!(err, LoadError::Rewrite { .. }));
        assert!(err.to_string().starts_with("cannot rewrite <inline>"));
    }
}
