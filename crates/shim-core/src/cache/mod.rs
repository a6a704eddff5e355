/*!
# Rewrite Cache

Content-addressed store of rewritten units.

Layout under the cache root:

- `index.json`: engine version plus source path -> [`CacheEntry`]
- `units/<aa>/<fingerprint>.shim`: rewritten source
- `units/<aa>/<fingerprint>.records.json`: declaring-unit records

An index written by another engine version, or one that cannot be read, is
discarded together with every cached unit.
*/

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::records::ModuleRecord;

pub mod paths;

pub use paths::fingerprint;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Fingerprint of engine version, source path and content
    pub content_hash: String,
    /// Rewritten unit, relative to the cache root
    pub output: PathBuf,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
struct CacheIndex {
    engine_version: String,
    entries: BTreeMap<String, CacheEntry>,
}

/// A cache hit
#[derive(Debug, Clone, PartialEq)]
pub struct CachedUnit {
    pub path: PathBuf,
    pub output: String,
    pub records: ModuleRecord,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub engine_version: String,
    pub entries: usize,
    pub bytes: u64,
}

pub struct RewriteCache {
    root: PathBuf,
    engine_version: String,
    index: RwLock<CacheIndex>,
}

impl RewriteCache {
    /// Open (or create) the cache at `root` for the given engine version
    pub fn open(root: impl Into<PathBuf>, engine_version: &str) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(io_error(&root))?;

        let cache = Self {
            index: RwLock::new(CacheIndex {
                engine_version: engine_version.to_string(),
                entries: BTreeMap::new(),
            }),
            engine_version: engine_version.to_string(),
            root,
        };

        let index_path = cache.root.join(paths::INDEX_FILE);
        match fs::read_to_string(&index_path) {
            Ok(text) => match serde_json::from_str::<CacheIndex>(&text) {
                Ok(index) if index.engine_version == engine_version => {
                    debug!(entries = index.entries.len(), "loaded cache index");
                    *cache.index.write() = index;
                }
                Ok(index) => {
                    info!(
                        found = %index.engine_version,
                        expected = engine_version,
                        "engine version changed; invalidating rewrite cache"
                    );
                    cache.clear()?;
                }
                Err(err) => {
                    warn!(path = %index_path.display(), %err, "unreadable cache index; starting empty");
                    cache.clear()?;
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(io_error(&index_path)(err)),
        }

        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn engine_version(&self) -> &str {
        &self.engine_version
    }

    fn key(source: &Path) -> String {
        source.to_string_lossy().into_owned()
    }

    /// Cached output for `source` if it was rewritten from exactly `content`
    pub fn lookup(&self, source: &Path, content: &str) -> Result<Option<CachedUnit>, CacheError> {
        let hash = fingerprint(&self.engine_version, source, content);
        let entry = match self.index.read().entries.get(&Self::key(source)) {
            Some(entry) if entry.content_hash == hash => entry.clone(),
            Some(_) => {
                debug!(source = %source.display(), "source changed since it was cached");
                return Ok(None);
            }
            None => return Ok(None),
        };

        let path = self.root.join(&entry.output);
        let output = match fs::read_to_string(&path) {
            Ok(output) => output,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "cached unit missing; rewriting again");
                return Ok(None);
            }
            Err(err) => return Err(io_error(&path)(err)),
        };

        let records_path = paths::records_path(&path);
        let records = match fs::read_to_string(&records_path) {
            Ok(json) => ModuleRecord::from_json(&json)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %records_path.display(), "cached records missing; rewriting again");
                return Ok(None);
            }
            Err(err) => return Err(io_error(&records_path)(err)),
        };

        debug!(source = %source.display(), "rewrite cache hit");
        Ok(Some(CachedUnit {
            path,
            output,
            records,
        }))
    }

    /// Store the rewrite of `source`; replaces what was cached for it before
    pub fn store(
        &self,
        source: &Path,
        content: &str,
        output: &str,
        records: &ModuleRecord,
    ) -> Result<PathBuf, CacheError> {
        let hash = fingerprint(&self.engine_version, source, content);
        let relative = paths::output_path(&hash);
        let path = self.root.join(&relative);

        paths::atomic_write(&path, output.as_bytes()).map_err(io_error(&path))?;
        let records_path = paths::records_path(&path);
        paths::atomic_write(&records_path, records.to_json()?.as_bytes())
            .map_err(io_error(&records_path))?;

        let mut index = self.index.write();
        let previous = index.entries.insert(
            Self::key(source),
            CacheEntry {
                content_hash: hash,
                output: relative.clone(),
                created_at: Utc::now(),
            },
        );
        if let Some(previous) = previous.filter(|p| p.output != relative) {
            self.remove_unit(&previous.output)?;
        }
        self.persist(&index)?;

        debug!(source = %source.display(), output = %path.display(), "stored rewrite");
        Ok(path)
    }

    /// Drop the entry for `source`; returns whether there was one
    pub fn invalidate(&self, source: &Path) -> Result<bool, CacheError> {
        let mut index = self.index.write();
        let Some(entry) = index.entries.remove(&Self::key(source)) else {
            return Ok(false);
        };
        self.remove_unit(&entry.output)?;
        self.persist(&index)?;
        Ok(true)
    }

    /// Remove every cached unit and reset the index
    pub fn clear(&self) -> Result<(), CacheError> {
        let units = self.root.join(paths::UNITS_DIR);
        match fs::remove_dir_all(&units) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
                return Err(io_error(&units)(err))
            }
            _ => {}
        }

        let mut index = self.index.write();
        *index = CacheIndex {
            engine_version: self.engine_version.clone(),
            entries: BTreeMap::new(),
        };
        self.persist(&index)
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let index = self.index.read();
        let mut bytes = 0;
        for entry in index.entries.values() {
            let path = self.root.join(&entry.output);
            match fs::metadata(&path) {
                Ok(meta) => bytes += meta.len(),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(io_error(&path)(err)),
            }
        }
        Ok(CacheStats {
            engine_version: index.engine_version.clone(),
            entries: index.entries.len(),
            bytes,
        })
    }

    pub fn entry(&self, source: &Path) -> Option<CacheEntry> {
        self.index.read().entries.get(&Self::key(source)).cloned()
    }

    fn remove_unit(&self, relative: &Path) -> Result<(), CacheError> {
        let path = self.root.join(relative);
        paths::remove_if_exists(&path).map_err(io_error(&path))?;
        let records = paths::records_path(&path);
        paths::remove_if_exists(&records).map_err(io_error(&records))
    }

    fn persist(&self, index: &CacheIndex) -> Result<(), CacheError> {
        let path = self.root.join(paths::INDEX_FILE);
        let json = serde_json::to_string_pretty(index)?;
        paths::atomic_write(&path, json.as_bytes()).map_err(io_error(&path))
    }
}
