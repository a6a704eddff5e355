//! Resolution of module references to files on disk.
//!
//! Never fails: a reference that cannot be resolved yields `None` so the
//! host can fall back to its own resolution.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::config::ShimConfig;

fn stream_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*://").expect("valid stream regex")
    })
}

/// Whether a reference names a virtual or stream resource (`scheme://...`)
pub fn is_stream(reference: &str) -> bool {
    stream_pattern().is_match(reference)
}

/// A resolved reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A file on disk, canonicalized when it was found by probing
    File(PathBuf),
    /// A stream resource, passed through verbatim
    Stream(String),
}

impl Resolved {
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Resolved::File(path) => Some(path),
            Resolved::Stream(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FileResolver {
    search_paths: Vec<PathBuf>,
    cwd: Option<PathBuf>,
}

impl FileResolver {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            cwd: None,
        }
    }

    pub fn from_config(config: &ShimConfig) -> Self {
        Self::new(config.search_paths.clone())
    }

    /// Resolve relative references against `cwd` instead of the process
    /// working directory
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    fn cwd(&self) -> Option<PathBuf> {
        self.cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
    }

    /// Resolve `reference`, optionally relative to the directory of the
    /// including unit `origin` as a last resort
    pub fn resolve(&self, reference: &str, origin: Option<&Path>) -> Option<Resolved> {
        if reference.is_empty() {
            return None;
        }
        if is_stream(reference) {
            return Some(Resolved::Stream(reference.to_string()));
        }

        let path = Path::new(reference);
        if path.is_absolute() {
            return Some(Resolved::File(path.to_path_buf()));
        }

        let cwd = self.cwd();
        let mut candidates: Vec<PathBuf> = Vec::with_capacity(self.search_paths.len() + 2);
        for dir in &self.search_paths {
            let dir = match (&cwd, dir.is_relative()) {
                (Some(cwd), true) => cwd.join(dir),
                _ => dir.clone(),
            };
            candidates.push(dir.join(path));
        }
        if let Some(cwd) = &cwd {
            candidates.push(cwd.join(path));
        }
        if let Some(dir) = origin.and_then(Path::parent) {
            candidates.push(dir.join(path));
        }

        let found = candidates.into_iter().find(|candidate| candidate.is_file())?;
        let resolved = found.canonicalize().unwrap_or(found);
        debug!(reference, resolved = %resolved.display(), "resolved module reference");
        Some(Resolved::File(resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_trivial_references() {
        let resolver = FileResolver::new(vec![]);
        assert_eq!(resolver.resolve("", None), None);
        assert_eq!(
            resolver.resolve("mem://buffer/1", None),
            Some(Resolved::Stream("mem://buffer/1".to_string()))
        );
        assert!(!is_stream("c:/not/a/stream"));

        let absolute = std::env::temp_dir().join("does-not-need-to-exist.shim");
        assert_eq!(
            resolver.resolve(absolute.to_str().expect("utf-8"), None),
            Some(Resolved::File(absolute))
        );
    }

    #[test]
    fn test_search_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().canonicalize().expect("canonical tempdir");
        for sub in ["first", "second", "work", "origin"] {
            fs::create_dir_all(root.join(sub)).expect("mkdir");
        }
        fs::write(root.join("second/lib.shim"), "").expect("write");
        fs::write(root.join("work/lib.shim"), "").expect("write");
        fs::write(root.join("work/local.shim"), "").expect("write");
        fs::write(root.join("origin/sibling.shim"), "").expect("write");

        let resolver = FileResolver::new(vec![PathBuf::from("first"), root.join("second")])
            .with_cwd(root.join("work"));

        // Search paths win over the working directory
        assert_eq!(
            resolver.resolve("lib.shim", None),
            Some(Resolved::File(root.join("second/lib.shim")))
        );
        assert_eq!(
            resolver.resolve("local.shim", None),
            Some(Resolved::File(root.join("work/local.shim")))
        );

        let origin = root.join("origin/main.shim");
        assert_eq!(
            resolver.resolve("sibling.shim", Some(&origin)),
            Some(Resolved::File(root.join("origin/sibling.shim")))
        );
        assert_eq!(resolver.resolve("sibling.shim", None), None);
        assert_eq!(resolver.resolve("missing.shim", Some(&origin)), None);
    }

    #[test]
    fn test_relative_search_path_uses_cwd() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().canonicalize().expect("canonical tempdir");
        fs::create_dir_all(root.join("vendor")).expect("mkdir");
        fs::write(root.join("vendor/dep.shim"), "").expect("write");

        let resolver = FileResolver::new(vec![PathBuf::from("vendor")]).with_cwd(&root);
        assert_eq!(
            resolver
                .resolve("dep.shim", None)
                .as_ref()
                .and_then(Resolved::as_path),
            Some(root.join("vendor/dep.shim").as_path())
        );
    }
}
