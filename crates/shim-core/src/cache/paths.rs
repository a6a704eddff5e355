// Content fingerprints and on-disk layout of cached units

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const INDEX_FILE: &str = "index.json";
pub const UNITS_DIR: &str = "units";
pub const OUTPUT_EXTENSION: &str = "shim";
pub const RECORDS_SUFFIX: &str = ".records.json";

/// Hex SHA-256 over engine version, source path and content
pub fn fingerprint(engine_version: &str, source: &Path, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(engine_version.as_bytes());
    hasher.update([0]);
    hasher.update(source.to_string_lossy().as_bytes());
    hasher.update([0]);
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// `units/<aa>/<fingerprint>.shim`, relative to the cache root
pub fn output_path(fingerprint: &str) -> PathBuf {
    let shard = fingerprint.get(..2).unwrap_or("00");
    Path::new(UNITS_DIR)
        .join(shard)
        .join(format!("{fingerprint}.{OUTPUT_EXTENSION}"))
}

/// Records sidecar next to an output file
pub fn records_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!("{stem}{RECORDS_SUFFIX}"))
}

/// Write through a uniquely named temp file and rename into place.
/// Concurrent writers of identical content leave one intact file.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    let result = fs::File::create(&temp)
        .and_then(|mut file| {
            file.write_all(contents)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&temp, path));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}

/// Remove a file, treating a missing one as already removed
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}
