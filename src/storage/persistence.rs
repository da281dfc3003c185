//! File layout and atomic JSON persistence for one content partition.
//!
//! A partition with stem `S` owns three sibling files: `S` (the binary
//! vector index), `S-metadata.json` and `S-id.json`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;

use crate::storage::{StorageError, StorageResult};

/// Paths of the files backing one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFiles {
    pub index: PathBuf,
    pub metadata: PathBuf,
    pub id: PathBuf,
}

impl PartitionFiles {
    pub fn new(dir: &Path, stem: &str) -> Self {
        Self {
            index: dir.join(stem),
            metadata: dir.join(format!("{stem}-metadata.json")),
            id: dir.join(format!("{stem}-id.json")),
        }
    }
}

/// Serializes `value` as pretty JSON and renames it over `path`.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| StorageError::Serialization(format!("{}: {e}", path.display())))?;
    write_atomic(path, json.as_bytes())
}

/// Writes `bytes` to a temporary sibling of `path`, then renames it into place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let write_err = |source| StorageError::FileWrite {
        path: path.to_path_buf(),
        source,
    };

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(write_err)?;

    let mut temp = NamedTempFile::new_in(parent).map_err(write_err)?;
    temp.write_all(bytes).map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;
    temp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Reads a JSON file, returning `None` when it does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = fs::read_to_string(path).map_err(|source| StorageError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&json)
        .map(Some)
        .map_err(|e| StorageError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}
