//! Persisted monotonically increasing id counter.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::{StorageError, StorageResult};
use crate::storage::persistence::{read_json, write_json_atomic};
use crate::vector::VectorId;

#[derive(Debug, Default, Serialize, Deserialize)]
struct IdFile {
    /// Older files may lack the key; they count as having issued id 0.
    #[serde(default)]
    last_id: i64,
}

/// Hands out sequential ids and records the last one in `{"last_id": n}`.
///
/// `-1` means nothing has been issued yet.
#[derive(Debug)]
pub struct IdAllocator {
    path: PathBuf,
    last_id: i64,
}

impl IdAllocator {
    /// Loads the counter; a missing file starts at `-1`.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let last_id = read_json::<IdFile>(path)?.map_or(-1, |file| file.last_id);
        Ok(Self {
            path: path.to_path_buf(),
            last_id,
        })
    }

    /// Advances the counter and persists it before returning the new id.
    ///
    /// On a failed write the counter is left where it was.
    pub fn allocate(&mut self) -> StorageResult<VectorId> {
        let next = self.last_id + 1;
        let id = u32::try_from(next).map_err(|_| {
            StorageError::Serialization(format!("id counter {next} is out of range"))
        })?;
        write_json_atomic(&self.path, &IdFile { last_id: next })?;
        self.last_id = next;
        Ok(VectorId::new(id))
    }

    /// Resets the counter after a rebuild that kept `count` records.
    pub fn reset(&mut self, count: usize) -> StorageResult<()> {
        let last_id = count as i64 - 1;
        write_json_atomic(&self.path, &IdFile { last_id })?;
        self.last_id = last_id;
        Ok(())
    }

    pub fn last_id(&self) -> i64 {
        self.last_id
    }
}
