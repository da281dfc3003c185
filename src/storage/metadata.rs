//! Durable id → record mapping for one partition.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::storage::StorageResult;
use crate::storage::persistence::{read_json, write_json_atomic};
use crate::vector::VectorId;

/// Records keyed by their vector id, stored as one JSON object whose keys
/// are the ids in decimal.
///
/// Mutations only touch memory; call [`MetadataStore::save`] to persist.
#[derive(Debug)]
pub struct MetadataStore<R> {
    path: PathBuf,
    entries: BTreeMap<u32, R>,
}

impl<R> MetadataStore<R>
where
    R: Serialize + DeserializeOwned,
{
    /// Loads the store at `path`; a missing file is an empty store.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let entries = read_json(path)?.unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn save(&self) -> StorageResult<()> {
        write_json_atomic(&self.path, &self.entries)
    }

    pub fn get(&self, id: VectorId) -> Option<&R> {
        self.entries.get(&id.get())
    }

    pub fn insert(&mut self, id: VectorId, record: R) {
        self.entries.insert(id.get(), record);
    }

    /// Removes every record matching `predicate` and returns how many went.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&R) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, record| !predicate(record));
        before - self.entries.len()
    }

    /// Swaps in a complete new mapping.
    pub fn replace(&mut self, entries: BTreeMap<u32, R>) {
        self.entries = entries;
    }

    /// Records in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (VectorId, &R)> + '_ {
        self.entries.iter().map(|(&id, r)| (VectorId::new(id), r))
    }

    pub fn ids(&self) -> impl Iterator<Item = VectorId> + '_ {
        self.entries.keys().map(|&id| VectorId::new(id))
    }

    pub fn contains(&self, id: VectorId) -> bool {
        self.entries.contains_key(&id.get())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
