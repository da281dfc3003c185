//! One content partition: vector index, metadata and id counter kept in step.
//!
//! Every vector id in the index is a key in the metadata store and the other
//! way round. When that cannot be trusted after opening (unreadable or
//! missing index file, differing ids, an id counter behind the records) the
//! partition is *stale*: searches fail with [`RagError::CorruptIndex`] and
//! the next mutation, or an explicit [`ContentIndex::repair`], rebuilds the
//! index from the metadata.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::content::{ContentKind, ContentRecord, IdentityKey};
use crate::error::{RagError, RagResult};
use crate::retrieval::SearchResult;
use crate::storage::{IdAllocator, MetadataStore, PartitionFiles};
use crate::vector::{EmbeddingGenerator, IvfParams, VectorError, VectorId, VectorIndex};

/// Result of adding one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Inserted(VectorId),
    /// An identical record already exists; nothing changed.
    Duplicate,
}

impl AddOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, AddOutcome::Duplicate)
    }

    pub fn id(&self) -> Option<VectorId> {
        match self {
            AddOutcome::Inserted(id) => Some(*id),
            AddOutcome::Duplicate => None,
        }
    }
}

/// Chunk counts from ingesting one source item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub added: usize,
    pub duplicates: usize,
}

pub struct ContentIndex<R: ContentRecord> {
    files: PartitionFiles,
    embedder: Arc<dyn EmbeddingGenerator>,
    params: IvfParams,
    vectors: VectorIndex,
    metadata: MetadataStore<R>,
    ids: IdAllocator,
    identities: HashSet<IdentityKey>,
    stale: Option<String>,
}

impl<R: ContentRecord> ContentIndex<R> {
    /// Opens the partition for `R::KIND` inside `dir`.
    ///
    /// Nothing is written until the first mutation. A damaged index file is
    /// not an error here; the partition opens stale instead.
    pub fn open(
        dir: &Path,
        embedder: Arc<dyn EmbeddingGenerator>,
        params: IvfParams,
    ) -> RagResult<Self> {
        let files = PartitionFiles::new(dir, R::KIND.file_stem());
        let metadata = MetadataStore::<R>::open(&files.metadata)?;
        let ids = IdAllocator::open(&files.id)?;
        let dimension = embedder.dimension();
        let empty = || VectorIndex::new(dimension, params);

        let (vectors, stale) = match VectorIndex::load(&files.index, params) {
            Ok(Some(vectors)) if vectors.dimension() != dimension => {
                let reason = format!(
                    "index holds {}-dimensional vectors but the embedder produces {}",
                    vectors.dimension().get(),
                    dimension.get()
                );
                (empty(), Some(reason))
            }
            Ok(Some(vectors)) => {
                let reason = alignment_problem(&vectors, &metadata, &ids);
                (vectors, reason)
            }
            Ok(None) if metadata.is_empty() => (empty(), None),
            Ok(None) => (empty(), Some("index file is missing".to_string())),
            Err(e) => (empty(), Some(format!("index file is unreadable: {e}"))),
        };

        if let Some(reason) = &stale {
            warn!(kind = %R::KIND, "partition is stale: {reason}");
        }

        let identities = metadata
            .iter()
            .filter_map(|(_, record)| record.identity_key())
            .collect();

        debug!(
            kind = %R::KIND,
            records = metadata.len(),
            last_id = ids.last_id(),
            "opened partition"
        );

        Ok(Self {
            files,
            embedder,
            params,
            vectors,
            metadata,
            ids,
            identities,
            stale,
        })
    }

    /// Adds one record unless an identical one is already stored.
    pub fn add(&mut self, record: R) -> RagResult<AddOutcome> {
        self.repair()?;

        if self.is_duplicate(&record) {
            debug!(kind = %R::KIND, id = record.external_id(), "skipping duplicate record");
            return Ok(AddOutcome::Duplicate);
        }

        let vector = self.embedder.embed(record.embedding_text())?;
        let id = self.insert_embedded(record, &vector)?;
        self.persist()?;
        Ok(AddOutcome::Inserted(id))
    }

    /// Adds many records with one embedding call and one write.
    ///
    /// Duplicates, including repeats within `records`, are counted and
    /// skipped. Every embedding is validated before anything is inserted.
    pub fn add_batch(&mut self, records: impl IntoIterator<Item = R>) -> RagResult<IngestReport> {
        self.repair()?;

        let mut report = IngestReport::default();
        let mut seen = HashSet::new();
        let mut fresh = Vec::new();
        for record in records {
            let duplicate = match record.identity_key() {
                Some(key) => self.identities.contains(&key) || !seen.insert(key),
                None => false,
            };
            if duplicate {
                report.duplicates += 1;
            } else {
                fresh.push(record);
            }
        }
        if fresh.is_empty() {
            return Ok(report);
        }

        let texts: Vec<&str> = fresh.iter().map(|r| r.embedding_text()).collect();
        let embeddings = self.embedder.generate_embeddings(&texts)?;
        if embeddings.len() != fresh.len() {
            return Err(RagError::Embedding(format!(
                "generator returned {} embeddings for {} texts",
                embeddings.len(),
                fresh.len()
            )));
        }
        for embedding in &embeddings {
            self.vectors.dimension().validate_vector(embedding)?;
        }

        for (record, embedding) in fresh.into_iter().zip(embeddings) {
            self.insert_embedded(record, &embedding)?;
            report.added += 1;
        }
        self.persist()?;

        debug!(
            kind = %R::KIND,
            added = report.added,
            duplicates = report.duplicates,
            "added batch"
        );
        Ok(report)
    }

    fn is_duplicate(&self, record: &R) -> bool {
        record
            .identity_key()
            .is_some_and(|key| self.identities.contains(&key))
    }

    /// Allocates an id and stores the record under it, in memory only.
    fn insert_embedded(&mut self, record: R, vector: &[f32]) -> RagResult<VectorId> {
        self.vectors.dimension().validate_vector(vector)?;
        let id = self.ids.allocate()?;
        self.vectors.insert(id, vector).map_err(|e| match e {
            VectorError::DuplicateId(_) => RagError::CorruptIndex {
                kind: R::KIND,
                reason: e.to_string(),
            },
            other => other.into(),
        })?;
        if let Some(key) = record.identity_key() {
            self.identities.insert(key);
        }
        self.metadata.insert(id, record);
        Ok(id)
    }

    /// Writes metadata, then the index. The id counter is written as ids
    /// are handed out.
    fn persist(&self) -> RagResult<()> {
        self.metadata.save()?;
        self.vectors.save(&self.files.index)?;
        Ok(())
    }

    /// Embeds `query` and returns up to `k` nearest records.
    ///
    /// Records whose path is in `prioritized` come first; each group keeps
    /// its distance order.
    pub fn search(&self, query: &str, prioritized: &[String], k: usize) -> RagResult<Vec<SearchResult>> {
        self.ensure_fresh()?;
        if self.vectors.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed(query)?;
        self.search_embedded(&embedding, prioritized, k)
    }

    /// Same as [`ContentIndex::search`] for an already embedded query.
    pub fn search_embedded(
        &self,
        query: &[f32],
        prioritized: &[String],
        k: usize,
    ) -> RagResult<Vec<SearchResult>> {
        self.ensure_fresh()?;

        let results: Vec<SearchResult> = self
            .vectors
            .search(query, k)?
            .into_iter()
            .filter_map(|(id, distance)| match self.metadata.get(id) {
                Some(record) => Some(SearchResult::new(record.clone().into_record(), distance)),
                None => {
                    warn!(kind = %R::KIND, %id, "vector without metadata");
                    None
                }
            })
            .collect();

        let (mut front, back): (Vec<_>, Vec<_>) = results
            .into_iter()
            .partition(|result| result.is_prioritized(prioritized));
        front.extend(back);
        Ok(front)
    }

    fn ensure_fresh(&self) -> RagResult<()> {
        match &self.stale {
            Some(reason) => Err(RagError::CorruptIndex {
                kind: R::KIND,
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Removes every record of `external_id` and rebuilds the partition.
    ///
    /// Returns how many records were removed; zero leaves everything as is.
    pub fn delete(&mut self, external_id: &str) -> RagResult<usize> {
        let removed = self
            .metadata
            .remove_where(|record| record.external_id() == external_id);
        if removed == 0 {
            return Ok(0);
        }

        info!(kind = %R::KIND, external_id, removed, "deleted records, rebuilding index");
        self.metadata.save()?;
        if let Err(e) = self.rebuild() {
            self.stale = Some(format!("rebuild after delete failed: {e}"));
            return Err(e);
        }
        Ok(removed)
    }

    /// Rebuilds the index from the metadata with ids `0..N`.
    ///
    /// Survivors keep their relative order and are re-embedded from their
    /// stored text. Records with empty text cannot be embedded and are
    /// dropped.
    pub fn rebuild(&mut self) -> RagResult<()> {
        let dimension = self.embedder.dimension();
        let survivors: Vec<&R> = self
            .metadata
            .iter()
            .map(|(_, record)| record)
            .filter(|record| !record.embedding_text().is_empty())
            .collect();
        let dropped = self.metadata.len() - survivors.len();

        let texts: Vec<&str> = survivors.iter().map(|r| r.embedding_text()).collect();
        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.generate_embeddings(&texts)?
        };
        if embeddings.len() != survivors.len() {
            return Err(RagError::Embedding(format!(
                "generator returned {} embeddings for {} texts",
                embeddings.len(),
                survivors.len()
            )));
        }

        let mut vectors = VectorIndex::new(dimension, self.params);
        let mut entries = BTreeMap::new();
        for (position, (record, embedding)) in survivors.into_iter().zip(&embeddings).enumerate() {
            let id = VectorId::new(position as u32);
            vectors.insert(id, embedding)?;
            entries.insert(id.get(), record.clone());
        }

        let count = entries.len();
        self.metadata.replace(entries);
        self.vectors = vectors;
        self.identities = self
            .metadata
            .iter()
            .filter_map(|(_, record)| record.identity_key())
            .collect();
        self.stale = None;

        self.ids.reset(count)?;
        self.persist()?;

        info!(kind = %R::KIND, records = count, dropped, "rebuilt partition");
        Ok(())
    }

    /// Rebuilds if the partition is stale. Returns whether it did.
    pub fn repair(&mut self) -> RagResult<bool> {
        match self.stale.take() {
            Some(reason) => {
                info!(kind = %R::KIND, "repairing stale partition: {reason}");
                if let Err(e) = self.rebuild() {
                    self.stale = Some(reason);
                    return Err(e);
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Checks that index ids and metadata keys agree.
    pub fn verify_consistency(&self) -> RagResult<()> {
        self.ensure_fresh()?;
        match alignment_problem(&self.vectors, &self.metadata, &self.ids) {
            Some(reason) => Err(RagError::CorruptIndex {
                kind: R::KIND,
                reason,
            }),
            None => Ok(()),
        }
    }

    /// All records stored for `external_id`, in id order.
    pub fn get_entries(&self, external_id: &str) -> Vec<&R> {
        self.metadata
            .iter()
            .map(|(_, record)| record)
            .filter(|record| record.external_id() == external_id)
            .collect()
    }

    /// Distinct external ids in this partition.
    pub fn external_ids(&self) -> BTreeSet<String> {
        self.metadata
            .iter()
            .map(|(_, record)| record.external_id().to_string())
            .collect()
    }

    pub fn get(&self, id: VectorId) -> Option<&R> {
        self.metadata.get(id)
    }

    /// Records in id order.
    pub fn records(&self) -> impl Iterator<Item = (VectorId, &R)> + '_ {
        self.metadata.iter()
    }

    /// Stored vector for `id`.
    pub fn vector(&self, id: VectorId) -> Option<&[f32]> {
        self.vectors.get(id)
    }

    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Whether the partition holds any records worth searching.
    pub fn data_exists(&self) -> bool {
        !self.metadata.is_empty()
    }

    pub fn is_stale(&self) -> bool {
        self.stale.is_some()
    }

    pub fn stale_reason(&self) -> Option<&str> {
        self.stale.as_deref()
    }

    pub fn kind(&self) -> ContentKind {
        R::KIND
    }

    pub fn last_id(&self) -> i64 {
        self.ids.last_id()
    }

    pub fn files(&self) -> &PartitionFiles {
        &self.files
    }
}

/// Describes how the index disagrees with the metadata, if it does.
fn alignment_problem<R: ContentRecord>(
    vectors: &VectorIndex,
    metadata: &MetadataStore<R>,
    ids: &IdAllocator,
) -> Option<String> {
    if vectors.len() != metadata.len() || vectors.ids().any(|id| !metadata.contains(id)) {
        return Some(format!(
            "index has {} vectors, metadata has {} records with different ids",
            vectors.len(),
            metadata.len()
        ));
    }
    match metadata.ids().last() {
        Some(max) if i64::from(max.get()) > ids.last_id() => Some(format!(
            "id counter {} is behind record {max}",
            ids.last_id()
        )),
        _ => None,
    }
}
