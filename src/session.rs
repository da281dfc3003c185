//! A chat session: four content partitions under one directory.
//!
//! The session routes uploads to the partition for their extension, keeps
//! the uploads waiting for the next prompt, and assembles the prompt from a
//! ranked search over the configured partitions.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::content::{
    AddOutcome, AudioRecord, ContentIndex, ContentKind, ContentRecord, DocumentRecord, Extractors,
    HistoryRecord, ImageRecord, IngestReport, MessageRole, TextSplitter, history::now_timestamp,
};
use crate::error::{RagError, RagResult};
use crate::prompt::{ChatMessage, PromptBuilder};
use crate::retrieval::{MultiIndexRetriever, PartitionSearch, SearchResult};
use crate::storage::StorageError;
use crate::vector::EmbeddingGenerator;

/// Session used when none is named.
pub const DEFAULT_SESSION: &str = "General";

type Partition<R> = Arc<RwLock<ContentIndex<R>>>;

/// What happened to one uploaded item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemOutcome {
    Ingested { added: usize, duplicates: usize },
    Skipped { reason: String },
    Failed { code: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub external_id: String,
    pub path: PathBuf,
    pub kind: Option<ContentKind>,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// Per-item outcomes of a batch, with totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub items: Vec<ItemReport>,
    pub added: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchReport {
    fn push(&mut self, item: ItemReport) {
        match &item.outcome {
            ItemOutcome::Ingested { added, duplicates } => {
                self.added += added;
                self.duplicates += duplicates;
            }
            ItemOutcome::Skipped { .. } => self.skipped += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
        }
        self.items.push(item);
    }

    pub fn ingested(&self) -> usize {
        self.items.len() - self.skipped - self.failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionStats {
    pub kind: ContentKind,
    pub records: usize,
    pub sources: usize,
    pub last_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale: Option<String>,
}

fn partition_stats<R: ContentRecord>(partition: &Partition<R>) -> PartitionStats {
    let index = partition.read();
    PartitionStats {
        kind: R::KIND,
        records: index.len(),
        sources: index.external_ids().len(),
        last_id: index.last_id(),
        stale: index.stale_reason().map(str::to_string),
    }
}

fn open_partition<R: ContentRecord>(
    dir: &Path,
    embedder: &Arc<dyn EmbeddingGenerator>,
    settings: &Settings,
) -> RagResult<Partition<R>> {
    let index = ContentIndex::open(dir, Arc::clone(embedder), settings.ivf_params())?;
    Ok(Arc::new(RwLock::new(index)))
}

/// Rebuilds a stale partition; only takes the write lock when needed.
fn repair_partition<R: ContentRecord>(partition: &Partition<R>) -> RagResult<()> {
    if partition.read().is_stale() {
        partition.write().repair()?;
    }
    Ok(())
}

/// Accepts plain relative names; rejects anything that could leave the index base.
pub fn validate_session_id(session_id: &str) -> RagResult<()> {
    let invalid = |reason| {
        Err(RagError::InvalidSession {
            session: session_id.to_string(),
            reason,
        })
    };

    if session_id.trim().is_empty() {
        return invalid("session id is empty");
    }
    let path = Path::new(session_id);
    if path.is_absolute() {
        return invalid("session id must be a relative name");
    }
    if !path
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        return invalid("session id must not contain '..', '.' or a root");
    }
    Ok(())
}

/// Deletes a session directory. Returns whether it existed.
pub fn remove_session(settings: &Settings, session_id: &str) -> RagResult<bool> {
    validate_session_id(session_id)?;
    let dir = settings.index_base.join(session_id);
    if !dir.exists() {
        return Ok(false);
    }
    std::fs::remove_dir_all(&dir).map_err(|source| StorageError::FileWrite {
        path: dir.clone(),
        source,
    })?;
    info!(session = session_id, "removed session");
    Ok(true)
}

pub struct SessionContext {
    session_id: String,
    dir: PathBuf,
    settings: Settings,
    embedder: Arc<dyn EmbeddingGenerator>,
    extractors: Extractors,
    splitter: TextSplitter,
    prompt_builder: PromptBuilder,
    documents: Partition<DocumentRecord>,
    images: Partition<ImageRecord>,
    audio: Partition<AudioRecord>,
    history: Partition<HistoryRecord>,
    pending: Vec<(String, PathBuf)>,
    recent_uploads: Vec<String>,
}

impl SessionContext {
    /// Opens the partitions of `session_id` under `settings.index_base`.
    pub fn open(
        settings: Settings,
        session_id: &str,
        embedder: Arc<dyn EmbeddingGenerator>,
        extractors: Extractors,
    ) -> RagResult<Self> {
        settings.validate()?;
        validate_session_id(session_id)?;

        let produced = embedder.dimension().get();
        if produced != settings.vector.dimension {
            return Err(RagError::DimensionMismatch {
                expected: settings.vector.dimension,
                actual: produced,
            });
        }

        let dir = settings.index_base.join(session_id);
        let documents = open_partition(&dir, &embedder, &settings)?;
        let images = open_partition(&dir, &embedder, &settings)?;
        let audio = open_partition(&dir, &embedder, &settings)?;
        let history = open_partition(&dir, &embedder, &settings)?;

        info!(session = session_id, dir = %dir.display(), "opened session");

        Ok(Self {
            session_id: session_id.to_string(),
            splitter: settings.splitter(),
            prompt_builder: PromptBuilder::from_model_path(settings.llm.model_path.as_deref()),
            dir,
            settings,
            embedder,
            extractors,
            documents,
            images,
            audio,
            history,
            pending: Vec::new(),
            recent_uploads: Vec::new(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn documents(&self) -> &Partition<DocumentRecord> {
        &self.documents
    }

    pub fn images(&self) -> &Partition<ImageRecord> {
        &self.images
    }

    pub fn audio(&self) -> &Partition<AudioRecord> {
        &self.audio
    }

    pub fn history(&self) -> &Partition<HistoryRecord> {
        &self.history
    }

    /// Ingests each `(external_id, path)` into the partition for its extension.
    ///
    /// A failing item is reported and the rest of the batch continues.
    pub fn process_files(&mut self, files: &[(String, PathBuf)]) -> BatchReport {
        let mut report = BatchReport::default();

        for (external_id, path) in files {
            let kind = ContentKind::from_path(path);
            let outcome = match kind {
                Some(kind) => match self.ingest_one(kind, external_id, path) {
                    Ok(IngestReport { added, duplicates }) => {
                        ItemOutcome::Ingested { added, duplicates }
                    }
                    Err(e) => {
                        warn!(external_id, path = %path.display(), "ingestion failed: {e}");
                        ItemOutcome::Failed {
                            code: e.status_code(),
                            message: e.to_string(),
                        }
                    }
                },
                None => {
                    let extension = path
                        .extension()
                        .map(|ext| ext.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    debug!(external_id, path = %path.display(), "skipping unsupported file");
                    ItemOutcome::Skipped {
                        reason: format!("unsupported file extension '{extension}'"),
                    }
                }
            };

            report.push(ItemReport {
                external_id: external_id.clone(),
                path: path.clone(),
                kind,
                outcome,
            });
        }

        info!(
            session = %self.session_id,
            items = report.items.len(),
            added = report.added,
            skipped = report.skipped,
            failed = report.failed,
            "processed batch"
        );
        report
    }

    fn ingest_one(&self, kind: ContentKind, external_id: &str, path: &Path) -> RagResult<IngestReport> {
        match kind {
            ContentKind::Document => self.documents.write().ingest(
                external_id,
                path,
                self.extractors.document.as_ref(),
                &self.splitter,
            ),
            ContentKind::Image => self.images.write().ingest(
                external_id,
                path,
                self.extractors.image.as_ref(),
                &self.splitter,
            ),
            ContentKind::Audio => self.audio.write().ingest(
                external_id,
                path,
                self.extractors.audio.as_ref(),
                &self.splitter,
            ),
            ContentKind::History => Err(RagError::UnsupportedKind {
                path: path.to_path_buf(),
                extension: path
                    .extension()
                    .map(|ext| ext.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                kind,
                supported: "none, history is written with record_message".to_string(),
            }),
        }
    }

    /// Queues uploads to be ingested before the next prompt, replacing any
    /// earlier queue.
    pub fn queue_files(&mut self, files: Vec<(String, PathBuf)>) {
        debug!(session = %self.session_id, queued = files.len(), "queued uploads");
        self.pending = files;
    }

    pub fn pending(&self) -> &[(String, PathBuf)] {
        &self.pending
    }

    /// Paths that the next prompt will prioritize.
    pub fn recent_uploads(&self) -> &[String] {
        &self.recent_uploads
    }

    /// Ingests the queued uploads, if any. Those that ingest become the
    /// prioritized paths of the next prompt.
    pub fn flush_pending(&mut self) -> Option<BatchReport> {
        if self.pending.is_empty() {
            return None;
        }
        let pending = std::mem::take(&mut self.pending);
        let report = self.process_files(&pending);
        self.recent_uploads.extend(
            report
                .items
                .iter()
                .filter(|item| matches!(item.outcome, ItemOutcome::Ingested { .. }))
                .map(|item| item.path.to_string_lossy().into_owned()),
        );
        Some(report)
    }

    /// Removes every record of each `(external_id, kind)`. Returns the
    /// number of records removed.
    pub fn delete_files(&self, files: &[(String, ContentKind)]) -> RagResult<usize> {
        let mut removed = 0;
        for (external_id, kind) in files {
            removed += match kind {
                ContentKind::Document => self.documents.write().delete(external_id)?,
                ContentKind::Image => self.images.write().delete(external_id)?,
                ContentKind::Audio => self.audio.write().delete(external_id)?,
                ContentKind::History => self.history.write().delete(external_id)?,
            };
        }
        Ok(removed)
    }

    /// Rebuilds one partition from its metadata. Returns its record count.
    pub fn rebuild(&self, kind: ContentKind) -> RagResult<usize> {
        match kind {
            ContentKind::Document => rebuild_partition(&self.documents),
            ContentKind::Image => rebuild_partition(&self.images),
            ContentKind::Audio => rebuild_partition(&self.audio),
            ContentKind::History => rebuild_partition(&self.history),
        }
    }

    fn repair(&self, kind: ContentKind) -> RagResult<()> {
        match kind {
            ContentKind::Document => repair_partition(&self.documents),
            ContentKind::Image => repair_partition(&self.images),
            ContentKind::Audio => repair_partition(&self.audio),
            ContentKind::History => repair_partition(&self.history),
        }
    }

    fn searchable(&self, kind: ContentKind) -> Arc<dyn PartitionSearch> {
        match kind {
            ContentKind::Document => self.documents.clone(),
            ContentKind::Image => self.images.clone(),
            ContentKind::Audio => self.audio.clone(),
            ContentKind::History => self.history.clone(),
        }
    }

    fn has_data(&self, kind: ContentKind) -> bool {
        match kind {
            ContentKind::Document => self.documents.read().data_exists(),
            ContentKind::Image => self.images.read().data_exists(),
            ContentKind::Audio => self.audio.read().data_exists(),
            ContentKind::History => self.history.read().data_exists(),
        }
    }

    /// Configured retrieval kinds, in order, without repeats.
    fn retrieval_kinds(&self) -> Vec<ContentKind> {
        let mut kinds = Vec::new();
        for kind in &self.settings.retrieval.kinds {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        kinds
    }

    /// Ranked search over the configured partitions.
    pub fn search(&self, query: &str, prioritized: &[String], k: usize) -> RagResult<Vec<SearchResult>> {
        let mut retriever = MultiIndexRetriever::new(Arc::clone(&self.embedder));
        for kind in self.retrieval_kinds() {
            self.repair(kind)?;
            retriever = retriever.with_partition(self.searchable(kind));
        }
        retriever.search_all(query, prioritized, k)
    }

    /// Builds the messages for one turn.
    ///
    /// Queued uploads are ingested first and prioritized. Retrieval only
    /// runs when a searchable partition holds data, with
    /// `max(uploads, 1) * top_k_per_upload` results.
    pub fn prepare_prompt(&mut self, user_prompt: &str) -> RagResult<Vec<ChatMessage>> {
        if let Some(report) = self.flush_pending() {
            debug!(added = report.added, failed = report.failed, "flushed uploads before prompt");
        }
        let uploads = self.recent_uploads.clone();

        let searchable = self
            .retrieval_kinds()
            .into_iter()
            .any(|kind| self.has_data(kind));
        let results = if searchable {
            let k = uploads.len().max(1) * self.settings.retrieval.top_k_per_upload;
            Some(self.search(user_prompt, &uploads, k)?)
        } else {
            None
        };
        // Uploads stay prioritized until a prompt is built from them
        self.recent_uploads.clear();

        Ok(self
            .prompt_builder
            .build(user_prompt, &uploads, results.as_deref()))
    }

    /// Stores one chat message. Without an id, one is derived from the
    /// role and time.
    pub fn record_message(
        &self,
        external_id: Option<&str>,
        role: MessageRole,
        text: &str,
    ) -> RagResult<AddOutcome> {
        let timestamp = now_timestamp();
        let external_id = match external_id {
            Some(id) => id.to_string(),
            None => format!("{role}-{}", (timestamp * 1_000_000.0) as i64),
        };
        self.history
            .write()
            .add_message(external_id, role, text, Some(timestamp))
    }

    /// The last `count` exchanges, newest first.
    pub fn recent_messages(&self, count: usize) -> Vec<HistoryRecord> {
        self.history.read().get_recent(count)
    }

    pub fn stats(&self) -> Vec<PartitionStats> {
        vec![
            partition_stats(&self.documents),
            partition_stats(&self.images),
            partition_stats(&self.audio),
            partition_stats(&self.history),
        ]
    }
}

fn rebuild_partition<R: ContentRecord>(partition: &Partition<R>) -> RagResult<usize> {
    let mut index = partition.write();
    index.rebuild()?;
    Ok(index.len())
}
