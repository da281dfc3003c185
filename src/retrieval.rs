//! Ranked retrieval across several content partitions.
//!
//! The query is embedded once and every partition is searched with the same
//! vector. Hits are merged and ordered by a relevancy score: the raw
//! distance scaled by [`PRIORITIZED_WEIGHT`] when the hit's source path is
//! one of the prioritized paths, and by [`DEFAULT_WEIGHT`] otherwise.
//! Distances from different partitions are compared as they are.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::debug;

use crate::content::{ContentIndex, ContentKind, ContentRecord, Record};
use crate::error::RagResult;
use crate::vector::EmbeddingGenerator;

/// Distance multiplier for hits from prioritized paths.
pub const PRIORITIZED_WEIGHT: f32 = 0.75;

/// Distance multiplier for every other hit.
pub const DEFAULT_WEIGHT: f32 = 2.0;

/// A hydrated search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub record: Record,
    /// Squared L2 distance to the query.
    pub distance: f32,
    /// Ranking key; equals `distance` until a retriever weights it.
    pub relevancy: f32,
}

impl SearchResult {
    pub fn new(record: Record, distance: f32) -> Self {
        Self {
            record,
            distance,
            relevancy: distance,
        }
    }

    pub fn kind(&self) -> ContentKind {
        self.record.kind()
    }

    /// Whether the hit's source path is one of `prioritized`, compared exactly.
    pub fn is_prioritized(&self, prioritized: &[String]) -> bool {
        self.record
            .path()
            .is_some_and(|path| prioritized.iter().any(|p| p == path))
    }
}

/// A partition that can be searched with an embedded query.
pub trait PartitionSearch: Send + Sync {
    fn kind(&self) -> ContentKind;

    fn search_embedded(
        &self,
        query: &[f32],
        prioritized: &[String],
        k: usize,
    ) -> RagResult<Vec<SearchResult>>;
}

impl<R: ContentRecord> PartitionSearch for ContentIndex<R> {
    fn kind(&self) -> ContentKind {
        R::KIND
    }

    fn search_embedded(
        &self,
        query: &[f32],
        prioritized: &[String],
        k: usize,
    ) -> RagResult<Vec<SearchResult>> {
        ContentIndex::search_embedded(self, query, prioritized, k)
    }
}

impl<R: ContentRecord> PartitionSearch for RwLock<ContentIndex<R>> {
    fn kind(&self) -> ContentKind {
        R::KIND
    }

    fn search_embedded(
        &self,
        query: &[f32],
        prioritized: &[String],
        k: usize,
    ) -> RagResult<Vec<SearchResult>> {
        self.read().search_embedded(query, prioritized, k)
    }
}

/// Fans a query out to several partitions and merges the hits.
pub struct MultiIndexRetriever {
    embedder: Arc<dyn EmbeddingGenerator>,
    partitions: Vec<Arc<dyn PartitionSearch>>,
}

impl MultiIndexRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingGenerator>) -> Self {
        Self {
            embedder,
            partitions: Vec::new(),
        }
    }

    pub fn with_partition(mut self, partition: Arc<dyn PartitionSearch>) -> Self {
        self.partitions.push(partition);
        self
    }

    pub fn kinds(&self) -> Vec<ContentKind> {
        self.partitions.iter().map(|p| p.kind()).collect()
    }

    /// Returns the `k` best hits over all partitions.
    ///
    /// Each partition contributes at most `k` hits. The first failing
    /// partition aborts the search.
    pub fn search_all(
        &self,
        query: &str,
        prioritized: &[String],
        k: usize,
    ) -> RagResult<Vec<SearchResult>> {
        if k == 0 || self.partitions.is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed(query)?;
        let mut merged = Vec::new();
        for partition in &self.partitions {
            let hits = partition.search_embedded(&embedding, prioritized, k)?;
            debug!(kind = %partition.kind(), hits = hits.len(), "searched partition");
            merged.extend(hits);
        }

        Ok(rank(merged, prioritized, k))
    }
}

/// Weights, orders and truncates merged hits.
///
/// Ordering is by `(relevancy, distance)` ascending and stable, so hits that
/// tie keep the order in which partitions returned them.
pub fn rank(mut results: Vec<SearchResult>, prioritized: &[String], k: usize) -> Vec<SearchResult> {
    for result in &mut results {
        let weight = if result.is_prioritized(prioritized) {
            PRIORITIZED_WEIGHT
        } else {
            DEFAULT_WEIGHT
        };
        result.relevancy = result.distance * weight;
    }
    results.sort_by(|a, b| {
        a.relevancy
            .total_cmp(&b.relevancy)
            .then_with(|| a.distance.total_cmp(&b.distance))
    });
    results.truncate(k);
    results
}
