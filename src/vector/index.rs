//! IVF-flat approximate nearest neighbor index.
//!
//! Vectors are kept in a flat row-major buffer addressed by [`VectorId`].
//! Until the index holds `train_threshold` vectors every search is
//! exhaustive. Past that point K-means partitions the vectors into inverted
//! lists and a search only scans the lists whose centroids are nearest to the
//! query.
//!
//! The index has no point deletion. Removing vectors means building a new
//! index from the survivors.

use std::collections::HashMap;

use crate::vector::clustering::{
    assign_to_nearest_centroid, kmeans_clustering, nearest_centroids, squared_l2_distance,
};
use crate::vector::types::{ClusterId, VectorDimension, VectorError, VectorId};

/// Minimum number of clusters for K-means clustering.
const MIN_CLUSTERS: usize = 1;

/// Maximum number of clusters for K-means clustering.
const MAX_CLUSTERS: usize = 100;

/// Seed for K-means++ so rebuilding from the same vectors is reproducible.
const TRAINING_SEED: u64 = 0x5eed_1d5;

/// Tuning knobs for the inverted-file layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IvfParams {
    /// Number of inverted lists scanned per query.
    pub nprobe: usize,

    /// Vector count at which the index first trains centroids.
    pub train_threshold: usize,

    /// Retrain once the index has grown by this factor since the last training.
    pub retrain_growth: f32,
}

impl Default for IvfParams {
    fn default() -> Self {
        Self {
            nprobe: 8,
            train_threshold: 256,
            retrain_growth: 2.0,
        }
    }
}

/// Approximate nearest neighbor index over fixed-dimension vectors.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    pub(crate) dimension: VectorDimension,
    pub(crate) params: IvfParams,

    /// Ids in insertion order; `ids[p]` owns `vectors[p * d..(p + 1) * d]`.
    pub(crate) ids: Vec<VectorId>,
    pub(crate) vectors: Vec<f32>,
    pub(crate) positions: HashMap<VectorId, usize>,

    pub(crate) centroids: Vec<Vec<f32>>,
    /// Positions per inverted list, parallel to `centroids`.
    pub(crate) lists: Vec<Vec<usize>>,
    /// Vector count at the last training, zero when untrained.
    pub(crate) trained_at: usize,
}

impl VectorIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new(dimension: VectorDimension, params: IvfParams) -> Self {
        Self {
            dimension,
            params,
            ids: Vec::new(),
            vectors: Vec::new(),
            positions: HashMap::new(),
            centroids: Vec::new(),
            lists: Vec::new(),
            trained_at: 0,
        }
    }

    /// Inserts a vector under `id`.
    ///
    /// The dimension and id are checked before anything is modified, so a
    /// rejected insert leaves the index untouched.
    pub fn insert(&mut self, id: VectorId, vector: &[f32]) -> Result<(), VectorError> {
        self.dimension.validate_vector(vector)?;
        if self.positions.contains_key(&id) {
            return Err(VectorError::DuplicateId(id.get()));
        }

        let position = self.ids.len();
        self.ids.push(id);
        self.vectors.extend_from_slice(vector);
        self.positions.insert(id, position);

        if self.is_trained() {
            let centroid_refs: Vec<&[f32]> = self.centroids.iter().map(|c| c.as_slice()).collect();
            let cluster = assign_to_nearest_centroid(vector, &centroid_refs);
            self.lists[cluster.index()].push(position);
        }

        // The vector is stored either way; a failed training keeps the
        // previous lists, which still cover every position.
        if let Err(e) = self.maybe_train() {
            tracing::warn!("keeping previous inverted lists: {e}");
        }
        Ok(())
    }

    /// Returns up to `k` nearest vectors as `(id, squared L2 distance)`,
    /// closest first. Equal distances are ordered by id.
    ///
    /// An empty index yields an empty list.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(VectorId, f32)>, VectorError> {
        self.dimension.validate_vector(query)?;

        if self.ids.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<(VectorId, f32)> = self
            .candidate_positions(query, k)
            .into_iter()
            .map(|position| {
                (
                    self.ids[position],
                    squared_l2_distance(query, self.vector_at(position)),
                )
            })
            .collect();

        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        hits.truncate(k);
        Ok(hits)
    }

    /// Positions worth scoring for `query`.
    ///
    /// Probes at least `nprobe` lists and keeps probing until `k` candidates
    /// are collected or every list has been visited.
    fn candidate_positions(&self, query: &[f32], k: usize) -> Vec<usize> {
        if !self.is_trained() {
            return (0..self.ids.len()).collect();
        }

        let centroid_refs: Vec<&[f32]> = self.centroids.iter().map(|c| c.as_slice()).collect();
        let ranked = nearest_centroids(query, &centroid_refs, centroid_refs.len());

        let mut candidates = Vec::new();
        for (probed, list) in ranked.into_iter().enumerate() {
            if probed >= self.params.nprobe && candidates.len() >= k {
                break;
            }
            candidates.extend_from_slice(&self.lists[list]);
        }
        candidates
    }

    fn maybe_train(&mut self) -> Result<(), VectorError> {
        let count = self.ids.len();
        let due = if self.is_trained() {
            count as f32 >= self.trained_at as f32 * self.params.retrain_growth
        } else {
            count >= self.params.train_threshold.max(1)
        };

        if due { self.train() } else { Ok(()) }
    }

    /// Recomputes centroids and inverted lists from every stored vector.
    pub fn train(&mut self) -> Result<(), VectorError> {
        let count = self.ids.len();
        if count == 0 {
            return Ok(());
        }

        let k = ((count as f32).sqrt().ceil() as usize).clamp(MIN_CLUSTERS, MAX_CLUSTERS);
        let vector_refs: Vec<&[f32]> = (0..count).map(|p| self.vector_at(p)).collect();
        let result = kmeans_clustering(&vector_refs, k, TRAINING_SEED)
            .map_err(|e| VectorError::ClusteringFailed(e.to_string()))?;

        // Assign against the final centroids so every vector sits in the list
        // of its nearest centroid, which is what search probes first.
        let centroid_refs: Vec<&[f32]> = result.centroids.iter().map(|c| c.as_slice()).collect();
        let mut lists = vec![Vec::new(); centroid_refs.len()];
        for (position, vector) in vector_refs.iter().enumerate() {
            lists[assign_to_nearest_centroid(vector, &centroid_refs).index()].push(position);
        }

        tracing::debug!(
            vectors = count,
            clusters = result.centroids.len(),
            iterations = result.iterations,
            "trained inverted lists"
        );

        self.centroids = result.centroids;
        self.lists = lists;
        self.trained_at = count;
        Ok(())
    }

    /// Returns the stored vector for `id`.
    #[must_use]
    pub fn get(&self, id: VectorId) -> Option<&[f32]> {
        self.positions.get(&id).map(|&p| self.vector_at(p))
    }

    /// Returns whether `id` is present.
    #[must_use]
    pub fn contains(&self, id: VectorId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = VectorId> + '_ {
        self.ids.iter().copied()
    }

    /// Number of stored vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn params(&self) -> IvfParams {
        self.params
    }

    /// Whether inverted lists are in use.
    #[must_use]
    pub fn is_trained(&self) -> bool {
        !self.centroids.is_empty()
    }

    /// Number of inverted lists, zero while the index is flat.
    #[must_use]
    pub fn list_count(&self) -> usize {
        self.centroids.len()
    }

    /// Cluster a stored vector belongs to, if the index is trained.
    #[must_use]
    pub fn cluster_of(&self, id: VectorId) -> Option<ClusterId> {
        let position = *self.positions.get(&id)?;
        self.lists
            .iter()
            .position(|list| list.contains(&position))
            .map(ClusterId::from_index)
    }

    pub(crate) fn vector_at(&self, position: usize) -> &[f32] {
        let d = self.dimension.get();
        &self.vectors[position * d..(position + 1) * d]
    }
}
