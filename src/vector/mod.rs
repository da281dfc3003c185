//! Vector storage and approximate nearest neighbor search.
//!
//! # Architecture
//! [`VectorIndex`] uses IVFFlat (Inverted File with Flat vectors) indexing
//! with K-means clustering once a partition is large enough, and exhaustive
//! search below that. Each index persists to a single binary file that is
//! replaced atomically and read back through a memory map.

mod clustering;
mod embedding;
mod index;
mod storage;
mod types;

pub use clustering::{
    ClusteringError, KMeansResult, assign_to_nearest_centroid, kmeans_clustering,
    nearest_centroids, squared_l2_distance,
};
#[cfg(test)]
pub use embedding::MockEmbeddingGenerator;
pub use embedding::{EmbeddingGenerator, FastEmbedGenerator, parse_embedding_model};
pub use index::{IvfParams, VectorIndex};
pub use storage::VectorStorageError;
pub use types::{ClusterId, VECTOR_DIMENSION_384, VectorDimension, VectorError, VectorId};
