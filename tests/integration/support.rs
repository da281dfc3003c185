//! Shared fixtures: a deterministic embedder and partition helpers.

use std::path::Path;
use std::sync::Arc;

use ragvault::content::{ContentIndex, ContentRecord, DocumentRecord};
use ragvault::vector::{EmbeddingGenerator, IvfParams, VectorDimension, VectorError};

pub const DIMENSION: usize = 64;

/// Hashes lowercase words into buckets and normalizes.
///
/// Identical texts embed identically; texts sharing words land closer.
pub struct WordHashEmbedder {
    dimension: VectorDimension,
}

impl Default for WordHashEmbedder {
    fn default() -> Self {
        Self {
            dimension: VectorDimension::new(DIMENSION).unwrap(),
        }
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl EmbeddingGenerator for WordHashEmbedder {
    fn generate_embeddings(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, VectorError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vector = vec![0.05_f32; DIMENSION];
                for word in text.split_whitespace() {
                    let bucket = (fnv1a(&word.to_lowercase()) % DIMENSION as u64) as usize;
                    vector[bucket] += 1.0;
                }
                let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
                vector.iter().map(|v| v / norm).collect()
            })
            .collect())
    }

    fn dimension(&self) -> VectorDimension {
        self.dimension
    }
}

pub fn embedder() -> Arc<dyn EmbeddingGenerator> {
    Arc::new(WordHashEmbedder::default())
}

pub fn open_partition<R: ContentRecord>(dir: &Path, params: IvfParams) -> ContentIndex<R> {
    ContentIndex::open(dir, embedder(), params).unwrap()
}

pub fn doc(external_id: &str, path: &str, text: &str) -> DocumentRecord {
    DocumentRecord {
        external_id: external_id.to_string(),
        path: path.to_string(),
        text: text.to_string(),
        title: format!("{external_id} title"),
    }
}

/// Small threshold so tests exercise the trained (inverted list) path.
pub fn small_ivf() -> IvfParams {
    IvfParams {
        nprobe: 2,
        train_threshold: 12,
        retrain_growth: 2.0,
    }
}
