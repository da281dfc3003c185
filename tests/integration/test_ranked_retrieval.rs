//! Ranking across partitions and the history window, on real partitions.

use std::sync::Arc;

use parking_lot::RwLock;
use ragvault::content::{ContentIndex, DocumentRecord, HistoryRecord, ImageRecord, MessageRole};
use ragvault::retrieval::{DEFAULT_WEIGHT, MultiIndexRetriever, PRIORITIZED_WEIGHT, SearchResult};
use ragvault::vector::IvfParams;
use tempfile::TempDir;

use crate::support::{doc, embedder, open_partition};

fn image(id: &str, path: &str, text: &str) -> ImageRecord {
    ImageRecord {
        external_id: id.to_string(),
        path: path.to_string(),
        text: text.to_string(),
        objects: Default::default(),
    }
}

fn build(dir: &std::path::Path) -> MultiIndexRetriever {
    let mut documents = open_partition::<DocumentRecord>(dir, IvfParams::default());
    for (i, text) in [
        "photosynthesis converts light into chemical energy",
        "mitochondria produce energy for the cell",
        "the french revolution began in 1789",
        "light travels faster than sound",
    ]
    .into_iter()
    .enumerate()
    {
        documents
            .add(doc(&format!("d{i}"), &format!("/docs/d{i}.txt"), text))
            .unwrap();
    }

    let mut images = open_partition::<ImageRecord>(dir, IvfParams::default());
    images
        .add(image("i0", "/pics/leaf.png", "diagram of light and chlorophyll"))
        .unwrap();
    images
        .add(image("i1", "/pics/map.png", "map of paris in 1789"))
        .unwrap();

    MultiIndexRetriever::new(embedder())
        .with_partition(Arc::new(RwLock::new(documents)))
        .with_partition(Arc::new(RwLock::new(images)))
}

fn summary(results: &[SearchResult]) -> Vec<(String, f32)> {
    results
        .iter()
        .map(|r| (r.record.external_id().to_string(), r.relevancy))
        .collect()
}

#[test]
fn test_ranking_is_deterministic_and_weighted() {
    let temp_dir = TempDir::new().unwrap();
    let retriever = build(temp_dir.path());
    let prioritized = vec!["/pics/leaf.png".to_string()];

    let first = retriever.search_all("light energy", &prioritized, 4).unwrap();
    let second = retriever.search_all("light energy", &prioritized, 4).unwrap();
    assert_eq!(summary(&first), summary(&second));
    assert_eq!(first.len(), 4);

    for result in &first {
        let weight = if result.record.path() == Some("/pics/leaf.png") {
            PRIORITIZED_WEIGHT
        } else {
            DEFAULT_WEIGHT
        };
        assert_eq!(result.relevancy, result.distance * weight);
    }
    assert!(first.windows(2).all(|w| {
        (w[0].relevancy, w[0].distance) <= (w[1].relevancy, w[1].distance)
    }));
}

#[test]
fn test_prioritizing_promotes_a_hit() {
    let temp_dir = TempDir::new().unwrap();
    let retriever = build(temp_dir.path());

    let plain = retriever.search_all("map of paris in 1789", &[], 6).unwrap();
    let map_rank = plain
        .iter()
        .position(|r| r.record.external_id() == "i1")
        .unwrap();
    assert_eq!(map_rank, 0);

    let promoted_id = plain[plain.len() - 1].record.external_id().to_string();
    let promoted_path = plain[plain.len() - 1].record.path().unwrap().to_string();
    let weighted = retriever
        .search_all("map of paris in 1789", &[promoted_path], 6)
        .unwrap();
    let before = &plain[plain.len() - 1];
    let after = weighted
        .iter()
        .find(|r| r.record.external_id() == promoted_id)
        .unwrap();
    assert_eq!(after.distance, before.distance);
    assert!(after.relevancy < before.relevancy);
    // An exact match still wins: 0 * 2 is 0
    assert_eq!(weighted[0].record.external_id(), "i1");
}

#[test]
fn test_k_bounds_merged_results() {
    let temp_dir = TempDir::new().unwrap();
    let retriever = build(temp_dir.path());

    assert_eq!(retriever.search_all("energy", &[], 2).unwrap().len(), 2);
    // Six records exist across both partitions
    assert_eq!(retriever.search_all("energy", &[], 50).unwrap().len(), 6);
    assert!(retriever.search_all("energy", &[], 0).unwrap().is_empty());
}

#[test]
fn test_recent_window_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let mut history: ContentIndex<HistoryRecord> =
            ContentIndex::open(temp_dir.path(), embedder(), IvfParams::default()).unwrap();
        for i in 0..12 {
            let role = if i % 2 == 0 {
                MessageRole::User
            } else {
                MessageRole::Assistant
            };
            history
                .add_message(format!("m{i}"), role, format!("turn {i}"), Some(1_000.0 + i as f64))
                .unwrap();
        }
    }

    let history: ContentIndex<HistoryRecord> =
        ContentIndex::open(temp_dir.path(), embedder(), IvfParams::default()).unwrap();
    let recent = history.get_recent(5);
    let ids: Vec<&str> = recent.iter().map(|m| m.external_id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["m11", "m10", "m9", "m8", "m7", "m6", "m5", "m4", "m3", "m2"]
    );
    assert_eq!(recent[0].role, MessageRole::Assistant);
}
