//! Index/metadata agreement across add, delete, rebuild and reopen.

use std::collections::{BTreeMap, BTreeSet};

use ragvault::content::{AddOutcome, ContentIndex, DocumentRecord, ImageRecord};
use ragvault::retrieval::SearchResult;
use ragvault::vector::{IvfParams, VectorId};
use tempfile::TempDir;

use crate::support::{doc, open_partition, small_ivf};

fn ids(index: &ContentIndex<DocumentRecord>) -> Vec<u32> {
    index.records().map(|(id, _)| id.get()).collect()
}

/// Text to (external id, vector) for every record outside `skip`.
fn survivors(
    index: &ContentIndex<DocumentRecord>,
    skip: &str,
) -> BTreeMap<String, (String, Vec<f32>)> {
    index
        .records()
        .filter(|(_, r)| r.external_id != skip)
        .map(|(id, r)| {
            let vector = index.vector(id).unwrap().to_vec();
            (r.text.clone(), (r.external_id.clone(), vector))
        })
        .collect()
}

fn topics() -> Vec<(String, String)> {
    let words = [
        "apple", "orbit", "violin", "granite", "harbor", "lantern", "meadow", "quartz", "saddle",
        "tundra", "walnut", "yonder", "cobalt", "dune", "ember", "fjord", "glacier", "hazel",
        "iris", "juniper",
    ];
    words
        .iter()
        .enumerate()
        .map(|(i, word)| (format!("item-{}", i % 7), format!("{word} notes number {i}")))
        .collect()
}

#[test]
fn test_repeated_add_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let mut index = open_partition::<DocumentRecord>(temp_dir.path(), IvfParams::default());

    let record = doc("a", "/docs/a.txt", "orbital mechanics primer");
    assert_eq!(index.add(record.clone()).unwrap(), AddOutcome::Inserted(VectorId::new(0)));
    for _ in 0..3 {
        assert_eq!(index.add(record.clone()).unwrap(), AddOutcome::Duplicate);
    }
    // Same text under another path is distinct content
    assert!(!index
        .add(doc("a", "/docs/b.txt", "orbital mechanics primer"))
        .unwrap()
        .is_skipped());

    assert_eq!(index.len(), 2);
    assert_eq!(index.last_id(), 1);
    index.verify_consistency().unwrap();
}

#[test]
fn test_image_identity_ignores_object_order() {
    let temp_dir = TempDir::new().unwrap();
    let mut index = open_partition::<ImageRecord>(temp_dir.path(), IvfParams::default());

    let first = ImageRecord {
        external_id: "img".into(),
        path: "/pics/board.png".into(),
        text: "sprint goals".into(),
        objects: ["whiteboard", "marker"].map(String::from).into_iter().collect(),
    };
    let mut second = first.clone();
    second.objects = ["marker", "whiteboard"].map(String::from).into_iter().collect();

    index.add(first).unwrap();
    assert!(index.add(second).unwrap().is_skipped());
    assert_eq!(index.len(), 1);
}

#[test]
fn test_image_text_and_labels_stay_distinct() {
    let temp_dir = TempDir::new().unwrap();
    let mut index = open_partition::<ImageRecord>(temp_dir.path(), IvfParams::default());

    let labelled = ImageRecord {
        external_id: "scan".into(),
        path: "/pics/scan.png".into(),
        text: "x".into(),
        objects: ["y"].map(String::from).into_iter().collect(),
    };
    let ocr_only = ImageRecord {
        text: "x\u{1f}y".into(),
        objects: Default::default(),
        ..labelled.clone()
    };

    assert!(!index.add(labelled).unwrap().is_skipped());
    assert!(!index.add(ocr_only).unwrap().is_skipped());
    assert_eq!(index.len(), 2);
}

#[test]
fn test_delete_removes_every_chunk_and_compacts_ids() {
    let temp_dir = TempDir::new().unwrap();
    let mut index = open_partition::<DocumentRecord>(temp_dir.path(), small_ivf());

    for (external_id, text) in topics() {
        index
            .add(doc(&external_id, &format!("/docs/{external_id}.txt"), &text))
            .unwrap();
    }
    assert_eq!(index.len(), 20);
    let untouched = survivors(&index, "item-3");

    let expected_removed = index.get_entries("item-3").len();
    assert_eq!(index.delete("item-3").unwrap(), expected_removed);

    assert!(index.get_entries("item-3").is_empty());
    // Every other record keeps its text, owner and vector
    assert_eq!(survivors(&index, "item-3"), untouched);
    assert!(index
        .search("walnut notes", &[], 20)
        .unwrap()
        .iter()
        .all(|hit| hit.record.external_id() != "item-3"));

    let remaining = index.len();
    assert_eq!(ids(&index), (0..remaining as u32).collect::<Vec<_>>());
    assert_eq!(index.last_id(), remaining as i64 - 1);
    index.verify_consistency().unwrap();

    // Unknown ids leave everything untouched
    assert_eq!(index.delete("item-3").unwrap(), 0);
    assert_eq!(index.len(), remaining);
}

#[test]
fn test_rebuild_keeps_order_and_bijection() {
    let temp_dir = TempDir::new().unwrap();
    let mut index = open_partition::<DocumentRecord>(temp_dir.path(), small_ivf());
    for (external_id, text) in topics() {
        index.add(doc(&external_id, "/docs/all.txt", &text)).unwrap();
    }
    let texts_before: Vec<String> = index.records().map(|(_, r)| r.text.clone()).collect();

    index.rebuild().unwrap();

    let texts_after: Vec<String> = index.records().map(|(_, r)| r.text.clone()).collect();
    assert_eq!(texts_before, texts_after);
    assert_eq!(ids(&index), (0..20).collect::<Vec<_>>());
    for (id, _) in index.records() {
        assert!(index.vector(id).is_some(), "vector {id} missing after rebuild");
    }
    index.verify_consistency().unwrap();
}

#[test]
fn test_state_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let before: Vec<(u32, String)>;
    let queries = ["glacier notes number 16", "harbor lantern", "cobalt"];
    let results_before: Vec<Vec<SearchResult>>;
    {
        let mut index = open_partition::<DocumentRecord>(temp_dir.path(), small_ivf());
        for (external_id, text) in topics() {
            index.add(doc(&external_id, "/docs/all.txt", &text)).unwrap();
        }
        index.delete("item-0").unwrap();
        before = index
            .records()
            .map(|(id, r)| (id.get(), r.text.clone()))
            .collect();
        results_before = queries
            .iter()
            .map(|q| index.search(q, &[], 5).unwrap())
            .collect();
    }

    let mut reopened = open_partition::<DocumentRecord>(temp_dir.path(), small_ivf());
    assert!(!reopened.is_stale());
    let after: Vec<(u32, String)> = reopened
        .records()
        .map(|(id, r)| (id.get(), r.text.clone()))
        .collect();
    assert_eq!(before, after);
    reopened.verify_consistency().unwrap();

    // Past the training threshold, so this covers the inverted lists
    for (query, expected) in queries.iter().zip(&results_before) {
        assert_eq!(&reopened.search(query, &[], 5).unwrap(), expected, "{query}");
    }

    let hits = reopened.search("glacier notes number 16", &[], 3).unwrap();
    assert_eq!(hits[0].distance, 0.0);
    assert!(hits
        .iter()
        .any(|hit| hit.record.embedding_text() == "glacier notes number 16" && hit.distance == 0.0));

    // The counter resumes after the last surviving id
    let next = reopened
        .add(doc("fresh", "/docs/fresh.txt", "brand new material"))
        .unwrap();
    assert_eq!(next.id(), Some(VectorId::new(before.len() as u32)));

    let external: BTreeSet<String> = reopened.external_ids();
    assert!(!external.contains("item-0"));
    assert!(external.contains("fresh"));
}
