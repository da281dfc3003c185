//! Damaged partitions open stale, refuse searches and repair on demand.

use ragvault::RagError;
use ragvault::content::{ContentIndex, DocumentRecord};
use tempfile::TempDir;

use crate::support::{doc, open_partition, small_ivf};

fn seeded(dir: &std::path::Path) -> usize {
    let mut index = open_partition::<DocumentRecord>(dir, small_ivf());
    for (i, text) in ["north wing", "south wing", "east tower", "west tower"]
        .into_iter()
        .enumerate()
    {
        index
            .add(doc(&format!("r{i}"), "/plans/castle.txt", text))
            .unwrap();
    }
    index.len()
}

fn assert_corrupt(index: &ContentIndex<DocumentRecord>) {
    assert!(index.is_stale());
    match index.search("tower", &[], 2) {
        Err(RagError::CorruptIndex { reason, .. }) => println!("stale because: {reason}"),
        other => panic!("expected CorruptIndex, got {other:?}"),
    }
}

#[test]
fn test_garbage_index_file() {
    let temp_dir = TempDir::new().unwrap();
    let count = seeded(temp_dir.path());
    std::fs::write(temp_dir.path().join("doc.index"), b"definitely not an index").unwrap();

    let mut index = open_partition::<DocumentRecord>(temp_dir.path(), small_ivf());
    assert_corrupt(&index);
    // Metadata is still readable while stale
    assert_eq!(index.len(), count);

    assert!(index.repair().unwrap());
    index.verify_consistency().unwrap();
    let hits = index.search("east tower", &[], 1).unwrap();
    assert_eq!(hits[0].record.external_id(), "r2");
}

#[test]
fn test_truncated_index_file() {
    let temp_dir = TempDir::new().unwrap();
    seeded(temp_dir.path());
    let path = temp_dir.path().join("doc.index");
    let bytes = std::fs::read(&path).unwrap();
    std::fs::write(&path, &bytes[..bytes.len() - 7]).unwrap();

    let index = open_partition::<DocumentRecord>(temp_dir.path(), small_ivf());
    assert_corrupt(&index);
}

#[test]
fn test_id_counter_behind_records() {
    let temp_dir = TempDir::new().unwrap();
    seeded(temp_dir.path());
    std::fs::write(temp_dir.path().join("doc.index-id.json"), r#"{"last_id": 0}"#).unwrap();

    let mut index = open_partition::<DocumentRecord>(temp_dir.path(), small_ivf());
    assert_corrupt(&index);

    // The next mutation repairs first, so the new id cannot collide
    let outcome = index
        .add(doc("r9", "/plans/castle.txt", "drawbridge"))
        .unwrap();
    assert_eq!(outcome.id().map(|id| id.get()), Some(4));
    assert!(!index.is_stale());
    index.verify_consistency().unwrap();
}

#[test]
fn test_missing_metadata_with_index() {
    let temp_dir = TempDir::new().unwrap();
    seeded(temp_dir.path());
    std::fs::remove_file(temp_dir.path().join("doc.index-metadata.json")).unwrap();

    let mut index = open_partition::<DocumentRecord>(temp_dir.path(), small_ivf());
    assert_corrupt(&index);

    // Nothing to rebuild from: the partition comes back empty and usable
    assert!(index.repair().unwrap());
    assert!(index.is_empty());
    assert!(index.search("tower", &[], 3).unwrap().is_empty());
}

#[test]
fn test_unreadable_metadata_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    seeded(temp_dir.path());
    std::fs::write(temp_dir.path().join("doc.index-metadata.json"), "{ not json").unwrap();

    let result = ContentIndex::<DocumentRecord>::open(
        temp_dir.path(),
        crate::support::embedder(),
        small_ivf(),
    );
    match result {
        Err(err) => assert_eq!(err.status_code(), "STORAGE_ERROR"),
        Ok(_) => panic!("metadata that cannot be parsed must not open"),
    }
}
