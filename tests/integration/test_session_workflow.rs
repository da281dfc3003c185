//! End to end through `SessionContext` with file-based configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ragvault::content::{
    ContentKind, ExtractionError, Extractors, MessageRole, Transcriber, Transcription,
};
use ragvault::session::{self, ItemOutcome, SessionContext};
use ragvault::{RagError, Settings};
use tempfile::TempDir;

use crate::support::{DIMENSION, embedder};

struct ScriptedTranscriber;

impl Transcriber for ScriptedTranscriber {
    fn transcribe(&self, path: &Path) -> Result<Transcription, ExtractionError> {
        if path.to_string_lossy().contains("broken") {
            return Err(ExtractionError::Failed {
                path: path.to_path_buf(),
                reason: "decoder error".to_string(),
            });
        }
        Ok(Transcription {
            text: "standup recording about the release checklist".to_string(),
            language: Some("de".to_string()),
        })
    }
}

/// Writes a settings file and loads it the way the CLI does.
fn settings_for(root: &Path) -> Settings {
    let config = root.join("settings.toml");
    std::fs::write(
        &config,
        format!(
            r#"
index_base = "{}"

[chunking]
chunk_size = 60
chunk_overlap = 10

[vector]
dimension = {DIMENSION}
train_threshold = 8

[retrieval]
kinds = ["document", "audio"]
top_k_per_upload = 2
"#,
            root.join("index").display().to_string().replace('\\', "/")
        ),
    )
    .unwrap();
    Settings::load_from(&config).unwrap()
}

fn open(root: &Path, name: &str) -> SessionContext {
    SessionContext::open(
        settings_for(root),
        name,
        embedder(),
        Extractors {
            audio: Arc::new(ScriptedTranscriber),
            ..Extractors::default()
        },
    )
    .unwrap()
}

fn write(root: &Path, name: &str, contents: &str) -> PathBuf {
    let path = root.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_settings_file_shapes_the_session() {
    let temp_dir = TempDir::new().unwrap();
    let settings = settings_for(temp_dir.path());
    assert_eq!(settings.chunking.chunk_size, 60);
    assert_eq!(settings.vector.nprobe, 8);
    assert_eq!(
        settings.retrieval.kinds,
        vec![ContentKind::Document, ContentKind::Audio]
    );

    let session = open(temp_dir.path(), "course/bio-101");
    assert!(session.dir().ends_with("index/course/bio-101"));
    assert_eq!(session.stats().len(), 4);
}

#[test]
fn test_mixed_batch_keeps_going() {
    let temp_dir = TempDir::new().unwrap();
    let lecture = write(
        temp_dir.path(),
        "lecture.txt",
        "Cells divide by mitosis.\n\nMeiosis produces gametes with half the chromosomes.\n\nBoth start with DNA replication.",
    );
    let standup = write(temp_dir.path(), "standup.wav", "RIFF");
    let broken = write(temp_dir.path(), "broken.mp3", "ID3");
    let slides = write(temp_dir.path(), "slides.key", "keynote");

    let mut session = open(temp_dir.path(), "General");
    let report = session.process_files(&[
        ("lec".to_string(), lecture.clone()),
        ("std".to_string(), standup.clone()),
        ("brk".to_string(), broken),
        ("sld".to_string(), slides),
    ]);

    assert_eq!(report.items.len(), 4);
    assert_eq!(report.ingested(), 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 1);
    let lecture_chunks = match &report.items[0].outcome {
        ItemOutcome::Ingested { added, duplicates } => {
            assert_eq!(*duplicates, 0);
            *added
        }
        other => panic!("unexpected outcome {other:?}"),
    };
    assert!(lecture_chunks >= 2, "lecture should split into several chunks");
    assert!(matches!(
        &report.items[2].outcome,
        ItemOutcome::Failed { code, .. } if code == "EXTRACTION_FAILURE"
    ));
    assert_eq!(report.items[3].kind, None);

    // Ingested right away, so nothing waits to be prioritized
    assert!(session.recent_uploads().is_empty());

    let audio = session.audio().read().get_entries("std")[0].clone();
    assert_eq!(audio.language, "de");

    // Re-ingesting the same file only counts duplicates
    let again = session.process_files(&[("lec".to_string(), lecture)]);
    assert_eq!(again.added, 0);
    assert_eq!(again.duplicates, lecture_chunks);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["items"][0]["status"], "ingested");
    assert_eq!(json["items"][3]["status"], "skipped");
}

#[test]
fn test_prompt_flow_with_queued_upload() {
    let temp_dir = TempDir::new().unwrap();
    let notes = write(temp_dir.path(), "notes.txt", "release checklist: tag, build, publish");
    let recording = write(temp_dir.path(), "standup.mp3", "ID3");

    let mut session = open(temp_dir.path(), "General");
    session.process_files(&[("n".to_string(), notes)]);
    session.prepare_prompt("first question").unwrap();

    session.queue_files(vec![("rec".to_string(), recording.clone())]);
    let messages = session.prepare_prompt("what is on the release checklist?").unwrap();

    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::System);
    let system = &messages[0].content;
    assert!(system.contains(&recording.display().to_string()));
    assert!(system.contains("Transcribed Text: standup recording"));
    assert!(system.contains("Language: de"));
    assert_eq!(messages[1].content, "what is on the release checklist?");

    session
        .record_message(None, MessageRole::User, "what is on the release checklist?")
        .unwrap();
    session
        .record_message(None, MessageRole::Assistant, "tag, build and publish")
        .unwrap();
    let recent = session.recent_messages(1);
    assert_eq!(recent.len(), 2);
    assert!(recent[0].timestamp >= recent[1].timestamp);
}

#[test]
fn test_search_repairs_stale_partition() {
    let temp_dir = TempDir::new().unwrap();
    let notes = write(temp_dir.path(), "notes.txt", "quarterly budget review");
    {
        let mut session = open(temp_dir.path(), "General");
        session.process_files(&[("n".to_string(), notes)]);
    }
    let index_file = temp_dir.path().join("index/General/doc.index");
    std::fs::write(&index_file, b"garbage").unwrap();

    let session = open(temp_dir.path(), "General");
    assert!(session.stats()[0].stale.is_some());

    let hits = session.search("budget review", &[], 3).unwrap();
    assert_eq!(hits[0].record.external_id(), "n");
    assert!(session.stats()[0].stale.is_none());
}

#[test]
fn test_delete_and_drop_session() {
    let temp_dir = TempDir::new().unwrap();
    let notes = write(temp_dir.path(), "notes.txt", "quarterly budget review");
    let settings = settings_for(temp_dir.path());
    {
        let mut session = open(temp_dir.path(), "work");
        session.process_files(&[("n".to_string(), notes)]);
        assert_eq!(
            session
                .delete_files(&[("n".to_string(), ContentKind::Document)])
                .unwrap(),
            1
        );
        assert_eq!(
            session
                .delete_files(&[("n".to_string(), ContentKind::Document)])
                .unwrap(),
            0
        );
        assert!(session.search("budget", &[], 3).unwrap().is_empty());
    }

    assert!(session::remove_session(&settings, "work").unwrap());
    assert!(!temp_dir.path().join("index/work").exists());

    match session::remove_session(&settings, "../outside") {
        Err(RagError::InvalidSession { .. }) => {}
        other => panic!("expected InvalidSession, got {other:?}"),
    }
}
