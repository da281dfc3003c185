//! File ingestion for the document, image and audio partitions.
//!
//! Each source file is extracted by its collaborator, split into chunks and
//! added as one batch. Every chunk carries the caller's external id and the
//! file path as given.

use std::path::Path;

use tracing::info;

use crate::content::{
    AudioRecord, ContentIndex, ContentRecord, DocumentExtractor, DocumentRecord, ExtractionError,
    ImageAnalyzer, ImageRecord, IngestReport, TextSplitter, Transcriber, extension_of,
};
use crate::error::{RagError, RagResult};

/// Language recorded when the transcriber does not report one.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Rejects missing files and extensions the partition does not handle.
fn check_source<R: ContentRecord>(path: &Path) -> RagResult<()> {
    if !path.is_file() {
        return Err(RagError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let extension = extension_of(path);
    if !R::KIND.extensions().contains(&extension.as_str()) {
        return Err(RagError::UnsupportedKind {
            path: path.to_path_buf(),
            extension,
            kind: R::KIND,
            supported: R::KIND.extensions().join(", "),
        });
    }
    Ok(())
}

fn extraction_failure(path: &Path, err: ExtractionError) -> RagError {
    match err {
        ExtractionError::NotFound(path) => RagError::NotFound { path },
        source => RagError::ExtractionFailure {
            path: path.to_path_buf(),
            source,
        },
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn log_ingested(kind: &str, external_id: &str, path: &str, report: &IngestReport) {
    info!(
        kind,
        external_id,
        path,
        added = report.added,
        duplicates = report.duplicates,
        "ingested file"
    );
}

impl ContentIndex<DocumentRecord> {
    /// Ingests a document. The title falls back to the file name.
    pub fn ingest(
        &mut self,
        external_id: &str,
        path: &Path,
        extractor: &dyn DocumentExtractor,
        splitter: &TextSplitter,
    ) -> RagResult<IngestReport> {
        check_source::<DocumentRecord>(path)?;
        let extracted = extractor
            .extract(path)
            .map_err(|e| extraction_failure(path, e))?;

        let title = extracted
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| file_name(path));
        let path_str = path.to_string_lossy().into_owned();

        let records: Vec<DocumentRecord> = splitter
            .split(&extracted.text)
            .into_iter()
            .map(|text| DocumentRecord {
                external_id: external_id.to_string(),
                path: path_str.clone(),
                text,
                title: title.clone(),
            })
            .collect();

        let report = self.add_batch(records)?;
        log_ingested("document", external_id, &path_str, &report);
        Ok(report)
    }
}

impl ContentIndex<ImageRecord> {
    /// Ingests an image by its OCR text; every chunk carries all detected
    /// objects. An image without text adds nothing.
    pub fn ingest(
        &mut self,
        external_id: &str,
        path: &Path,
        analyzer: &dyn ImageAnalyzer,
        splitter: &TextSplitter,
    ) -> RagResult<IngestReport> {
        check_source::<ImageRecord>(path)?;
        let text = analyzer
            .extract_text(path)
            .map_err(|e| extraction_failure(path, e))?;
        let objects = analyzer
            .detect_objects(path)
            .map_err(|e| extraction_failure(path, e))?;
        let path_str = path.to_string_lossy().into_owned();

        let records: Vec<ImageRecord> = splitter
            .split(&text)
            .into_iter()
            .map(|text| ImageRecord {
                external_id: external_id.to_string(),
                path: path_str.clone(),
                text,
                objects: objects.iter().cloned().collect(),
            })
            .collect();

        let report = self.add_batch(records)?;
        log_ingested("image", external_id, &path_str, &report);
        Ok(report)
    }
}

impl ContentIndex<AudioRecord> {
    /// Ingests a recording by its transcription.
    pub fn ingest(
        &mut self,
        external_id: &str,
        path: &Path,
        transcriber: &dyn Transcriber,
        splitter: &TextSplitter,
    ) -> RagResult<IngestReport> {
        check_source::<AudioRecord>(path)?;
        let transcription = transcriber
            .transcribe(path)
            .map_err(|e| extraction_failure(path, e))?;

        let language = transcription
            .language
            .filter(|language| !language.is_empty())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
        let path_str = path.to_string_lossy().into_owned();

        let records: Vec<AudioRecord> = splitter
            .split(&transcription.text)
            .into_iter()
            .map(|transcription| AudioRecord {
                external_id: external_id.to_string(),
                path: path_str.clone(),
                transcription,
                language: language.clone(),
            })
            .collect();

        let report = self.add_batch(records)?;
        log_ingested("audio", external_id, &path_str, &report);
        Ok(report)
    }
}
