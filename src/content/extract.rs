//! Interfaces to the extraction collaborators.
//!
//! Turning PDFs, images or audio into text needs models this crate does not
//! ship. Each collaborator is a trait; [`PlainTextExtractor`] handles the
//! formats that are already text and [`UnavailableExtractor`] stands in for
//! anything not configured.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::content::extension_of;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("File not found: '{0}'")]
    NotFound(PathBuf),

    #[error("Unsupported format for '{path}': {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    #[error("Extraction failed for '{path}': {reason}")]
    Failed { path: PathBuf, reason: String },

    #[error(
        "No {0} is configured\nSuggestion: Provide an extractor for this content kind when opening the session"
    )]
    Unavailable(&'static str),
}

impl ExtractionError {
    pub fn status_code(&self) -> String {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            Self::Failed { .. } => "EXTRACTION_FAILED",
            Self::Unavailable(_) => "EXTRACTOR_UNAVAILABLE",
        }
        .to_string()
    }
}

/// Text pulled from a document, with its title when the format has one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedDocument {
    pub text: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcription {
    pub text: String,
    pub language: Option<String>,
}

pub trait DocumentExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, ExtractionError>;
}

pub trait ImageAnalyzer: Send + Sync {
    /// Text visible in the image (OCR).
    fn extract_text(&self, path: &Path) -> Result<String, ExtractionError>;

    /// Labels of objects detected in the image.
    fn detect_objects(&self, path: &Path) -> Result<Vec<String>, ExtractionError>;
}

pub trait Transcriber: Send + Sync {
    fn transcribe(&self, path: &Path) -> Result<Transcription, ExtractionError>;
}

/// Reads `.txt` and `.notes` files as UTF-8.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub const EXTENSIONS: [&'static str; 2] = ["txt", "notes"];
}

impl DocumentExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedDocument, ExtractionError> {
        let extension = extension_of(path);
        if !Self::EXTENSIONS.contains(&extension.as_str()) {
            return Err(ExtractionError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: format!("plain text extractor cannot read '.{extension}' files"),
            });
        }

        let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ExtractionError::NotFound(path.to_path_buf()),
            _ => ExtractionError::Failed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })?;

        Ok(ExtractedDocument { text, title: None })
    }
}

/// Collaborator that is not configured; every call fails with
/// [`ExtractionError::Unavailable`].
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableExtractor;

impl DocumentExtractor for UnavailableExtractor {
    fn extract(&self, _path: &Path) -> Result<ExtractedDocument, ExtractionError> {
        Err(ExtractionError::Unavailable("document extractor"))
    }
}

impl ImageAnalyzer for UnavailableExtractor {
    fn extract_text(&self, _path: &Path) -> Result<String, ExtractionError> {
        Err(ExtractionError::Unavailable("image analyzer"))
    }

    fn detect_objects(&self, _path: &Path) -> Result<Vec<String>, ExtractionError> {
        Err(ExtractionError::Unavailable("image analyzer"))
    }
}

impl Transcriber for UnavailableExtractor {
    fn transcribe(&self, _path: &Path) -> Result<Transcription, ExtractionError> {
        Err(ExtractionError::Unavailable("transcriber"))
    }
}

/// The collaborators a session ingests with.
#[derive(Clone)]
pub struct Extractors {
    pub document: Arc<dyn DocumentExtractor>,
    pub image: Arc<dyn ImageAnalyzer>,
    pub audio: Arc<dyn Transcriber>,
}

impl Default for Extractors {
    fn default() -> Self {
        Self {
            document: Arc::new(PlainTextExtractor),
            image: Arc::new(UnavailableExtractor),
            audio: Arc::new(UnavailableExtractor),
        }
    }
}

impl std::fmt::Debug for Extractors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extractors").finish_non_exhaustive()
    }
}
