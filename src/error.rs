//! Error types for ingestion and retrieval.
//!
//! Lower layers have their own thiserror enums; [`RagError`] is what the
//! content partitions and the session return, with a stable status code and
//! recovery hints for the CLI.

use std::path::PathBuf;

use thiserror::Error;

use crate::content::{ContentKind, ExtractionError};
use crate::storage::StorageError;
use crate::vector::{VectorError, VectorStorageError};

#[derive(Error, Debug)]
pub enum RagError {
    #[error("File not found: '{path}'")]
    NotFound { path: PathBuf },

    #[error(
        "Unsupported file type '{extension}' for '{path}' in the {kind} partition. Supported types: {supported}"
    )]
    UnsupportedKind {
        path: PathBuf,
        extension: String,
        kind: ContentKind,
        supported: String,
    },

    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure the session was built with the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("The {kind} index is inconsistent with its metadata: {reason}")]
    CorruptIndex { kind: ContentKind, reason: String },

    #[error("Could not extract content from '{path}': {source}")]
    ExtractionFailure {
        path: PathBuf,
        #[source]
        source: ExtractionError,
    },

    #[error("Invalid session id '{session}': {reason}")]
    InvalidSession { session: String, reason: &'static str },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },
}

impl RagError {
    /// Get a stable status code for this error type.
    pub fn status_code(&self) -> String {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::UnsupportedKind { .. } => "UNSUPPORTED_KIND",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::CorruptIndex { .. } => "CORRUPT_INDEX",
            Self::ExtractionFailure { .. } => "EXTRACTION_FAILURE",
            Self::InvalidSession { .. } => "INVALID_SESSION",
            Self::Embedding(_) => "EMBEDDING_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::CorruptIndex { .. } => vec![
                "Run 'ragvault rebuild' to rebuild the partition from its metadata",
                "Searches repair stale partitions automatically before running",
            ],
            Self::DimensionMismatch { .. } => vec![
                "Check 'embedding.model' and 'vector.dimension' in settings.toml",
                "Run 'ragvault rebuild' after switching embedding models",
            ],
            Self::NotFound { .. } => vec!["Check that the file exists and the path is correct"],
            Self::UnsupportedKind { .. } => vec![
                "Documents: pdf, docx, notes, txt. Images: jpg, png, jpeg, webp, bmp. Audio: mp3, wav",
            ],
            Self::ExtractionFailure { .. } => vec![
                "Check that the file is readable and not corrupted",
                "Configure an extractor for this content kind",
            ],
            Self::Storage(_) => vec![
                "Check disk space and permissions in the index directory",
                "Run 'ragvault rebuild' if a partition file is damaged",
            ],
            Self::Embedding(_) => vec![
                "Ensure the embedding model is downloaded or network access is available",
            ],
            Self::Config { .. } => vec!["Run 'ragvault config' to inspect the effective settings"],
            Self::InvalidSession { .. } => {
                vec!["Use a plain name such as 'General' or 'project-x' for the session"]
            }
        }
    }
}

impl From<VectorError> for RagError {
    fn from(err: VectorError) -> Self {
        match err {
            VectorError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            VectorError::EmbeddingFailed(reason) => Self::Embedding(reason),
            other => Self::Config {
                reason: other.to_string(),
            },
        }
    }
}

impl From<VectorStorageError> for RagError {
    fn from(err: VectorStorageError) -> Self {
        Self::Storage(StorageError::VectorIndex(err))
    }
}

pub type RagResult<T> = Result<T, RagError>;
