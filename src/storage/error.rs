use std::path::PathBuf;

use thiserror::Error;

use crate::vector::VectorStorageError;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Failed to parse '{path}': {reason}\nSuggestion: Remove the file and rebuild the partition"
    )]
    Parse { path: PathBuf, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Vector index storage error: {0}")]
    VectorIndex(#[from] VectorStorageError),
}

pub type StorageResult<T> = Result<T, StorageError>;
