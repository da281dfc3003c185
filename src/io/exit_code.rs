//! Exit codes for CLI operations following Unix conventions.
//!
//! - `0`: Success
//! - `1`: General error
//! - `2`: Blocking error, automation should halt
//! - `3-125`: Specific recoverable errors

use crate::error::RagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Critical error that should halt automation (code 2)
    BlockingError = 2,

    /// Nothing matched, or a file does not exist (code 3)
    NotFound = 3,

    /// Content could not be extracted (code 4)
    ExtractionError = 4,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Partition is inconsistent with its metadata (code 7)
    IndexCorrupted = 7,

    /// File type not handled by any partition (code 8)
    UnsupportedOperation = 8,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl ExitCode {
    /// `Success` for a non-empty result, `NotFound` otherwise.
    pub fn from_results<T>(results: &[T]) -> Self {
        if results.is_empty() {
            ExitCode::NotFound
        } else {
            ExitCode::Success
        }
    }

    /// Maps an error to the exit code scripts can branch on.
    pub fn from_error(error: &RagError) -> Self {
        match error {
            RagError::NotFound { .. } => ExitCode::NotFound,
            RagError::CorruptIndex { .. } => ExitCode::IndexCorrupted,
            RagError::ExtractionFailure { .. } => ExitCode::ExtractionError,
            RagError::Storage(_) => ExitCode::IoError,
            RagError::Config { .. } | RagError::InvalidSession { .. } => ExitCode::ConfigError,
            RagError::UnsupportedKind { .. } => ExitCode::UnsupportedOperation,
            // A session built with another model cannot be searched at all
            RagError::DimensionMismatch { .. } => ExitCode::BlockingError,
            RagError::Embedding(_) => ExitCode::GeneralError,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::BlockingError => "Blocking error - automation should halt",
            ExitCode::NotFound => "Not found",
            ExitCode::ExtractionError => "Extraction error",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::IndexCorrupted => "Index corrupted",
            ExitCode::UnsupportedOperation => "Unsupported operation",
        }
    }
}
