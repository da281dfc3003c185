//! Content partitions: one vector index plus metadata per kind of source.

pub mod chunking;
pub mod extract;
pub mod history;
pub mod index;
pub mod ingest;
pub mod record;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use chunking::TextSplitter;
pub use extract::{
    DocumentExtractor, ExtractedDocument, ExtractionError, Extractors, ImageAnalyzer,
    PlainTextExtractor, Transcriber, Transcription, UnavailableExtractor,
};
pub use index::{AddOutcome, ContentIndex, IngestReport};
pub use record::{
    AudioRecord, ContentRecord, DocumentRecord, HistoryRecord, IdentityKey, ImageRecord, MessageRole,
    Record,
};

/// The kinds of content a session keeps, each in its own partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Document,
    Image,
    Audio,
    History,
}

impl ContentKind {
    pub const ALL: [ContentKind; 4] = [
        ContentKind::Document,
        ContentKind::Image,
        ContentKind::Audio,
        ContentKind::History,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Document => "document",
            ContentKind::Image => "image",
            ContentKind::Audio => "audio",
            ContentKind::History => "history",
        }
    }

    /// File stem of the partition inside a session directory.
    pub fn file_stem(&self) -> &'static str {
        match self {
            ContentKind::Document => "doc.index",
            ContentKind::Image => "image.index",
            ContentKind::Audio => "audio.index",
            ContentKind::History => "history.index",
        }
    }

    /// Lowercase extensions routed to this kind. History has none.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ContentKind::Document => &["pdf", "docx", "notes", "txt"],
            ContentKind::Image => &["jpg", "png", "jpeg", "webp", "bmp"],
            ContentKind::Audio => &["mp3", "wav"],
            ContentKind::History => &[],
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.extensions().contains(&extension.as_str()))
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "document" | "doc" => Ok(ContentKind::Document),
            "image" => Ok(ContentKind::Image),
            "audio" => Ok(ContentKind::Audio),
            "history" => Ok(ContentKind::History),
            other => Err(format!(
                "unknown content kind '{other}' (expected document, image, audio or history)"
            )),
        }
    }
}

/// Lowercased extension of `path`, or an empty string.
pub(crate) fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}
