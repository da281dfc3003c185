//! Metadata records stored per vector, one type per content kind.
//!
//! Field names on disk are shared with the JSON layout of existing index
//! directories: the caller's item id is stored as `id`, and the embedded
//! text as `text` (or `transcription` for audio).

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::content::ContentKind;

/// What a partition needs to know about its record type.
pub trait ContentRecord:
    Serialize + DeserializeOwned + Clone + std::fmt::Debug + Send + Sync + 'static
{
    const KIND: ContentKind;

    /// Caller-supplied id of the source item; shared by all its chunks.
    fn external_id(&self) -> &str;

    /// Exact text that was embedded for this record.
    fn embedding_text(&self) -> &str;

    fn source_path(&self) -> Option<&str>;

    /// Key under which two records count as the same content.
    ///
    /// `None` disables deduplication for the record.
    fn identity_key(&self) -> Option<IdentityKey>;

    fn into_record(self) -> Record;
}

/// Ordered fields that identify a record's content.
///
/// Fields are kept apart, so no text a field contains can make two distinct
/// records compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey(Vec<String>);

impl IdentityKey {
    fn new<'a>(fields: impl IntoIterator<Item = &'a str>) -> Self {
        Self(fields.into_iter().map(str::to_owned).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    #[serde(rename = "id")]
    pub external_id: String,
    pub path: String,
    pub text: String,
    pub title: String,
}

impl ContentRecord for DocumentRecord {
    const KIND: ContentKind = ContentKind::Document;

    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn embedding_text(&self) -> &str {
        &self.text
    }

    fn source_path(&self) -> Option<&str> {
        Some(&self.path)
    }

    fn identity_key(&self) -> Option<IdentityKey> {
        Some(IdentityKey::new([
            self.path.as_str(),
            self.text.as_str(),
            self.title.as_str(),
        ]))
    }

    fn into_record(self) -> Record {
        Record::Document(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(rename = "id")]
    pub external_id: String,
    pub path: String,
    pub text: String,
    /// Detected object labels; order is irrelevant.
    #[serde(default)]
    pub objects: BTreeSet<String>,
}

impl ContentRecord for ImageRecord {
    const KIND: ContentKind = ContentKind::Image;

    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn embedding_text(&self) -> &str {
        &self.text
    }

    fn source_path(&self) -> Option<&str> {
        Some(&self.path)
    }

    fn identity_key(&self) -> Option<IdentityKey> {
        let fields = [self.path.as_str(), self.text.as_str()];
        Some(IdentityKey::new(
            fields.into_iter().chain(self.objects.iter().map(String::as_str)),
        ))
    }

    fn into_record(self) -> Record {
        Record::Image(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioRecord {
    #[serde(rename = "id")]
    pub external_id: String,
    pub path: String,
    pub transcription: String,
    pub language: String,
}

impl ContentRecord for AudioRecord {
    const KIND: ContentKind = ContentKind::Audio;

    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn embedding_text(&self) -> &str {
        &self.transcription
    }

    fn source_path(&self) -> Option<&str> {
        Some(&self.path)
    }

    fn identity_key(&self) -> Option<IdentityKey> {
        Some(IdentityKey::new([
            self.path.as_str(),
            self.transcription.as_str(),
        ]))
    }

    fn into_record(self) -> Record {
        Record::Audio(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// One conversation message. Messages are never deduplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Message id; older history files carry none.
    #[serde(rename = "id", default)]
    pub external_id: String,
    pub role: MessageRole,
    pub text: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

impl ContentRecord for HistoryRecord {
    const KIND: ContentKind = ContentKind::History;

    fn external_id(&self) -> &str {
        &self.external_id
    }

    fn embedding_text(&self) -> &str {
        &self.text
    }

    fn source_path(&self) -> Option<&str> {
        None
    }

    fn identity_key(&self) -> Option<IdentityKey> {
        None
    }

    fn into_record(self) -> Record {
        Record::History(self)
    }
}

/// A record of any kind, as returned from cross-partition search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Record {
    Document(DocumentRecord),
    Image(ImageRecord),
    Audio(AudioRecord),
    History(HistoryRecord),
}

impl Record {
    pub fn kind(&self) -> ContentKind {
        match self {
            Record::Document(_) => ContentKind::Document,
            Record::Image(_) => ContentKind::Image,
            Record::Audio(_) => ContentKind::Audio,
            Record::History(_) => ContentKind::History,
        }
    }

    pub fn external_id(&self) -> &str {
        match self {
            Record::Document(r) => r.external_id(),
            Record::Image(r) => r.external_id(),
            Record::Audio(r) => r.external_id(),
            Record::History(r) => r.external_id(),
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            Record::Document(r) => r.source_path(),
            Record::Image(r) => r.source_path(),
            Record::Audio(r) => r.source_path(),
            Record::History(r) => r.source_path(),
        }
    }

    pub fn embedding_text(&self) -> &str {
        match self {
            Record::Document(r) => r.embedding_text(),
            Record::Image(r) => r.embedding_text(),
            Record::Audio(r) => r.embedding_text(),
            Record::History(r) => r.embedding_text(),
        }
    }
}
