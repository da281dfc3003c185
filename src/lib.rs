/// Session-scoped vector retrieval for a local RAG assistant
pub mod config;
pub mod content;
pub mod error;
pub mod io;
pub mod prompt;
pub mod retrieval;
pub mod session;
pub mod storage;
pub mod vector;

// Explicit exports for better API clarity
pub use config::Settings;
pub use content::{
    AddOutcome, AudioRecord, ContentIndex, ContentKind, ContentRecord, DocumentRecord, Extractors,
    HistoryRecord, ImageRecord, IngestReport, MessageRole, Record, TextSplitter,
};
pub use error::{RagError, RagResult};
pub use prompt::{ChatMessage, PromptBuilder};
pub use retrieval::{MultiIndexRetriever, PartitionSearch, SearchResult};
pub use session::{BatchReport, ItemOutcome, ItemReport, PartitionStats, SessionContext};
pub use storage::{IdAllocator, MetadataStore, StorageError, StorageResult};
pub use vector::{EmbeddingGenerator, IvfParams, VectorDimension, VectorId, VectorIndex};
