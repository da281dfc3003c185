//! On-disk state of a content partition: metadata records, the id counter
//! and the shared file layout.

pub mod error;
pub mod id_allocator;
pub mod metadata;
pub mod persistence;

pub use error::{StorageError, StorageResult};
pub use id_allocator::IdAllocator;
pub use metadata::MetadataStore;
pub use persistence::{PartitionFiles, read_json, write_atomic, write_json_atomic};
