//! Corpus ingestion, chunking, and the vector index they feed.

pub mod document;
pub mod error;
pub mod in_memory_store;
pub mod index;
pub mod sqlite_store;
pub mod vector_store;

pub use error::MemoryError;
pub use in_memory_store::InMemoryVectorStore;
pub use index::{CorpusIndex, RebuildStats, RetrievedChunk};
pub use sqlite_store::SqliteVectorStore;
pub use vector_store::VectorStore;
