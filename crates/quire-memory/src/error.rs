#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("vector store error: {0}")]
    VectorStore(#[from] crate::vector_store::VectorStoreError),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("embedding failed: {0}")]
    Llm(#[from] quire_llm::LlmError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document error: {0}")]
    Document(#[from] crate::document::DocumentError),

    #[error("index has not been built")]
    IndexNotBuilt,

    #[error("embedding dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{0}")]
    Other(String),
}
