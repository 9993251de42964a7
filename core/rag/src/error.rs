//! Error types for the retrieval module.

use thiserror::Error;

/// Retrieval module error types.
#[derive(Debug, Error)]
pub enum RagError {
    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Reranking failed
    #[error("Rerank error: {0}")]
    Rerank(String),

    /// Vector store operation failed
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Document parsing failed (engine-level, retryable)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Input rejected before parsing (bad filename, unsupported type);
    /// never retried
    #[error("Validation error: {0}")]
    Validation(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// True for errors that must not be retried by the ingestion worker.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
