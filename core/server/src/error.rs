//! Error types for the server crate.

use thiserror::Error;

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Chunk store failure (boxed to reduce enum size)
    #[error("Database error: {0}")]
    Database(Box<sage_database::DatabaseError>),

    /// Retrieval failure (boxed to reduce enum size)
    #[error("RAG error: {0}")]
    Rag(Box<sage_rag::RagError>),

    /// Broker failure
    #[error("Broker error: {0}")]
    Broker(#[from] redis::RedisError),

    /// Blocking task failure
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sage_database::DatabaseError> for ServerError {
    fn from(err: sage_database::DatabaseError) -> Self {
        Self::Database(Box::new(err))
    }
}

impl From<sage_rag::RagError> for ServerError {
    fn from(err: sage_rag::RagError) -> Self {
        Self::Rag(Box::new(err))
    }
}

impl ServerError {
    /// True for errors the ingestion worker must not retry.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Rag(e) if e.is_validation())
    }
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
