//! Error types for the chunk store.

use thiserror::Error;

/// Chunk store error types.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Underlying SQL error
    #[error("Database error: {0}")]
    Sql(#[from] sqlx::Error),

    /// Connection pool setup failed
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type alias for chunk store operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
