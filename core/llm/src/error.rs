//! Error types for the LLM client.

use thiserror::Error;

/// LLM client error types.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP transport failure
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success status from the vendor API
    #[error("API error ({status}): {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// Malformed stream payload
    #[error("Stream error: {0}")]
    Stream(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for LLM operations.
pub type Result<T> = std::result::Result<T, LlmError>;
