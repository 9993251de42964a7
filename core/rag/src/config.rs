//! Configuration for the retrieval module.

use serde::{Deserialize, Serialize};

/// Vector store connection and collection names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Qdrant host
    pub host: String,
    /// Qdrant gRPC port
    pub port: u16,
    /// Collection holding document chunk vectors
    pub docs_collection: String,
    /// Collection holding semantic cache entries
    pub cache_collection: String,
    /// Minimum cosine similarity for a cache hit
    pub cache_score_threshold: f32,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6334,
            docs_collection: "sage_docs".to_string(),
            cache_collection: "sage_cache".to_string(),
            cache_score_threshold: 0.95,
        }
    }
}

impl VectorStoreConfig {
    /// Qdrant connection URL.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Text splitter configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = VectorStoreConfig::default();
        assert_eq!(config.url(), "http://localhost:6334");
        assert_eq!(config.cache_score_threshold, 0.95);
    }

    #[test]
    fn test_default_splitter() {
        let config = SplitterConfig::default();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 50);
    }
}
