//! Embedding generation with fastembed.
//!
//! The embedder is CPU-bound; async callers must run it through
//! `tokio::task::spawn_blocking`.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::error::{RagError, Result};

/// Probe string used to discover the output dimension at startup.
const DIMENSION_PROBE: &str = "dimension probe";

/// Text embedder.
pub struct Embedder {
    model: TextEmbedding,
    dimension: usize,
}

impl Embedder {
    /// Create an embedder for the given model name.
    ///
    /// Unknown names fall back to all-MiniLM-L6-v2. The output dimension
    /// is discovered by embedding a probe string once.
    pub fn new(model_name: &str) -> Result<Self> {
        let options =
            InitOptions::new(model_from_name(model_name)).with_show_download_progress(false);

        let mut model = TextEmbedding::try_new(options).map_err(|e| {
            RagError::Embedding(format!("Failed to initialize embedding model: {e}"))
        })?;

        let probe = model
            .embed(vec![DIMENSION_PROBE.to_string()], None)
            .map_err(|e| RagError::Embedding(format!("Probe embedding failed: {e}")))?;

        let dimension = probe
            .first()
            .map(|v| v.len())
            .ok_or_else(|| RagError::Embedding("No embedding generated for probe".to_string()))?;

        tracing::info!(model = model_name, dimension, "embedding model loaded");

        Ok(Self { model, dimension })
    }

    /// Output dimension of the model.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Generate embeddings for multiple texts.
    pub fn embed(&mut self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        self.model
            .embed(texts, None)
            .map_err(|e| RagError::Embedding(format!("Batch embedding failed: {e}")))
    }

    /// Generate an embedding for a single query.
    pub fn embed_query(&mut self, query: &str) -> Result<Vec<f32>> {
        self.embed(vec![query.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("No embedding generated".to_string()))
    }
}

/// Map a configured model name to a fastembed model.
fn model_from_name(name: &str) -> EmbeddingModel {
    match name {
        "sentence-transformers/all-MiniLM-L6-v2" => EmbeddingModel::AllMiniLML6V2,
        "BAAI/bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        "BAAI/bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
        other => {
            tracing::warn!(
                model = other,
                "unknown embedding model, falling back to all-MiniLM-L6-v2"
            );
            EmbeddingModel::AllMiniLML6V2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_model_names() {
        assert!(matches!(
            model_from_name("BAAI/bge-small-en-v1.5"),
            EmbeddingModel::BGESmallENV15
        ));
        assert!(matches!(
            model_from_name("sentence-transformers/all-MiniLM-L6-v2"),
            EmbeddingModel::AllMiniLML6V2
        ));
    }

    #[test]
    fn test_unknown_model_falls_back() {
        assert!(matches!(
            model_from_name("no-such-model"),
            EmbeddingModel::AllMiniLML6V2
        ));
    }

    #[test]
    #[ignore = "downloads the embedding model"]
    fn test_embed_and_dimension() {
        let mut embedder = Embedder::new("sentence-transformers/all-MiniLM-L6-v2").unwrap();
        assert_eq!(embedder.dimension(), 384);

        let vectors = embedder
            .embed(vec!["Hello".to_string(), "World".to_string()])
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].len(), 384);
    }

    #[test]
    #[ignore = "downloads the embedding model"]
    fn test_embed_empty_short_circuits() {
        let mut embedder = Embedder::new("sentence-transformers/all-MiniLM-L6-v2").unwrap();
        let vectors = embedder.embed(vec![]).unwrap();
        assert!(vectors.is_empty());
    }
}
