//! Cross-encoder reranking with fastembed.
//!
//! Blocking, like the embedder; async callers go through
//! `tokio::task::spawn_blocking`.

use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RagError, Result};

/// Metadata carried through reranking unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageMeta {
    /// Chunk id in the chunk store
    pub chunk_id: Uuid,
    /// Parent document id
    pub document_id: String,
    /// Original filename
    pub filename: String,
    /// 1-based page number, if any
    pub page: Option<i32>,
}

/// A candidate passage for reranking.
#[derive(Debug, Clone)]
pub struct Passage {
    /// Passage text scored against the query
    pub text: String,
    /// Opaque metadata, preserved unchanged
    pub meta: PassageMeta,
}

/// A passage with its rerank score.
#[derive(Debug, Clone)]
pub struct RankedPassage {
    /// The input passage
    pub passage: Passage,
    /// Cross-encoder relevance score
    pub score: f32,
}

/// Cross-encoder reranker.
pub struct Reranker {
    model: TextRerank,
}

impl Reranker {
    /// Create a reranker for the given model name.
    pub fn new(model_name: &str) -> Result<Self> {
        let options =
            RerankInitOptions::new(model_from_name(model_name)).with_show_download_progress(false);

        let model = TextRerank::try_new(options)
            .map_err(|e| RagError::Rerank(format!("Failed to initialize reranker: {e}")))?;

        tracing::info!(model = model_name, "reranker model loaded");

        Ok(Self { model })
    }

    /// Score passages against the query and return the best `top_k`.
    ///
    /// Output is strictly descending by score; ties keep input order.
    /// Empty input returns empty without touching the model.
    pub fn rerank(
        &mut self,
        query: &str,
        passages: Vec<Passage>,
        top_k: usize,
    ) -> Result<Vec<RankedPassage>> {
        if passages.is_empty() {
            return Ok(vec![]);
        }

        let documents: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();

        let mut results = self
            .model
            .rerank(query, documents, false, None)
            .map_err(|e| RagError::Rerank(format!("Rerank failed: {e}")))?;

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.index.cmp(&b.index))
        });

        let mut passages: Vec<Option<Passage>> = passages.into_iter().map(Some).collect();

        Ok(results
            .into_iter()
            .take(top_k)
            .filter_map(|r| {
                passages.get_mut(r.index)?.take().map(|passage| RankedPassage {
                    passage,
                    score: r.score,
                })
            })
            .collect())
    }
}

/// Map a configured model name to a fastembed reranker model.
fn model_from_name(name: &str) -> RerankerModel {
    match name {
        "BAAI/bge-reranker-base" => RerankerModel::BGERerankerBase,
        "jinaai/jina-reranker-v1-turbo-en" => RerankerModel::JINARerankerV1TurboEn,
        other => {
            tracing::warn!(
                model = other,
                "unknown reranker model, falling back to bge-reranker-base"
            );
            RerankerModel::BGERerankerBase
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(text: &str) -> Passage {
        Passage {
            text: text.to_string(),
            meta: PassageMeta {
                chunk_id: Uuid::new_v4(),
                document_id: "doc-1".to_string(),
                filename: "notes.txt".to_string(),
                page: Some(1),
            },
        }
    }

    #[test]
    fn test_model_name_fallback() {
        assert!(matches!(
            model_from_name("no-such-reranker"),
            RerankerModel::BGERerankerBase
        ));
    }

    #[test]
    #[ignore = "downloads the reranker model"]
    fn test_rerank_orders_and_truncates() {
        let mut reranker = Reranker::new("BAAI/bge-reranker-base").unwrap();

        let passages = vec![
            passage("The capital of France is Paris."),
            passage("Bananas are yellow."),
            passage("Paris is in France."),
        ];

        let ranked = reranker
            .rerank("What is the capital of France?", passages, 2)
            .unwrap();

        assert_eq!(ranked.len(), 2);
        assert!(ranked[0].score >= ranked[1].score);
    }

    #[test]
    #[ignore = "downloads the reranker model"]
    fn test_rerank_empty_short_circuits() {
        let mut reranker = Reranker::new("BAAI/bge-reranker-base").unwrap();
        let ranked = reranker.rerank("anything", vec![], 5).unwrap();
        assert!(ranked.is_empty());
    }
}
