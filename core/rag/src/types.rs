//! Core types for the retrieval module.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload attached to every point in the documents collection.
///
/// Chunk content itself lives in PostgreSQL; the payload carries only the
/// references and tenancy fields needed for filtering and display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocPayload {
    /// Chunk id, equal to the point id
    pub chunk_id: Uuid,
    /// Parent document id (control-plane owned)
    pub document_id: String,
    /// Original filename, for display
    pub filename: String,
    /// Organization the document's group belongs to, if any
    pub organization_id: Option<i64>,
    /// Group the document belongs to (None for personal documents)
    pub group_id: Option<i64>,
    /// Uploading user id
    pub owner_id: Option<i64>,
}

/// A vector plus its payload, ready for upsert.
#[derive(Debug, Clone)]
pub struct DocPoint {
    /// Embedding of the chunk content
    pub vector: Vec<f32>,
    /// Point payload; `payload.chunk_id` becomes the point id
    pub payload: DocPayload,
}

/// A scored hit from the documents collection.
#[derive(Debug, Clone)]
pub struct DocHit {
    /// Chunk id of the matching point
    pub chunk_id: Uuid,
    /// Cosine similarity score
    pub score: f32,
    /// The stored payload
    pub payload: DocPayload,
}

/// A semantic cache hit.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit {
    /// The cached response text
    pub response_text: String,
    /// Cosine similarity between the query and the cached query
    pub score: f32,
    /// Cache entry id
    pub cache_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_payload_roundtrip() {
        let payload = DocPayload {
            chunk_id: Uuid::new_v4(),
            document_id: "doc-1".to_string(),
            filename: "notes.pdf".to_string(),
            organization_id: Some(3),
            group_id: Some(10),
            owner_id: Some(7),
        };

        let json = serde_json::to_string(&payload).unwrap();
        let back: DocPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }
}
