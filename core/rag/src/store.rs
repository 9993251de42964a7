//! Tenant-scoped vector store backed by Qdrant.
//!
//! Two logical collections: document chunk vectors and the semantic
//! cache. Both are created at startup with cosine distance and the
//! embedder's output dimension. Document searches are always filtered by
//! tenant scope; cache reads and writes degrade to a miss/no-op on any
//! engine failure.

use std::collections::HashMap;

use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance,
    Filter, ListValue, PointId, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value,
    VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use uuid::Uuid;

use crate::config::VectorStoreConfig;
use crate::error::{RagError, Result};
use crate::scope::TenantScope;
use crate::types::{CacheHit, DocHit, DocPayload, DocPoint};

/// Vector store over the documents and cache collections.
pub struct VectorStore {
    client: Qdrant,
    config: VectorStoreConfig,
}

impl VectorStore {
    /// Connect to Qdrant and create missing collections.
    pub async fn connect(config: VectorStoreConfig, dimension: usize) -> Result<Self> {
        let client = Qdrant::from_url(&config.url())
            .build()
            .map_err(|e| RagError::VectorStore(format!("Failed to connect to Qdrant: {e}")))?;

        let store = Self { client, config };
        let docs = store.config.docs_collection.clone();
        let cache = store.config.cache_collection.clone();
        store.ensure_collection(&docs, dimension).await?;
        store.ensure_collection(&cache, dimension).await?;
        Ok(store)
    }

    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let exists = self
            .client
            .collection_exists(name)
            .await
            .map_err(|e| RagError::VectorStore(format!("Collection check failed: {e}")))?;

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(name).vectors_config(VectorParamsBuilder::new(
                        dimension as u64,
                        Distance::Cosine,
                    )),
                )
                .await
                .map_err(|e| RagError::VectorStore(format!("Collection create failed: {e}")))?;
            tracing::info!(collection = name, dimension, "created collection");
        }

        Ok(())
    }

    /// Upsert document chunk points. Point ids are the chunk ids, so
    /// re-ingesting a chunk overwrites its previous point.
    pub async fn upsert_documents(&self, points: Vec<DocPoint>) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }

        let count = points.len();
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| {
                let payload = Payload::from(doc_payload_map(&p.payload));
                PointStruct::new(p.payload.chunk_id.to_string(), p.vector, payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.config.docs_collection, points))
            .await
            .map_err(|e| RagError::VectorStore(format!("Upsert failed: {e}")))?;

        tracing::info!(count, "upserted document points");
        Ok(count)
    }

    /// Delete every point whose payload references the document. Idempotent.
    pub async fn delete_by_document(&self, document_id: &str) -> Result<()> {
        let filter = Filter::must([Condition::matches(
            "document_id",
            document_id.to_string(),
        )]);

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.config.docs_collection)
                    .points(filter)
                    .wait(true),
            )
            .await
            .map_err(|e| RagError::VectorStore(format!("Delete failed: {e}")))?;

        tracing::info!(document_id, "deleted document points");
        Ok(())
    }

    /// Tenant-scoped similarity search over document points.
    ///
    /// Group scopes filter by `group_id` membership, personal scope by
    /// `owner_id`. Without any scope the result is empty and the engine
    /// is never called; the organization id never filters documents.
    pub async fn search_docs(
        &self,
        query_vector: Vec<f32>,
        scope: &TenantScope,
        limit: usize,
    ) -> Result<Vec<DocHit>> {
        let filter = match doc_filter(scope) {
            Some(f) => f,
            None => {
                tracing::warn!("no group or user context provided, returning empty results");
                return Ok(vec![]);
            }
        };

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(
                    &self.config.docs_collection,
                    query_vector,
                    limit as u64,
                )
                .filter(filter)
                .with_payload(true),
            )
            .await
            .map_err(|e| RagError::VectorStore(format!("Search failed: {e}")))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| {
                let chunk_id = point.id.as_ref().and_then(point_id_to_uuid)?;
                let payload = doc_payload_from_map(chunk_id, &point.payload)?;
                Some(DocHit {
                    chunk_id,
                    score: point.score,
                    payload,
                })
            })
            .collect())
    }

    /// Look up a cached response for a query embedding.
    ///
    /// Returns at most the top-1 entry at or above `threshold` whose
    /// payload matches the scope. Any engine error is logged and treated
    /// as a miss.
    pub async fn search_cache(
        &self,
        query_vector: Vec<f32>,
        scope: &TenantScope,
        threshold: f32,
    ) -> Option<CacheHit> {
        let filter = cache_filter(scope)?;

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.config.cache_collection, query_vector, 1)
                    .filter(filter)
                    .with_payload(true)
                    .score_threshold(threshold),
            )
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(error = %e, "cache search failed, treating as miss");
                return None;
            }
        };

        let hit = response.result.into_iter().next()?;
        let cache_id = hit
            .id
            .as_ref()
            .and_then(point_id_to_uuid)
            .map(|u| u.to_string())
            .unwrap_or_default();
        let response_text = payload_str(&hit.payload, "response_text").unwrap_or_default();

        tracing::info!(score = hit.score, cache_id = %cache_id, "semantic cache hit");

        Some(CacheHit {
            response_text,
            score: hit.score,
            cache_id,
        })
    }

    /// Insert a response into the semantic cache.
    ///
    /// No-op without a scope identifier. Errors are logged and swallowed;
    /// returns the cache entry id when the insert succeeded.
    pub async fn save_cache(
        &self,
        query_vector: Vec<f32>,
        response_text: &str,
        scope: &TenantScope,
    ) -> Option<String> {
        if scope.is_none() {
            tracing::debug!("no cache scope context, skipping cache save");
            return None;
        }

        let cache_id = Uuid::new_v4().to_string();
        let payload = Payload::from(cache_payload_map(response_text, scope));
        let point = PointStruct::new(cache_id.clone(), query_vector, payload);

        let result = self
            .client
            .upsert_points(UpsertPointsBuilder::new(
                &self.config.cache_collection,
                vec![point],
            ))
            .await;

        match result {
            Ok(_) => {
                tracing::info!(cache_id = %cache_id, "saved cache entry");
                Some(cache_id)
            }
            Err(e) => {
                tracing::error!(error = %e, "cache save failed, skipping");
                None
            }
        }
    }
}

/// Build the document search filter for a scope; `None` means empty result.
fn doc_filter(scope: &TenantScope) -> Option<Filter> {
    if let Some(group_ids) = scope.group_ids() {
        Some(Filter::must([Condition::matches(
            "group_id",
            group_ids.to_vec(),
        )]))
    } else {
        scope
            .user_id()
            .map(|user_id| Filter::must([Condition::matches("owner_id", user_id)]))
    }
}

/// Build the cache search filter for a scope; `None` means skip the cache.
fn cache_filter(scope: &TenantScope) -> Option<Filter> {
    match scope {
        TenantScope::None => None,
        TenantScope::User { user_id } => {
            Some(Filter::must([Condition::matches("user_id", *user_id)]))
        }
        TenantScope::Groups { group_ids } => Some(Filter::must([Condition::matches(
            "group_ids",
            group_ids.clone(),
        )])),
        TenantScope::OrgGroups {
            organization_id,
            group_ids,
        } => Some(Filter::must([
            Condition::matches("organization_id", *organization_id),
            Condition::matches("group_ids", group_ids.clone()),
        ])),
    }
}

/// Build the cache entry payload for a scope.
fn cache_payload_map(response_text: &str, scope: &TenantScope) -> HashMap<String, Value> {
    let mut map: HashMap<String, Value> = HashMap::new();
    map.insert("response_text".to_string(), response_text.to_string().into());

    match scope {
        TenantScope::None => {}
        TenantScope::User { user_id } => {
            map.insert("user_id".to_string(), (*user_id).into());
        }
        TenantScope::Groups { group_ids } => {
            map.insert("group_ids".to_string(), int_list_value(group_ids));
        }
        TenantScope::OrgGroups {
            organization_id,
            group_ids,
        } => {
            map.insert("organization_id".to_string(), (*organization_id).into());
            map.insert("group_ids".to_string(), int_list_value(group_ids));
        }
    }

    map
}

fn int_list_value(values: &[i64]) -> Value {
    Value {
        kind: Some(Kind::ListValue(ListValue {
            values: values.iter().map(|v| Value::from(*v)).collect(),
        })),
    }
}

/// Convert a document payload to the stored Qdrant payload.
fn doc_payload_map(payload: &DocPayload) -> HashMap<String, Value> {
    let mut map: HashMap<String, Value> = HashMap::new();
    map.insert("chunk_id".to_string(), payload.chunk_id.to_string().into());
    map.insert(
        "document_id".to_string(),
        payload.document_id.clone().into(),
    );
    map.insert("filename".to_string(), payload.filename.clone().into());
    if let Some(org) = payload.organization_id {
        map.insert("organization_id".to_string(), org.into());
    }
    if let Some(group) = payload.group_id {
        map.insert("group_id".to_string(), group.into());
    }
    if let Some(owner) = payload.owner_id {
        map.insert("owner_id".to_string(), owner.into());
    }
    map
}

/// Rebuild a document payload from a stored point.
fn doc_payload_from_map(
    chunk_id: Uuid,
    payload: &HashMap<String, Value>,
) -> Option<DocPayload> {
    Some(DocPayload {
        chunk_id,
        document_id: payload_str(payload, "document_id")?,
        filename: payload_str(payload, "filename").unwrap_or_else(|| "unknown".to_string()),
        organization_id: payload_i64(payload, "organization_id"),
        group_id: payload_i64(payload, "group_id"),
        owner_id: payload_i64(payload, "owner_id"),
    })
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

fn payload_i64(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::IntegerValue(i) => Some(*i),
        _ => None,
    }
}

fn point_id_to_uuid(id: &PointId) -> Option<Uuid> {
    match id.point_id_options.as_ref()? {
        PointIdOptions::Uuid(s) => Uuid::parse_str(s).ok(),
        PointIdOptions::Num(_) => None,
    }
}
