//! Streaming chat pipeline.
//!
//! Embed the query once, try the semantic cache, then tenant-filtered
//! vector search, chunk hydration from PostgreSQL, cross-encoder
//! reranking, context budgeting, and finally the LLM stream relayed
//! chunk by chunk. The terminal message carries sources and timing; a
//! successful stream is written back to the cache off the client's path.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use futures::StreamExt;
use sage_database::ChunkStore;
use sage_llm::{ChatMessage, LlmProvider, DEFAULT_SYSTEM_PROMPT};
use sage_rag::{
    Embedder, Passage, PassageMeta, RankedPassage, Reranker, TenantScope, TokenBudgeter,
    VectorStore,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::metadata;
use crate::pb::{self, ChatRequest, ChatResponse, SourceDocument};

/// Answer when the user id header is missing.
const UNAUTHORIZED_ANSWER: &str = "Unauthorized: User ID not provided.";
/// Answer when the tenant-filtered search finds nothing.
const NO_DOCUMENTS_ANSWER: &str =
    "I couldn't find any relevant documents to answer your question.";
/// Answer when every vector hit points at a missing chunk row.
const NO_CONTENT_ANSWER: &str = "I couldn't find the document content. Please try again.";

/// Vector search depth before reranking.
const SEARCH_LIMIT: usize = 25;
/// Passages kept after reranking.
const RERANK_TOP_K: usize = 5;
/// Snippet length in the sources message.
const SNIPPET_CHARS: usize = 100;

/// Streaming chat service.
pub struct ChatService {
    llm: Arc<dyn LlmProvider>,
    vector_store: Arc<VectorStore>,
    chunk_store: ChunkStore,
    embedder: Arc<Mutex<Embedder>>,
    reranker: Arc<Mutex<Reranker>>,
    budgeter: Arc<TokenBudgeter>,
    cache_score_threshold: f32,
}

impl ChatService {
    /// Wire the service against shared components.
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        vector_store: Arc<VectorStore>,
        chunk_store: ChunkStore,
        embedder: Arc<Mutex<Embedder>>,
        reranker: Arc<Mutex<Reranker>>,
        budgeter: Arc<TokenBudgeter>,
        cache_score_threshold: f32,
    ) -> Self {
        Self {
            llm,
            vector_store,
            chunk_store,
            embedder,
            reranker,
            budgeter,
            cache_score_threshold,
        }
    }
}

#[tonic::async_trait]
impl pb::chat_service_server::ChatService for ChatService {
    type ChatStream = ReceiverStream<Result<ChatResponse, Status>>;

    async fn chat(
        &self,
        request: Request<ChatRequest>,
    ) -> Result<Response<Self::ChatStream>, Status> {
        let user_id = metadata::user_id(request.metadata());
        let organization_id = metadata::organization_id(request.metadata());
        let group_ids = metadata::group_ids(request.metadata());
        let history = metadata::chat_history(request.metadata());
        let request = request.into_inner();

        let (tx, rx) = mpsc::channel(32);

        let pipeline = Pipeline {
            llm: Arc::clone(&self.llm),
            vector_store: Arc::clone(&self.vector_store),
            chunk_store: self.chunk_store.clone(),
            embedder: Arc::clone(&self.embedder),
            reranker: Arc::clone(&self.reranker),
            budgeter: Arc::clone(&self.budgeter),
            cache_score_threshold: self.cache_score_threshold,
        };

        tokio::spawn(async move {
            pipeline
                .run(tx, request, user_id, organization_id, group_ids, history)
                .await;
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

/// One chat invocation's view of the shared components.
struct Pipeline {
    llm: Arc<dyn LlmProvider>,
    vector_store: Arc<VectorStore>,
    chunk_store: ChunkStore,
    embedder: Arc<Mutex<Embedder>>,
    reranker: Arc<Mutex<Reranker>>,
    budgeter: Arc<TokenBudgeter>,
    cache_score_threshold: f32,
}

type Sender = mpsc::Sender<Result<ChatResponse, Status>>;

impl Pipeline {
    async fn run(
        self,
        tx: Sender,
        request: ChatRequest,
        user_id: Option<i64>,
        organization_id: Option<i64>,
        group_ids: Vec<i64>,
        history: Vec<ChatMessage>,
    ) {
        let started = Instant::now();

        let Some(user_id) = user_id else {
            tracing::error!("user id not found in request metadata");
            let _ = tx.send(Ok(answer_message(UNAUTHORIZED_ANSWER))).await;
            return;
        };

        let scope = TenantScope::from_request(Some(user_id), organization_id, group_ids);

        tracing::info!(
            query = %request.query,
            session_id = %request.session_id,
            user_id,
            ?scope,
            "chat request"
        );

        // Every send can fail when the client hangs up; each stage bails
        // out at the next suspension point in that case.
        if let Err(ClientGone) = self.answer(&tx, &request, &scope, &history, started).await {
            tracing::debug!("client disconnected, abandoning chat pipeline");
        }
    }

    async fn answer(
        &self,
        tx: &Sender,
        request: &ChatRequest,
        scope: &TenantScope,
        history: &[ChatMessage],
        started: Instant,
    ) -> std::result::Result<(), ClientGone> {
        // 1) Embed the query once; the same vector drives cache lookup,
        //    search and the eventual cache save.
        let query_vector = match self.embed_query(&request.query).await {
            Ok(vector) => vector,
            Err(e) => {
                tracing::error!(error = %e, "query embedding failed");
                send(tx, Err(Status::internal("embedding failed"))).await?;
                return Ok(());
            }
        };

        // 2) Semantic cache.
        if let Some(hit) = self
            .vector_store
            .search_cache(query_vector.clone(), scope, self.cache_score_threshold)
            .await
        {
            send(
                tx,
                Ok(ChatResponse {
                    answer: hit.response_text,
                    source_documents: vec![],
                    processing_time_ms: 0.0,
                    is_cached: true,
                }),
            )
            .await?;

            send(
                tx,
                Ok(ChatResponse {
                    answer: String::new(),
                    source_documents: vec![],
                    processing_time_ms: elapsed_ms(started),
                    is_cached: true,
                }),
            )
            .await?;
            return Ok(());
        }

        // 3) Tenant-filtered vector search.
        let hits = match self
            .vector_store
            .search_docs(query_vector.clone(), scope, SEARCH_LIMIT)
            .await
        {
            Ok(hits) => hits,
            Err(e) => {
                tracing::error!(error = %e, "vector search failed");
                send(tx, Err(Status::internal("vector search failed"))).await?;
                return Ok(());
            }
        };

        if hits.is_empty() {
            tracing::info!("no documents found in tenant-scoped search");
            send(tx, Ok(answer_message(NO_DOCUMENTS_ANSWER))).await?;
            return Ok(());
        }

        // 4) Hydrate chunk content from the chunk store; hits whose row
        //    is gone are stale pointers and dropped.
        let chunk_ids: Vec<_> = hits.iter().map(|h| h.chunk_id).collect();
        let rows = match self.chunk_store.get_by_ids(&chunk_ids).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(error = %e, "chunk hydration failed");
                send(tx, Err(Status::internal("chunk hydration failed"))).await?;
                return Ok(());
            }
        };

        let row_by_id: std::collections::HashMap<_, _> =
            rows.into_iter().map(|row| (row.id, row)).collect();

        let passages: Vec<Passage> = hits
            .iter()
            .filter_map(|hit| {
                let row = row_by_id.get(&hit.chunk_id)?;
                Some(Passage {
                    text: row.content.clone(),
                    meta: PassageMeta {
                        chunk_id: hit.chunk_id,
                        document_id: row.document_id.clone(),
                        filename: hit.payload.filename.clone(),
                        page: row.page_number,
                    },
                })
            })
            .collect();

        if passages.is_empty() {
            tracing::warn!("no chunk rows found for vector hits");
            send(tx, Ok(answer_message(NO_CONTENT_ANSWER))).await?;
            return Ok(());
        }

        // 5) Rerank and keep the best few.
        tracing::info!(candidates = passages.len(), "reranking passages");
        let ranked = match self.rerank(&request.query, passages).await {
            Ok(ranked) => ranked,
            Err(e) => {
                tracing::error!(error = %e, "rerank failed");
                send(tx, Err(Status::internal("rerank failed"))).await?;
                return Ok(());
            }
        };

        // 6) Fit the context into the token budget, dropping from the
        //    low-scored tail first.
        let doc_texts: Vec<&str> = ranked.iter().map(|r| r.passage.text.as_str()).collect();
        let history_texts: Vec<String> = history.iter().map(|h| h.content.clone()).collect();
        let (selected, _) = self.budgeter.select_context(
            DEFAULT_SYSTEM_PROMPT,
            &request.query,
            &doc_texts,
            &history_texts,
        );
        let context_docs: Vec<String> = selected
            .iter()
            .map(|&i| ranked[i].passage.text.clone())
            .collect();

        tracing::info!(selected = context_docs.len(), "context selected after budget");

        // 7) Relay the LLM stream. Synthetic error chunks are forwarded
        //    so the user sees them, but suppress the sources message and
        //    the cache save.
        let mut stream = self
            .llm
            .generate(&request.query, context_docs, history.to_vec());

        let mut full_response = String::new();
        let mut llm_error = false;

        while let Some(chunk) = stream.next().await {
            if chunk.starts_with("Error") {
                llm_error = true;
            }
            full_response.push_str(&chunk);

            send(
                tx,
                Ok(ChatResponse {
                    answer: chunk,
                    source_documents: vec![],
                    processing_time_ms: 0.0,
                    is_cached: false,
                }),
            )
            .await?;
        }

        if llm_error {
            return Ok(());
        }

        // 8) Terminal message: sources and timing.
        send(
            tx,
            Ok(ChatResponse {
                answer: String::new(),
                source_documents: ranked.iter().map(source_from).collect(),
                processing_time_ms: elapsed_ms(started),
                is_cached: false,
            }),
        )
        .await?;

        // 9) Cache writeback, off the client's path.
        if !full_response.is_empty() {
            let store = Arc::clone(&self.vector_store);
            let scope = scope.clone();
            tokio::spawn(async move {
                store.save_cache(query_vector, &full_response, &scope).await;
            });
        }

        Ok(())
    }

    async fn embed_query(&self, query: &str) -> sage_rag::Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        let query = query.to_string();

        tokio::task::spawn_blocking(move || {
            let mut embedder = embedder.lock().map_err(|_| {
                sage_rag::RagError::Embedding("Failed to lock embedder".to_string())
            })?;
            embedder.embed_query(&query)
        })
        .await
        .map_err(|e| sage_rag::RagError::Embedding(format!("Embedding task failed: {e}")))?
    }

    async fn rerank(
        &self,
        query: &str,
        passages: Vec<Passage>,
    ) -> sage_rag::Result<Vec<RankedPassage>> {
        let reranker = Arc::clone(&self.reranker);
        let query = query.to_string();

        tokio::task::spawn_blocking(move || {
            let mut reranker = reranker
                .lock()
                .map_err(|_| sage_rag::RagError::Rerank("Failed to lock reranker".to_string()))?;
            reranker.rerank(&query, passages, RERANK_TOP_K)
        })
        .await
        .map_err(|e| sage_rag::RagError::Rerank(format!("Rerank task failed: {e}")))?
    }
}

/// Marker for a disconnected client.
struct ClientGone;

async fn send(
    tx: &Sender,
    message: Result<ChatResponse, Status>,
) -> std::result::Result<(), ClientGone> {
    tx.send(message).await.map_err(|_| ClientGone)
}

/// A plain answer message with no sources.
fn answer_message(answer: &str) -> ChatResponse {
    ChatResponse {
        answer: answer.to_string(),
        source_documents: vec![],
        processing_time_ms: 0.0,
        is_cached: false,
    }
}

/// Build the sources entry for a reranked passage.
fn source_from(ranked: &RankedPassage) -> SourceDocument {
    SourceDocument {
        document_id: ranked.passage.meta.document_id.clone(),
        filename: ranked.passage.meta.filename.clone(),
        page_number: ranked.passage.meta.page.unwrap_or(1),
        snippet: snippet(&ranked.passage.text),
        score: ranked.score,
    }
}

/// First 100 characters with newlines flattened, plus an ellipsis.
fn snippet(text: &str) -> String {
    let head: String = text.chars().take(SNIPPET_CHARS).collect();
    format!("{}...", head.replace('\n', " "))
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn ranked(text: &str, score: f32) -> RankedPassage {
        RankedPassage {
            passage: Passage {
                text: text.to_string(),
                meta: PassageMeta {
                    chunk_id: Uuid::new_v4(),
                    document_id: "doc-1".to_string(),
                    filename: "notes.pdf".to_string(),
                    page: Some(2),
                },
            },
            score,
        }
    }

    #[test]
    fn test_snippet_truncates_and_flattens() {
        let text = format!("line one\nline two {}", "x".repeat(200));
        let result = snippet(&text);

        assert!(result.ends_with("..."));
        assert!(!result.contains('\n'));
        assert_eq!(result.chars().count(), SNIPPET_CHARS + 3);
    }

    #[test]
    fn test_snippet_short_text() {
        assert_eq!(snippet("short"), "short...");
    }

    #[test]
    fn test_source_from_ranked_passage() {
        let source = source_from(&ranked("Paris is the capital of France.", 0.93));

        assert_eq!(source.document_id, "doc-1");
        assert_eq!(source.filename, "notes.pdf");
        assert_eq!(source.page_number, 2);
        assert_eq!(source.score, 0.93);
        assert_eq!(source.snippet, "Paris is the capital of France....");
    }

    #[test]
    fn test_source_defaults_missing_page_to_one() {
        let mut passage = ranked("text", 0.5);
        passage.passage.meta.page = None;
        assert_eq!(source_from(&passage).page_number, 1);
    }

    #[test]
    fn test_answer_message_shape() {
        let message = answer_message(UNAUTHORIZED_ANSWER);
        assert_eq!(message.answer, UNAUTHORIZED_ANSWER);
        assert!(message.source_documents.is_empty());
        assert!(!message.is_cached);
        assert_eq!(message.processing_time_ms, 0.0);
    }
}
