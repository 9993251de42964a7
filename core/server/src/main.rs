//! Sage gRPC server binary.
//!
//! Composition root: builds every singleton (embedder, reranker, vector
//! store, chunk store, broker, LLM provider, control-plane client) once,
//! spawns the ingestion workers, and serves the two gRPC services.

use std::sync::{Arc, Mutex};

use sage_database::ChunkStore;
use sage_llm::create_provider;
use sage_rag::{DocumentParser, Embedder, Reranker, TokenBudgeter, VectorStore};
use sage_server::broker::TaskQueue;
use sage_server::chat::ChatService;
use sage_server::control_plane::ControlPlaneClient;
use sage_server::knowledge::KnowledgeBaseService;
use sage_server::pb::chat_service_server::ChatServiceServer;
use sage_server::pb::knowledge_base_service_server::KnowledgeBaseServiceServer;
use sage_server::worker::IngestWorker;
use sage_server::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sage_server=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Arc::new(Settings::from_env());
    tracing::info!(port = settings.service_port, "starting sage server");

    // Model runtimes load synchronously before anything is served.
    let embedder = Embedder::new(&settings.embedding_model_name)?;
    let dimension = embedder.dimension();
    let embedder = Arc::new(Mutex::new(embedder));
    let reranker = Arc::new(Mutex::new(Reranker::new(&settings.reranker_model_name)?));

    let vector_store =
        Arc::new(VectorStore::connect(settings.vector_store.clone(), dimension).await?);
    let chunk_store = ChunkStore::connect(&settings.database_url, 10).await?;
    let queue = TaskQueue::connect(&settings.broker_url).await?;
    let llm = create_provider(&settings.llm)?;
    let control_plane = Arc::new(ControlPlaneClient::new(settings.control_plane_addr.clone()));
    let parser = Arc::new(DocumentParser::new(settings.splitter)?);
    let budgeter = Arc::new(TokenBudgeter::new(
        &settings.llm.model,
        settings.max_context_tokens,
        settings.reserve_output_tokens,
    ));

    for worker_index in 0..settings.worker_count {
        let worker = Arc::new(IngestWorker::new(
            queue.clone(),
            chunk_store.clone(),
            Arc::clone(&vector_store),
            Arc::clone(&embedder),
            Arc::clone(&parser),
            Arc::clone(&control_plane),
            settings.max_file_size,
        ));
        tracing::info!(worker_index, "spawning ingestion worker");
        tokio::spawn(worker.run());
    }

    let chat = ChatService::new(
        llm,
        Arc::clone(&vector_store),
        chunk_store.clone(),
        Arc::clone(&embedder),
        Arc::clone(&reranker),
        budgeter,
        settings.vector_store.cache_score_threshold,
    );

    let knowledge = KnowledgeBaseService::new(
        queue.clone(),
        Arc::clone(&vector_store),
        settings.max_file_size,
    );

    let addr = format!("0.0.0.0:{}", settings.service_port).parse()?;
    tracing::info!(%addr, "serving gRPC");

    tonic::transport::Server::builder()
        .add_service(ChatServiceServer::new(chat))
        .add_service(KnowledgeBaseServiceServer::new(knowledge))
        .serve(addr)
        .await?;

    Ok(())
}
