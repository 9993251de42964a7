//! Ingestion worker.
//!
//! Pops one task at a time from the broker and runs the document
//! pipeline: verify, parse, persist chunks, embed, index. Transient
//! failures are redelivered with backoff up to the retry budget;
//! validation failures are terminal immediately. Whatever happens, a
//! terminal outcome is reported to the control plane exactly once and
//! the uploaded file is removed from disk.

use std::path::Path;
use std::sync::{Arc, Mutex};

use sage_database::{ChunkStore, NewChunk};
use sage_rag::{DocPayload, DocPoint, DocumentParser, Embedder, VectorStore};

use crate::broker::{backoff_delay, ProcessTask, TaskQueue};
use crate::control_plane::ControlPlaneClient;
use crate::error::{Result, ServerError};
use crate::pb::DocumentProcessingStatus;

/// Seconds a blocking queue pop waits before looping.
const POP_TIMEOUT_SECS: usize = 5;

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// Pipeline finished; the document is indexed (or legitimately empty).
    Completed {
        /// Number of chunks produced
        chunks_count: i32,
        /// Explanatory message for zero-chunk documents
        note: String,
    },
    /// Pipeline failed.
    Failed {
        /// Error description reported to the control plane
        message: String,
        /// Whether the broker should redeliver
        retryable: bool,
    },
}

impl TaskOutcome {
    /// The terminal status triple reported to the control plane.
    pub fn terminal_status(&self) -> (DocumentProcessingStatus, i32, &str) {
        match self {
            Self::Completed { chunks_count, note } => {
                (DocumentProcessingStatus::Completed, *chunks_count, note)
            }
            Self::Failed { message, .. } => (DocumentProcessingStatus::Error, 0, message),
        }
    }
}

/// True when the error should be retried by the broker.
fn retryable(error: &ServerError) -> bool {
    !error.is_validation()
}

/// Background worker executing ingestion tasks.
pub struct IngestWorker {
    queue: TaskQueue,
    chunk_store: ChunkStore,
    vector_store: Arc<VectorStore>,
    embedder: Arc<Mutex<Embedder>>,
    parser: Arc<DocumentParser>,
    control_plane: Arc<ControlPlaneClient>,
    max_file_size: u64,
}

impl IngestWorker {
    /// Wire a worker against shared components.
    pub fn new(
        queue: TaskQueue,
        chunk_store: ChunkStore,
        vector_store: Arc<VectorStore>,
        embedder: Arc<Mutex<Embedder>>,
        parser: Arc<DocumentParser>,
        control_plane: Arc<ControlPlaneClient>,
        max_file_size: u64,
    ) -> Self {
        Self {
            queue,
            chunk_store,
            vector_store,
            embedder,
            parser,
            control_plane,
            max_file_size,
        }
    }

    /// Run forever, one task at a time.
    pub async fn run(self: Arc<Self>) {
        tracing::info!("ingestion worker started");

        loop {
            match self.queue.pop(POP_TIMEOUT_SECS).await {
                Ok(Some(task)) => self.handle(task).await,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(error = %e, "broker pop failed, backing off");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Execute one task to a redelivery or a terminal outcome.
    async fn handle(&self, task: ProcessTask) {
        tracing::info!(
            task_id = %task.task_id,
            document_id = %task.document_id,
            filename = %task.filename,
            attempt = task.attempt,
            "processing document"
        );

        let outcome = self.run_pipeline(&task).await;

        if let TaskOutcome::Failed {
            message,
            retryable: true,
        } = &outcome
        {
            if task.can_retry() {
                tracing::warn!(
                    task_id = %task.task_id,
                    attempt = task.attempt,
                    error = %message,
                    "transient failure, redelivering"
                );

                tokio::time::sleep(backoff_delay(task.attempt)).await;
                match self.queue.enqueue(&task.clone().next_attempt()).await {
                    // Not terminal yet: the file stays on disk and no
                    // status is reported until the final attempt.
                    Ok(()) => return,
                    Err(e) => {
                        tracing::error!(error = %e, "redelivery failed, finalizing as error");
                    }
                }
            }
        }

        self.finalize(&task, &outcome).await;
    }

    /// The pipeline body. Every step can fail; classification into
    /// retryable/terminal happens here.
    async fn run_pipeline(&self, task: &ProcessTask) -> TaskOutcome {
        // Admission does not report status; the worker owns the
        // PROCESSING transition.
        self.control_plane
            .update_document_status(
                &task.document_id,
                DocumentProcessingStatus::Processing,
                0,
                "",
            )
            .await;

        let metadata = match tokio::fs::metadata(&task.file_path).await {
            Ok(metadata) => metadata,
            Err(_) => {
                return TaskOutcome::Failed {
                    message: format!("File not found: {}", task.file_path),
                    retryable: false,
                }
            }
        };

        if metadata.len() > self.max_file_size {
            return TaskOutcome::Failed {
                message: format!(
                    "File size ({}) exceeds maximum ({})",
                    metadata.len(),
                    self.max_file_size
                ),
                retryable: false,
            };
        }

        let chunks = match self.parse(task).await {
            Ok(chunks) => chunks,
            Err(e) => {
                return TaskOutcome::Failed {
                    message: e.to_string(),
                    retryable: retryable(&e),
                }
            }
        };

        if chunks.is_empty() {
            return TaskOutcome::Completed {
                chunks_count: 0,
                note: "No text extracted from document".to_string(),
            };
        }

        match self.persist_and_index(task, chunks).await {
            Ok(count) => TaskOutcome::Completed {
                chunks_count: count,
                note: String::new(),
            },
            Err(e) => TaskOutcome::Failed {
                message: e.to_string(),
                retryable: retryable(&e),
            },
        }
    }

    async fn parse(&self, task: &ProcessTask) -> Result<Vec<sage_rag::ParsedChunk>> {
        let parser = Arc::clone(&self.parser);
        let file_path = task.file_path.clone();
        let filename = task.filename.clone();

        let chunks = tokio::task::spawn_blocking(move || {
            parser.parse_file(Path::new(&file_path), &filename)
        })
        .await??;

        Ok(chunks)
    }

    async fn persist_and_index(
        &self,
        task: &ProcessTask,
        chunks: Vec<sage_rag::ParsedChunk>,
    ) -> Result<i32> {
        let rows: Vec<NewChunk> = chunks
            .iter()
            .map(|c| NewChunk::new(c.content.clone(), c.page))
            .collect();

        let chunk_ids = self.chunk_store.insert_chunks(&task.document_id, &rows).await?;

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embedder = Arc::clone(&self.embedder);
        let vectors = tokio::task::spawn_blocking(move || {
            let mut embedder = embedder
                .lock()
                .map_err(|_| sage_rag::RagError::Embedding("Failed to lock embedder".to_string()))?;
            embedder.embed(texts)
        })
        .await??;

        let points: Vec<DocPoint> = vectors
            .into_iter()
            .zip(chunk_ids)
            .map(|(vector, chunk_id)| DocPoint {
                vector,
                payload: DocPayload {
                    chunk_id,
                    document_id: task.document_id.clone(),
                    filename: task.filename.clone(),
                    organization_id: task.organization_id,
                    group_id: task.group_id,
                    owner_id: Some(task.owner_id),
                },
            })
            .collect();

        let count = self.vector_store.upsert_documents(points).await?;

        tracing::info!(
            document_id = %task.document_id,
            chunks = count,
            "document indexed"
        );
        Ok(count as i32)
    }

    /// Terminal bookkeeping: report the outcome once and remove the file.
    async fn finalize(&self, task: &ProcessTask, outcome: &TaskOutcome) {
        let (status, chunks_count, message) = outcome.terminal_status();

        let reported = self
            .control_plane
            .update_document_status(&task.document_id, status, chunks_count, message)
            .await;
        if !reported {
            tracing::error!(
                document_id = %task.document_id,
                "terminal status not acknowledged by control plane"
            );
        }

        match tokio::fs::remove_file(&task.file_path).await {
            Ok(()) => {
                tracing::info!(file_path = %task.file_path, "removed uploaded file");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::error!(error = %e, file_path = %task.file_path, "file cleanup failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sage_rag::RagError;

    #[test]
    fn test_validation_errors_are_not_retryable() {
        let error = ServerError::from(RagError::Validation("bad filename".to_string()));
        assert!(!retryable(&error));
    }

    #[test]
    fn test_engine_errors_are_retryable() {
        let error = ServerError::from(RagError::Parse("corrupt xref table".to_string()));
        assert!(retryable(&error));

        let error = ServerError::from(RagError::VectorStore("connection reset".to_string()));
        assert!(retryable(&error));
    }

    #[test]
    fn test_completed_terminal_status() {
        let outcome = TaskOutcome::Completed {
            chunks_count: 12,
            note: String::new(),
        };
        let (status, count, message) = outcome.terminal_status();
        assert_eq!(status, DocumentProcessingStatus::Completed);
        assert_eq!(count, 12);
        assert!(message.is_empty());
    }

    #[test]
    fn test_zero_chunk_terminal_status_is_completed() {
        let outcome = TaskOutcome::Completed {
            chunks_count: 0,
            note: "No text extracted from document".to_string(),
        };
        let (status, count, message) = outcome.terminal_status();
        assert_eq!(status, DocumentProcessingStatus::Completed);
        assert_eq!(count, 0);
        assert_eq!(message, "No text extracted from document");
    }

    #[test]
    fn test_failed_terminal_status() {
        let outcome = TaskOutcome::Failed {
            message: "File not found: /tmp/gone.pdf".to_string(),
            retryable: false,
        };
        let (status, count, message) = outcome.terminal_status();
        assert_eq!(status, DocumentProcessingStatus::Error);
        assert_eq!(count, 0);
        assert!(message.contains("File not found"));
    }
}
