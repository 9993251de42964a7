//! Document admission and deletion.
//!
//! Admission only validates the file on disk and enqueues a task; all
//! parsing and indexing happens in the worker. Deletion removes the
//! vectors; chunk rows are the control plane's to clean up.

use std::path::Path;
use std::sync::Arc;

use sage_rag::VectorStore;
use tonic::{Request, Response, Status};

use crate::broker::{ProcessTask, TaskQueue};
use crate::pb::{
    self, DeleteDocumentRequest, DeleteDocumentResponse, ProcessDocumentRequest,
    ProcessDocumentResponse,
};

/// Document admission service.
pub struct KnowledgeBaseService {
    queue: TaskQueue,
    vector_store: Arc<VectorStore>,
    max_file_size: u64,
}

impl KnowledgeBaseService {
    /// Wire the service against the broker and vector store.
    pub fn new(queue: TaskQueue, vector_store: Arc<VectorStore>, max_file_size: u64) -> Self {
        Self {
            queue,
            vector_store,
            max_file_size,
        }
    }
}

#[tonic::async_trait]
impl pb::knowledge_base_service_server::KnowledgeBaseService for KnowledgeBaseService {
    async fn process_document(
        &self,
        request: Request<ProcessDocumentRequest>,
    ) -> Result<Response<ProcessDocumentResponse>, Status> {
        let request = request.into_inner();

        tracing::info!(
            document_id = %request.document_id,
            filename = %request.filename,
            organization_id = request.organization_id,
            group_id = request.group_id,
            "document admission"
        );

        let path = Path::new(&request.file_path);
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(_) => {
                return Ok(Response::new(error_response(
                    &request.document_id,
                    format!("File not found: {}", request.file_path),
                )));
            }
        };

        if metadata.len() > self.max_file_size {
            return Ok(Response::new(error_response(
                &request.document_id,
                format!(
                    "File size ({}) exceeds the maximum limit of {} bytes",
                    metadata.len(),
                    self.max_file_size
                ),
            )));
        }

        let task = ProcessTask::new(
            request.document_id.clone(),
            request.file_path,
            request.filename,
            request.organization_id,
            request.group_id,
            request.owner_id,
        );

        if let Err(e) = self.queue.enqueue(&task).await {
            tracing::error!(error = %e, "failed to enqueue document task");
            return Ok(Response::new(error_response(
                &request.document_id,
                "Failed to queue document for processing".to_string(),
            )));
        }

        Ok(Response::new(ProcessDocumentResponse {
            document_id: request.document_id,
            status: "success".to_string(),
            chunks_count: 0,
            message: format!("Document queued for processing (task {})", task.task_id),
        }))
    }

    async fn delete_document(
        &self,
        request: Request<DeleteDocumentRequest>,
    ) -> Result<Response<DeleteDocumentResponse>, Status> {
        let request = request.into_inner();
        tracing::info!(document_id = %request.document_id, "document deletion");

        match self.vector_store.delete_by_document(&request.document_id).await {
            Ok(()) => Ok(Response::new(DeleteDocumentResponse {
                status: "success".to_string(),
                message: format!("Document {} successfully deleted", request.document_id),
            })),
            Err(e) => {
                tracing::error!(error = %e, "vector deletion failed");
                Ok(Response::new(DeleteDocumentResponse {
                    status: "error".to_string(),
                    message: e.to_string(),
                }))
            }
        }
    }
}

fn error_response(document_id: &str, message: String) -> ProcessDocumentResponse {
    tracing::warn!(document_id, message = %message, "document admission rejected");
    ProcessDocumentResponse {
        document_id: document_id.to_string(),
        status: "error".to_string(),
        chunks_count: 0,
        message,
    }
}
