//! Outbound status reporting to the control plane.
//!
//! The control plane owns the `documents` table; the worker only tells it
//! how processing ended. The channel is connected lazily and reused, and
//! every transport error is captured here so a broken control plane can
//! never change a worker's local outcome.

use std::time::Duration;

use tokio::sync::Mutex;
use tonic::transport::{Channel, Endpoint};

use crate::pb::control_plane_client::ControlPlaneClient as GrpcClient;
use crate::pb::{DocumentProcessingStatus, DocumentStatusRequest};

/// Per-call timeout for status updates.
const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Lazily-connected control plane client.
pub struct ControlPlaneClient {
    addr: String,
    client: Mutex<Option<GrpcClient<Channel>>>,
}

impl ControlPlaneClient {
    /// Create a client for the given address. No connection is made yet.
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            client: Mutex::new(None),
        }
    }

    /// Report a document processing status.
    ///
    /// Returns true only for a successful reply with `success = true`.
    /// Connection and call failures are logged and reported as false.
    pub async fn update_document_status(
        &self,
        document_id: &str,
        status: DocumentProcessingStatus,
        chunks_count: i32,
        error_message: &str,
    ) -> bool {
        let mut guard = self.client.lock().await;

        if guard.is_none() {
            tracing::info!(addr = %self.addr, "connecting to control plane");
            match self.connect().await {
                Ok(client) => *guard = Some(client),
                Err(e) => {
                    tracing::error!(error = %e, "control plane connection failed");
                    return false;
                }
            }
        }

        let client = match guard.as_mut() {
            Some(client) => client,
            None => return false,
        };

        let request = DocumentStatusRequest {
            document_id: document_id.to_string(),
            status: status.into(),
            chunks_count,
            error_message: error_message.to_string(),
        };

        tracing::info!(
            document_id,
            status = status.as_str_name(),
            chunks_count,
            "reporting document status"
        );

        match client.update_document_status(request).await {
            Ok(response) => {
                let reply = response.into_inner();
                if !reply.success {
                    tracing::error!(document_id, message = %reply.message, "status update rejected");
                }
                reply.success
            }
            Err(status) => {
                tracing::error!(
                    document_id,
                    code = ?status.code(),
                    message = status.message(),
                    "status update failed"
                );
                false
            }
        }
    }

    async fn connect(&self) -> Result<GrpcClient<Channel>, tonic::transport::Error> {
        let channel = Endpoint::from_shared(self.addr.clone())?
            .timeout(CALL_TIMEOUT)
            .connect()
            .await?;
        Ok(GrpcClient::new(channel))
    }
}
