//! Task broker.
//!
//! Ingestion tasks travel through a Redis list. Each worker holds one
//! task at a time (one blocking pop per loop iteration), retries are
//! tracked by an attempt counter inside the envelope, and a task is only
//! gone from the system once its worker reached a terminal outcome.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;

/// Redis list holding pending ingestion tasks.
const QUEUE_KEY: &str = "sage:ingest:tasks";

/// Maximum number of retries after the first attempt.
pub const MAX_RETRIES: u32 = 3;

/// An enqueued document-processing task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessTask {
    /// Broker-side task id
    pub task_id: String,
    /// Document id minted by the control plane
    pub document_id: String,
    /// Uploaded file location on disk
    pub file_path: String,
    /// Original filename
    pub filename: String,
    /// Organization, absent when the document is personal
    pub organization_id: Option<i64>,
    /// Group, absent when the document is org-wide or personal
    pub group_id: Option<i64>,
    /// Uploading user
    pub owner_id: i64,
    /// Delivery attempt, 0 for the first
    pub attempt: u32,
}

impl ProcessTask {
    /// Build a fresh task from admission parameters.
    ///
    /// A wire value of 0 for the organization or group means "absent"
    /// and is normalized away here.
    pub fn new(
        document_id: impl Into<String>,
        file_path: impl Into<String>,
        filename: impl Into<String>,
        organization_id: i64,
        group_id: i64,
        owner_id: i64,
    ) -> Self {
        Self {
            task_id: Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            file_path: file_path.into(),
            filename: filename.into(),
            organization_id: (organization_id != 0).then_some(organization_id),
            group_id: (group_id != 0).then_some(group_id),
            owner_id,
            attempt: 0,
        }
    }

    /// The same task, one attempt later.
    pub fn next_attempt(mut self) -> Self {
        self.attempt += 1;
        self
    }

    /// True while the broker should redeliver after a transient failure.
    pub fn can_retry(&self) -> bool {
        self.attempt < MAX_RETRIES
    }
}

/// Exponential backoff before a redelivery: 1s, 2s, 4s.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.min(6))
}

/// Redis-backed task queue.
#[derive(Clone)]
pub struct TaskQueue {
    manager: ConnectionManager,
}

impl TaskQueue {
    /// Connect to the broker.
    pub async fn connect(broker_url: &str) -> Result<Self> {
        let client = redis::Client::open(broker_url)?;
        let manager = client.get_connection_manager().await?;
        Ok(Self { manager })
    }

    /// Push a task onto the queue.
    pub async fn enqueue(&self, task: &ProcessTask) -> Result<()> {
        let envelope = serde_json::to_string(task)?;
        let mut con = self.manager.clone();
        con.lpush::<_, _, ()>(QUEUE_KEY, envelope).await?;

        tracing::info!(
            task_id = %task.task_id,
            document_id = %task.document_id,
            attempt = task.attempt,
            "task enqueued"
        );
        Ok(())
    }

    /// Blocking pop of the next task.
    ///
    /// Returns `None` on timeout. An envelope that no longer parses is
    /// dropped with a log line instead of wedging the queue.
    pub async fn pop(&self, timeout_secs: usize) -> Result<Option<ProcessTask>> {
        let mut con = self.manager.clone();
        let popped: Option<(String, String)> = con.brpop(QUEUE_KEY, timeout_secs as f64).await?;

        let Some((_, envelope)) = popped else {
            return Ok(None);
        };

        match serde_json::from_str(&envelope) {
            Ok(task) => Ok(Some(task)),
            Err(e) => {
                tracing::error!(error = %e, "dropping unparseable task envelope");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_ids_normalized_to_absent() {
        let task = ProcessTask::new("doc-1", "/tmp/f.pdf", "f.pdf", 0, 0, 7);
        assert!(task.organization_id.is_none());
        assert!(task.group_id.is_none());
        assert_eq!(task.owner_id, 7);
    }

    #[test]
    fn test_nonzero_ids_kept() {
        let task = ProcessTask::new("doc-1", "/tmp/f.pdf", "f.pdf", 3, 10, 7);
        assert_eq!(task.organization_id, Some(3));
        assert_eq!(task.group_id, Some(10));
    }

    #[test]
    fn test_retry_budget() {
        let task = ProcessTask::new("doc-1", "/tmp/f.pdf", "f.pdf", 0, 0, 7);
        assert!(task.can_retry());

        let exhausted = task.next_attempt().next_attempt().next_attempt();
        assert_eq!(exhausted.attempt, 3);
        assert!(!exhausted.can_retry());
    }

    #[test]
    fn test_backoff_grows() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(2), Duration::from_secs(4));
        // Capped so a corrupt counter cannot stall a worker for hours.
        assert_eq!(backoff_delay(40), Duration::from_secs(64));
    }

    #[test]
    fn test_envelope_roundtrip() {
        let task = ProcessTask::new("doc-1", "/tmp/f.pdf", "f.pdf", 3, 10, 7);
        let json = serde_json::to_string(&task).unwrap();
        let back: ProcessTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }
}
