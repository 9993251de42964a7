//! The provider contract shared by every backend.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::Result;
use crate::scrub::ThinkingScrubber;

/// System prompt constraining the model to the provided context.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful and precise AI assistant. \
     Your task is to answer the user's question based ONLY on the provided context. \
     If the answer is not present in the context, state that you do not have enough information. \
     Do not fabricate information or use outside knowledge unless explicitly asked.";

/// Sampling temperature used by every backend.
pub(crate) const TEMPERATURE: f64 = 0.1;

/// Output token cap used by every backend.
pub(crate) const MAX_OUTPUT_TOKENS: u32 = 1024;

/// Channel capacity between the vendor task and the consumer.
pub(crate) const STREAM_BUFFER: usize = 32;

/// One turn of prior conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "user" or "assistant"
    pub role: String,
    /// Message text
    pub content: String,
}

/// Streaming text completion over a single vendor.
pub trait LlmProvider: Send + Sync {
    /// Stream the answer for a query grounded in `context_docs`.
    ///
    /// The stream yields plain text chunks with thinking regions already
    /// removed. A backend failure yields exactly one chunk of the form
    /// `Error generating response (<vendor>): <message>` and ends the
    /// stream.
    fn generate(
        &self,
        query: &str,
        context_docs: Vec<String>,
        history: Vec<ChatMessage>,
    ) -> BoxStream<'static, String>;

    /// Vendor name, for logging and error chunks.
    fn provider_name(&self) -> &'static str;
}

/// Wrap the query and context documents into the user prompt.
pub fn build_context_prompt(query: &str, context_docs: &[String]) -> String {
    let context = context_docs.join("\n\n---\n\n");
    format!("CONTEXT:\n{context}\n\nQUESTION: {query}")
}

/// Run a vendor stream on a background task, scrub it, and expose it as
/// a chunk stream.
///
/// `produce` sends raw vendor text into the channel it is given; any
/// error it returns becomes the single synthetic error chunk. The
/// scrubber sits between the vendor task and the consumer, so thinking
/// regions never cross the channel boundary.
pub(crate) fn spawn_generation<F, Fut>(
    vendor: &'static str,
    produce: F,
) -> BoxStream<'static, String>
where
    F: FnOnce(mpsc::Sender<String>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::channel::<String>(STREAM_BUFFER);

    tokio::spawn(async move {
        let (raw_tx, mut raw_rx) = mpsc::channel::<String>(STREAM_BUFFER);
        let mut scrubber = ThinkingScrubber::new();

        let producer = tokio::spawn(produce(raw_tx));

        while let Some(raw) = raw_rx.recv().await {
            let cleaned = scrubber.push(&raw);
            if !cleaned.is_empty() && out_tx.send(cleaned).await.is_err() {
                // Consumer is gone; stop pulling from the vendor.
                producer.abort();
                return;
            }
        }

        match producer.await {
            Ok(Ok(())) => {
                let tail = scrubber.finish();
                if !tail.is_empty() {
                    let _ = out_tx.send(tail).await;
                }
            }
            Ok(Err(e)) => {
                tracing::error!(vendor, error = %e, "generation failed");
                let _ = out_tx
                    .send(format!("Error generating response ({vendor}): {e}"))
                    .await;
            }
            Err(e) => {
                tracing::error!(vendor, error = %e, "generation task panicked");
                let _ = out_tx
                    .send(format!("Error generating response ({vendor}): {e}"))
                    .await;
            }
        }
    });

    Box::pin(ReceiverStream::new(out_rx))
}
