//! Placeholder backend for installs without an API key.

use futures::stream::BoxStream;

use crate::provider::{spawn_generation, ChatMessage, LlmProvider};

/// Backend that emits a fixed placeholder instead of calling a model.
#[derive(Debug, Default)]
pub struct DummyProvider;

impl DummyProvider {
    /// Create the dummy backend.
    pub fn new() -> Self {
        Self
    }
}

impl LlmProvider for DummyProvider {
    fn generate(
        &self,
        query: &str,
        context_docs: Vec<String>,
        _history: Vec<ChatMessage>,
    ) -> BoxStream<'static, String> {
        let message = format!(
            "[DUMMY AI]: Received the question '{}'. \
             Context documents used: {}. \
             No real model is connected; configure the llm_provider setting.",
            query,
            context_docs.len()
        );

        spawn_generation("Dummy", move |tx| async move {
            let _ = tx.send(message).await;
            Ok(())
        })
    }

    fn provider_name(&self) -> &'static str {
        "dummy"
    }
}
