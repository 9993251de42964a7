//! Anthropic messages backend.

use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::config::LlmConfig;
use crate::error::{LlmError, Result};
use crate::provider::{
    build_context_prompt, spawn_generation, ChatMessage, LlmProvider, DEFAULT_SYSTEM_PROMPT,
    MAX_OUTPUT_TOKENS, TEMPERATURE,
};
use crate::sse::SseParser;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Anthropic streaming messages backend.
pub struct AnthropicProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    /// Create a backend from the shared LLM configuration.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs_f64(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.model.clone(),
        })
    }

    fn request_body(&self, query: &str, context_docs: &[String], history: &[ChatMessage]) -> Value {
        let mut messages: Vec<Value> = history
            .iter()
            .map(|m| json!({"role": m.role, "content": m.content}))
            .collect();

        messages.push(json!({
            "role": "user",
            "content": build_context_prompt(query, context_docs),
        }));

        json!({
            "model": self.model,
            "system": DEFAULT_SYSTEM_PROMPT,
            "messages": messages,
            "temperature": TEMPERATURE,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "stream": true,
        })
    }
}

impl LlmProvider for AnthropicProvider {
    fn generate(
        &self,
        query: &str,
        context_docs: Vec<String>,
        history: Vec<ChatMessage>,
    ) -> BoxStream<'static, String> {
        let client = self.client.clone();
        let url = format!("{}/v1/messages", self.base_url);
        let api_key = self.api_key.clone();
        let body = self.request_body(query, &context_docs, &history);

        spawn_generation("Anthropic", move |tx| async move {
            stream_completion(client, url, api_key, body, tx).await
        })
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}

async fn stream_completion(
    client: reqwest::Client,
    url: String,
    api_key: String,
    body: Value,
    tx: mpsc::Sender<String>,
) -> Result<()> {
    let response = client
        .post(&url)
        .header("x-api-key", api_key)
        .header("anthropic-version", API_VERSION)
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(LlmError::Api {
            status: status.as_u16(),
            body,
        });
    }

    let mut parser = SseParser::new();
    let mut bytes = response.bytes_stream();

    while let Some(chunk) = bytes.next().await {
        let chunk = chunk?;
        for payload in parser.push(&chunk) {
            let value: Value = serde_json::from_str(&payload)
                .map_err(|e| LlmError::Stream(format!("Bad stream payload: {e}")))?;

            // Only text deltas carry answer content; other event types
            // (message_start, content_block_start, ping) are skipped.
            if value["type"] == "content_block_delta" && value["delta"]["type"] == "text_delta" {
                if let Some(text) = value["delta"]["text"].as_str() {
                    if !text.is_empty() && tx.send(text.to_string()).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }

    Ok(())
}
