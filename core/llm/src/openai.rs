//! OpenAI chat-completions backend.

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

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI streaming chat backend.
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
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
        let mut messages = vec![json!({
            "role": "system",
            "content": DEFAULT_SYSTEM_PROMPT,
        })];

        for message in history {
            messages.push(json!({
                "role": message.role,
                "content": message.content,
            }));
        }

        messages.push(json!({
            "role": "user",
            "content": build_context_prompt(query, context_docs),
        }));

        json!({
            "model": self.model,
            "messages": messages,
            "temperature": TEMPERATURE,
            "max_tokens": MAX_OUTPUT_TOKENS,
            "stream": true,
        })
    }
}

impl LlmProvider for OpenAiProvider {
    fn generate(
        &self,
        query: &str,
        context_docs: Vec<String>,
        history: Vec<ChatMessage>,
    ) -> BoxStream<'static, String> {
        let client = self.client.clone();
        let url = format!("{}/chat/completions", self.base_url);
        let api_key = self.api_key.clone();
        let body = self.request_body(query, &context_docs, &history);

        spawn_generation("OpenAI", move |tx| async move {
            stream_completion(client, url, api_key, body, tx).await
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
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
        .bearer_auth(api_key)
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
            if payload == "[DONE]" {
                return Ok(());
            }

            let value: Value = serde_json::from_str(&payload)
                .map_err(|e| LlmError::Stream(format!("Bad stream payload: {e}")))?;

            if let Some(content) = value["choices"][0]["delta"]["content"].as_str() {
                if !content.is_empty() && tx.send(content.to_string()).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    Ok(())
}
