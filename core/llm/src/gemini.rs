//! Gemini generateContent backend.

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

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Gemini streaming backend.
pub struct GeminiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiProvider {
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
        let mut contents: Vec<Value> = history
            .iter()
            .map(|m| {
                // Gemini calls the assistant role "model".
                let role = if m.role == "assistant" { "model" } else { "user" };
                json!({"role": role, "parts": [{"text": m.content}]})
            })
            .collect();

        contents.push(json!({
            "role": "user",
            "parts": [{"text": build_context_prompt(query, context_docs)}],
        }));

        json!({
            "system_instruction": {"parts": [{"text": DEFAULT_SYSTEM_PROMPT}]},
            "contents": contents,
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
            },
        })
    }
}

impl LlmProvider for GeminiProvider {
    fn generate(
        &self,
        query: &str,
        context_docs: Vec<String>,
        history: Vec<ChatMessage>,
    ) -> BoxStream<'static, String> {
        let client = self.client.clone();
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        let api_key = self.api_key.clone();
        let body = self.request_body(query, &context_docs, &history);

        spawn_generation("Gemini", move |tx| async move {
            stream_completion(client, url, api_key, body, tx).await
        })
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
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
        .header("x-goog-api-key", api_key)
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

            if let Some(text) = value["candidates"][0]["content"]["parts"][0]["text"].as_str() {
                if !text.is_empty() && tx.send(text.to_string()).await.is_err() {
                    return Ok(());
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> GeminiProvider {
        GeminiProvider::new(&LlmConfig {
            provider: "gemini".to_string(),
            api_key: Some("key".to_string()),
            base_url: None,
            model: "gemini-2.0-flash".to_string(),
            timeout_secs: 5.0,
        })
        .unwrap()
    }

    #[test]
    fn test_provider_name() {
        assert_eq!(provider().provider_name(), "gemini");
    }

    #[test]
    fn test_history_roles_mapped() {
        let body = provider().request_body(
            "What?",
            &[],
            &[
                ChatMessage {
                    role: "user".to_string(),
                    content: "hi".to_string(),
                },
                ChatMessage {
                    role: "assistant".to_string(),
                    content: "hello".to_string(),
                },
            ],
        );

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["role"], "user");
    }
}
