//! Configuration for the LLM client.

use serde::{Deserialize, Serialize};

/// LLM backend selection and connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Backend name: openai, gemini, anthropic or dummy
    pub provider: String,
    /// API key; empty selects the dummy backend
    pub api_key: Option<String>,
    /// Override for the vendor base URL
    pub base_url: Option<String>,
    /// Model name passed to the vendor
    pub model: String,
    /// Per-request timeout in seconds
    pub timeout_secs: f64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "dummy".to_string(),
            api_key: None,
            base_url: None,
            model: "local".to_string(),
            timeout_secs: 60.0,
        }
    }
}
