//! Backend selection.

use std::sync::Arc;

use crate::anthropic::AnthropicProvider;
use crate::config::LlmConfig;
use crate::dummy::DummyProvider;
use crate::error::Result;
use crate::gemini::GeminiProvider;
use crate::openai::OpenAiProvider;
use crate::provider::LlmProvider;

/// Build the configured provider.
///
/// A real provider without an API key, or an unknown provider name,
/// falls back to the dummy backend.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>> {
    let provider = config.provider.to_lowercase();

    let has_key = config
        .api_key
        .as_ref()
        .is_some_and(|key| !key.is_empty());

    if matches!(provider.as_str(), "openai" | "gemini" | "anthropic") && !has_key {
        tracing::warn!(
            provider = %provider,
            "provider selected without an API key, using dummy backend"
        );
        return Ok(Arc::new(DummyProvider::new()));
    }

    let provider: Arc<dyn LlmProvider> = match provider.as_str() {
        "openai" => Arc::new(OpenAiProvider::new(config)?),
        "gemini" => Arc::new(GeminiProvider::new(config)?),
        "anthropic" => Arc::new(AnthropicProvider::new(config)?),
        "dummy" => Arc::new(DummyProvider::new()),
        other => {
            tracing::warn!(provider = other, "unknown provider, using dummy backend");
            Arc::new(DummyProvider::new())
        }
    };

    tracing::info!(provider = provider.provider_name(), "LLM provider selected");
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str, api_key: Option<&str>) -> LlmConfig {
        LlmConfig {
            provider: provider.to_string(),
            api_key: api_key.map(str::to_string),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn test_dummy_by_default() {
        let provider = create_provider(&config("dummy", None)).unwrap();
        assert_eq!(provider.provider_name(), "dummy");
    }

    #[test]
    fn test_real_provider_with_key() {
        let provider = create_provider(&config("openai", Some("sk-test"))).unwrap();
        assert_eq!(provider.provider_name(), "openai");

        let provider = create_provider(&config("Anthropic", Some("key"))).unwrap();
        assert_eq!(provider.provider_name(), "anthropic");
    }

    #[test]
    fn test_missing_key_falls_back_to_dummy() {
        let provider = create_provider(&config("openai", None)).unwrap();
        assert_eq!(provider.provider_name(), "dummy");

        let provider = create_provider(&config("gemini", Some(""))).unwrap();
        assert_eq!(provider.provider_name(), "dummy");
    }

    #[test]
    fn test_unknown_provider_falls_back_to_dummy() {
        let provider = create_provider(&config("colab", Some("key"))).unwrap();
        assert_eq!(provider.provider_name(), "dummy");
    }
}
