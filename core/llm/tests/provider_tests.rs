//! Provider behavior through the public API.

use futures::StreamExt;
use sage_llm::{create_provider, ChatMessage, LlmConfig, ThinkingScrubber};

fn dummy_config() -> LlmConfig {
    LlmConfig {
        provider: "dummy".to_string(),
        ..LlmConfig::default()
    }
}

#[tokio::test]
async fn dummy_provider_streams_one_placeholder_chunk() {
    let provider = create_provider(&dummy_config()).unwrap();

    let chunks: Vec<String> = provider
        .generate(
            "What is the capital of France?",
            vec!["Paris is the capital of France.".to_string()],
            vec![ChatMessage {
                role: "user".to_string(),
                content: "hi".to_string(),
            }],
        )
        .collect()
        .await;

    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].contains("What is the capital of France?"));
    assert!(!chunks[0].starts_with("Error"));
}

#[tokio::test]
async fn unknown_provider_name_falls_back_to_dummy() {
    let config = LlmConfig {
        provider: "colab".to_string(),
        api_key: Some("key".to_string()),
        ..LlmConfig::default()
    };

    let provider = create_provider(&config).unwrap();
    assert_eq!(provider.provider_name(), "dummy");
}

#[test]
fn scrubber_hides_thinking_from_streamed_chunks() {
    let mut scrubber = ThinkingScrubber::new();
    let mut seen = String::new();

    for chunk in ["Hi ", "<think>", "secret", "</think>", "there"] {
        seen.push_str(&scrubber.push(chunk));
    }
    seen.push_str(&scrubber.finish());

    assert_eq!(seen, "Hi there");
    assert!(!seen.contains("secret"));
}
