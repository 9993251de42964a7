//! Sage LLM Client
//!
//! A uniform streaming-completion contract over multiple vendor backends
//! (OpenAI, Gemini, Anthropic) plus a dummy fallback. Model "thinking"
//! regions are scrubbed out above the vendor layer, so no backend can
//! leak them to clients.

mod anthropic;
mod config;
mod dummy;
mod error;
mod factory;
mod gemini;
mod openai;
mod provider;
mod scrub;
mod sse;

pub use anthropic::AnthropicProvider;
pub use config::LlmConfig;
pub use dummy::DummyProvider;
pub use error::{LlmError, Result};
pub use factory::create_provider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use provider::{build_context_prompt, ChatMessage, LlmProvider, DEFAULT_SYSTEM_PROMPT};
pub use scrub::ThinkingScrubber;
