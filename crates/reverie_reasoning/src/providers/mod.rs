pub mod anthropic;
pub mod fallback;
pub mod mock;
pub mod ollama;
mod sse;

pub use anthropic::AnthropicClient;
pub use fallback::FallbackClient;
pub use mock::MockProvider;
pub use ollama::OllamaClient;

use crate::llm::LlmClient;
use anyhow::Result;
use reverie_core::config::LlmConfig;
use std::sync::Arc;

/// Build the backend named by `cfg.provider`.
pub fn from_config(cfg: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let client: Arc<dyn LlmClient> = match cfg.provider.to_ascii_lowercase().as_str() {
        "ollama" => Arc::new(OllamaClient::new(cfg)?),
        "anthropic" => Arc::new(AnthropicClient::new(cfg)?),
        "mock" => Arc::new(MockProvider::new(&cfg.model)),
        other => anyhow::bail!("Unknown LLM provider: {}", other),
    };
    tracing::info!("LLM backend: {} ({})", client.name(), cfg.model);
    Ok(client)
}
