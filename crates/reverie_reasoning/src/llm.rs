use crate::api_types::{Message, StreamEvent};
use anyhow::Result;
use async_trait::async_trait;
use reverie_core::config::LlmConfig;
use tokio::sync::mpsc;

/// Sampling parameters for one completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionParams {
    /// Maximum tokens to generate (will be clamped to provider limits)
    pub max_tokens: u32,
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.7,
        }
    }
}

impl From<&LlmConfig> for CompletionParams {
    fn from(cfg: &LlmConfig) -> Self {
        Self {
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
        }
    }
}

/// A text-generation backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    /// Generate a full completion.
    async fn complete(
        &self,
        system: &str,
        messages: Vec<Message>,
        params: CompletionParams,
    ) -> Result<String>;

    /// Generate a completion as a finite stream of fragments.
    ///
    /// Dropping the receiver aborts the producer. The default implementation
    /// delivers the whole completion as a single fragment.
    async fn stream_complete(
        &self,
        system: &str,
        messages: Vec<Message>,
        params: CompletionParams,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let text = self.complete(system, messages, params).await?;
        let (tx, rx) = mpsc::channel(2);
        let _ = tx.send(StreamEvent::TextDelta(text)).await;
        let _ = tx
            .send(StreamEvent::Done {
                stop_reason: Some("end_turn".into()),
            })
            .await;
        Ok(rx)
    }
}
