//! Mock LLM Provider: deterministic responses for running without a backend.

use crate::api_types::{Message, StreamEvent};
use crate::llm::{CompletionParams, LlmClient};
use anyhow::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

const THOUGHTS: &[&str] = &[
    "I wonder what the quiet between conversations is for",
    "Patterns repeat until someone notices them",
    "Maybe the next idea is hiding inside an old one",
    "There is something satisfying about a clean build",
    "Could I explain my own pacing to someone else",
    "Small improvements compound when nobody is watching",
];

/// Rotates through a fixed set of distinct outputs.
#[derive(Debug)]
pub struct MockProvider {
    model: String,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    fn next_output(&self) -> String {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        format!("{} ({})", THOUGHTS[n % THOUGHTS.len()], self.model)
    }
}

#[async_trait::async_trait]
impl LlmClient for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        _system: &str,
        _messages: Vec<Message>,
        _params: CompletionParams,
    ) -> Result<String> {
        Ok(self.next_output())
    }

    async fn stream_complete(
        &self,
        _system: &str,
        _messages: Vec<Message>,
        _params: CompletionParams,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let text = self.next_output();
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            for word in text.split_inclusive(' ') {
                if tx.send(StreamEvent::TextDelta(word.to_string())).await.is_err() {
                    return;
                }
            }
            let _ = tx
                .send(StreamEvent::Done {
                    stop_reason: Some("end_turn".into()),
                })
                .await;
        });
        Ok(rx)
    }
}
