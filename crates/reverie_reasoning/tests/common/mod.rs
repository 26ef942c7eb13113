//! Shared fixtures: a scripted LLM client and in-memory stores.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use reverie_core::config::{CognitionConfig, ReverieConfig};
use reverie_limbic::EmotionEngine;
use reverie_memory::SqliteMemory;
use reverie_reasoning::api_types::{Message, StreamEvent};
use reverie_reasoning::llm::{CompletionParams, LlmClient};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// One scripted backend behaviour.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(String),
    /// Never answers.
    Hang,
    /// Streams the words, then reports an error.
    BreakAfter(String),
    /// Streams the words, then goes quiet until the reader hangs up.
    Stall(String),
}

pub fn text(s: &str) -> Reply {
    Reply::Text(s.to_string())
}

/// Pops one reply per call. When the script runs out, every call yields a
/// fresh thought with no words in common with the previous ones.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
    /// Stalled streams whose reader has hung up.
    released: Arc<AtomicUsize>,
    /// Pause between streamed words.
    fragment_delay: Duration,
    pub last_system: Mutex<String>,
    pub last_messages: Mutex<Vec<Message>>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Self::build(replies, Duration::ZERO)
    }

    pub fn slow_stream(replies: Vec<Reply>, fragment_delay: Duration) -> Arc<Self> {
        Self::build(replies, fragment_delay)
    }

    fn build(replies: Vec<Reply>, fragment_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
            fragment_delay,
            last_system: Mutex::new(String::new()),
            last_messages: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    async fn next(&self, system: &str, messages: Vec<Message>) -> Reply {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_system.lock().await = system.to_string();
        *self.last_messages.lock().await = messages;
        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Reply::Text(format!("w{n}a w{n}b w{n}c")))
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, system: &str, messages: Vec<Message>, _params: CompletionParams) -> Result<String> {
        match self.next(system, messages).await {
            Reply::Text(t) | Reply::BreakAfter(t) | Reply::Stall(t) => Ok(t),
            Reply::Fail(e) => Err(anyhow::anyhow!(e)),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn stream_complete(
        &self,
        system: &str,
        messages: Vec<Message>,
        _params: CompletionParams,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let (words, fail_at_end, stall) = match self.next(system, messages).await {
            Reply::Text(t) => (t, false, false),
            Reply::BreakAfter(t) => (t, true, false),
            Reply::Stall(t) => (t, false, true),
            Reply::Fail(e) => return Err(anyhow::anyhow!(e)),
            Reply::Hang => std::future::pending().await,
        };
        let delay = self.fragment_delay;
        let released = self.released.clone();
        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            for word in words.split_inclusive(' ') {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(StreamEvent::TextDelta(word.to_string())).await.is_err() {
                    return;
                }
            }
            if stall {
                tx.closed().await;
                released.fetch_add(1, Ordering::SeqCst);
                return;
            }
            let last = if fail_at_end {
                StreamEvent::Error("connection reset".into())
            } else {
                StreamEvent::Done {
                    stop_reason: Some("end_turn".into()),
                }
            };
            let _ = tx.send(last).await;
        });
        Ok(rx)
    }
}

pub async fn memory() -> Arc<SqliteMemory> {
    Arc::new(SqliteMemory::new(":memory:").await.unwrap())
}

pub fn engine_for(memory: &Arc<SqliteMemory>) -> Arc<EmotionEngine> {
    Arc::new(EmotionEngine::with_store(memory.clone()))
}

/// Deterministic cognition settings: no hints, fast pacing.
pub fn quiet_cognition() -> CognitionConfig {
    CognitionConfig {
        hint_probability: 0.0,
        min_interval_secs: 0.0,
        max_interval_secs: 0.02,
        jitter_secs: 0.0,
        error_cooldown_secs: 0.02,
        ..Default::default()
    }
}

pub fn test_config() -> ReverieConfig {
    let mut cfg = ReverieConfig::default();
    cfg.memory.db_path = ":memory:".into();
    cfg.cognition = quiet_cognition();
    cfg
}

pub fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}
