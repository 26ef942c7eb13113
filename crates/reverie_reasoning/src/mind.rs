//! `Mind`: wires the emotion engine, memory log, thought daemon and
//! conversation handler together behind one query surface.

use crate::context::TimeContext;
use crate::daemon::{DaemonState, ThoughtDaemon};
use crate::dialogue::{ChatError, ConversationHandler};
use crate::llm::{CompletionParams, LlmClient};
use crate::prompts::INAUGURAL_THOUGHT;
use crate::subscribers::{BroadcastSubscriber, ThoughtEvent, ThoughtSubscriber};
use anyhow::{Context, Result};
use reverie_core::emotion::events;
use reverie_core::record::{kinds, markers};
use reverie_core::{Counts, Dimension, EmotionVector, MemoryLog, MemoryRecord, NewRecord, ReverieConfig};
use reverie_limbic::EmotionEngine;
use reverie_memory::SqliteMemory;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

/// Upper bound for listing queries.
pub const MAX_LISTING: usize = 200;

const FEED_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub response: String,
    /// Emotion state after the exchange.
    pub emotions: EmotionVector,
    pub thread_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MindStatus {
    pub emotions: EmotionVector,
    pub summary: String,
    pub dominant: Dimension,
    pub daemon: DaemonState,
    pub counts: Counts,
    pub time: TimeContext,
    pub thread_id: Option<String>,
}

pub struct Mind {
    engine: Arc<EmotionEngine>,
    log: Arc<dyn MemoryLog>,
    daemon: Arc<ThoughtDaemon>,
    dialogue: Arc<ConversationHandler>,
    feed: broadcast::Sender<ThoughtEvent>,
}

impl Mind {
    pub fn new(
        engine: Arc<EmotionEngine>,
        log: Arc<dyn MemoryLog>,
        thought_llm: Arc<dyn LlmClient>,
        conversation_llm: Arc<dyn LlmClient>,
        config: &ReverieConfig,
    ) -> Self {
        Self::with_subscribers(engine, log, thought_llm, conversation_llm, config, Vec::new())
    }

    /// Like [`Mind::new`], with extra thought subscribers next to the broadcast feed.
    pub fn with_subscribers(
        engine: Arc<EmotionEngine>,
        log: Arc<dyn MemoryLog>,
        thought_llm: Arc<dyn LlmClient>,
        conversation_llm: Arc<dyn LlmClient>,
        config: &ReverieConfig,
        subscribers: Vec<Arc<dyn ThoughtSubscriber>>,
    ) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);

        let mut daemon = ThoughtDaemon::new(
            engine.clone(),
            log.clone(),
            thought_llm,
            config.cognition.clone(),
        )
        .with_params(CompletionParams::from(&config.thought_llm))
        .with_subscriber(Arc::new(BroadcastSubscriber::new(feed.clone())));
        for sub in subscribers {
            daemon = daemon.with_subscriber(sub);
        }

        let dialogue = ConversationHandler::new(
            engine.clone(),
            log.clone(),
            conversation_llm,
            config.dialogue.clone(),
        )
        .with_params(CompletionParams::from(&config.conversation_llm));

        Self {
            engine,
            log,
            daemon: Arc::new(daemon),
            dialogue: Arc::new(dialogue),
            feed,
        }
    }

    /// Open the SQLite log named in the config and build everything on top of it.
    pub async fn open(
        config: &ReverieConfig,
        thought_llm: Arc<dyn LlmClient>,
        conversation_llm: Arc<dyn LlmClient>,
    ) -> Result<Self> {
        let memory = Arc::new(
            SqliteMemory::new(&config.memory.db_path)
                .await
                .with_context(|| format!("Failed to open memory at {}", config.memory.db_path))?,
        );
        let engine = Arc::new(EmotionEngine::with_store(memory.clone()));
        Ok(Self::new(engine, memory, thought_llm, conversation_llm, config))
    }

    /// Restore state and record the boot. Returns true on the very first boot.
    pub async fn boot(&self) -> Result<bool> {
        self.engine.hydrate().await;

        let first_boot = self.log.first_record().await?.is_none();
        if first_boot {
            self.mark(markers::FIRST_BOOT, "First activation").await;
            self.engine.apply(events::BOOT, None).await;
            let inaugural = NewRecord::thought(INAUGURAL_THOUGHT)
                .with_emotion(self.engine.snapshot())
                .with_importance(1.0)
                .with_metadata(json!({
                    "thought_number": 1,
                    "milestone": "first_thought",
                }));
            self.log
                .append(inaugural)
                .await
                .context("Failed to store the first thought")?;
            tracing::info!("First boot: {}", INAUGURAL_THOUGHT);
        } else {
            self.mark(markers::BOOT, "Process started").await;
            tracing::info!("Boot: {}", self.engine.summary());
        }

        if let Err(e) = self.daemon.hydrate().await {
            tracing::warn!("Thought daemon hydration failed: {:#}", e);
        }
        Ok(first_boot)
    }

    /// Start the thought daemon. Returns false if it was already active.
    pub async fn start(&self) -> bool {
        self.daemon.start().await
    }

    pub fn pause(&self) -> bool {
        self.daemon.pause()
    }

    pub fn resume(&self) -> bool {
        self.daemon.resume()
    }

    /// Stop the daemon, wait for it, then write the shutdown marker.
    pub async fn shutdown(&self) {
        self.daemon.shutdown().await;
        self.mark(markers::SHUTDOWN, "Process stopping").await;
        tracing::info!("Shutdown complete");
    }

    pub fn daemon_state(&self) -> DaemonState {
        self.daemon.state()
    }

    pub fn daemon(&self) -> &Arc<ThoughtDaemon> {
        &self.daemon
    }

    /// Latest thoughts, oldest-first for display.
    pub async fn recent_thoughts(&self, limit: usize) -> Result<Vec<MemoryRecord>> {
        let mut thoughts = self
            .log
            .recent(Some(kinds::THOUGHT), limit.min(MAX_LISTING))
            .await?;
        thoughts.reverse();
        Ok(thoughts)
    }

    /// Keyword search when a non-blank query is given, otherwise the most recent records.
    pub async fn memories(&self, query: Option<&str>, limit: usize) -> Result<Vec<MemoryRecord>> {
        let limit = limit.min(MAX_LISTING);
        match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => self.log.search(q, limit).await,
            None => self.log.recent(None, limit).await,
        }
    }

    pub async fn chat(&self, text: &str) -> Result<ChatReply, ChatError> {
        let exchange = self.dialogue.handle(text).await?;
        Ok(ChatReply {
            response: exchange.response,
            emotions: self.engine.snapshot(),
            thread_id: exchange.thread_id,
        })
    }

    /// Stream a reply; see [`ConversationHandler::handle_stream`].
    pub async fn chat_stream(&self, text: &str) -> Result<mpsc::Receiver<String>, ChatError> {
        self.dialogue.handle_stream(text).await
    }

    pub async fn new_conversation(&self) {
        self.dialogue.new_conversation().await;
    }

    /// Live feed of accepted thoughts.
    pub fn subscribe(&self) -> broadcast::Receiver<ThoughtEvent> {
        self.feed.subscribe()
    }

    pub fn emotions(&self) -> EmotionVector {
        self.engine.snapshot()
    }

    pub fn subscribe_emotions(&self) -> watch::Receiver<EmotionVector> {
        self.engine.subscribe()
    }

    pub async fn status(&self) -> Result<MindStatus> {
        let emotions = self.engine.snapshot();
        let time = TimeContext::gather(self.log.as_ref()).await?;
        let counts = Counts {
            total: time.total_memories,
            thoughts: time.total_thoughts,
        };
        Ok(MindStatus {
            summary: emotions.summary(),
            dominant: emotions.dominant(),
            emotions,
            daemon: self.daemon.state(),
            counts,
            time,
            thread_id: self.dialogue.current_thread().await,
        })
    }

    async fn mark(&self, event: &str, note: &str) {
        if let Err(e) = self.log.mark_time(event, Some(note)).await {
            tracing::warn!("Failed to write {} marker: {:#}", event, e);
        }
    }
}
