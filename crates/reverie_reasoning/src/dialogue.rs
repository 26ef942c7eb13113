//! Conversation handler.
//!
//! Each turn is written to the log before generation and the reply after it,
//! both tagged with the session's thread id so later turns can replay the
//! history. Generation failures never surface to the user: the configured
//! backend chain is tried first, then a fixed apology is returned and stored
//! with `degraded: true`.

use crate::api_types::{normalize_turns, Message, StreamEvent};
use crate::context::{conversation_system_prompt, truncate_chars, TimeContext};
use crate::llm::{CompletionParams, LlmClient};
use crate::prompts::APOLOGY;
use reverie_core::config::DialogueConfig;
use reverie_core::emotion::events;
use reverie_core::record::kinds;
use reverie_core::sentiment::detect_reaction;
use reverie_core::{MemoryLog, MemoryRecord, NewRecord};
use reverie_limbic::EmotionEngine;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ChatError {
    #[error("Message is empty")]
    EmptyMessage,
}

/// A completed exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    pub thread_id: String,
    pub response: String,
    /// The reply is the fallback apology or a cut-off stream.
    pub degraded: bool,
}

/// Everything prepared for one generation call.
struct Turn {
    thread_id: String,
    user_text: String,
    system: String,
    messages: Vec<Message>,
}

pub struct ConversationHandler {
    engine: Arc<EmotionEngine>,
    log: Arc<dyn MemoryLog>,
    llm: Arc<dyn LlmClient>,
    cfg: DialogueConfig,
    params: CompletionParams,
    current_thread: Mutex<Option<String>>,
}

impl ConversationHandler {
    pub fn new(
        engine: Arc<EmotionEngine>,
        log: Arc<dyn MemoryLog>,
        llm: Arc<dyn LlmClient>,
        cfg: DialogueConfig,
    ) -> Self {
        Self {
            engine,
            log,
            llm,
            cfg,
            params: CompletionParams::default(),
            current_thread: Mutex::new(None),
        }
    }

    pub fn with_params(mut self, params: CompletionParams) -> Self {
        self.params = params;
        self
    }

    pub async fn current_thread(&self) -> Option<String> {
        self.current_thread.lock().await.clone()
    }

    /// Forget the current thread; the next message starts a new one.
    pub async fn new_conversation(&self) {
        if let Some(old) = self.current_thread.lock().await.take() {
            tracing::info!("Conversation {} closed", old);
        }
    }

    pub async fn handle(&self, text: &str) -> Result<Exchange, ChatError> {
        let turn = self.begin(text).await?;

        let generated = tokio::time::timeout(
            self.cfg.backend_timeout(),
            self.llm.complete(&turn.system, turn.messages.clone(), self.params),
        )
        .await;

        let (response, degraded) = match generated {
            Ok(Ok(reply)) if !reply.trim().is_empty() => (reply.trim().to_string(), false),
            Ok(Ok(_)) => {
                tracing::warn!("{} returned an empty reply", self.llm.name());
                (APOLOGY.to_string(), true)
            }
            Ok(Err(e)) => {
                tracing::warn!("Conversation backend failed: {:#}", e);
                (APOLOGY.to_string(), true)
            }
            Err(_) => {
                tracing::warn!("Conversation backend timed out after {:?}", self.cfg.backend_timeout());
                (APOLOGY.to_string(), true)
            }
        };

        self.finish(&turn, &response, degraded).await;
        Ok(Exchange {
            thread_id: turn.thread_id,
            response,
            degraded,
        })
    }

    /// Stream the reply as fragments.
    ///
    /// The channel closes after the reply has been stored. Dropping the
    /// receiver before the end aborts generation and nothing is stored.
    pub async fn handle_stream(self: &Arc<Self>, text: &str) -> Result<mpsc::Receiver<String>, ChatError> {
        let turn = self.begin(text).await?;
        let (tx, rx) = mpsc::channel(64);
        let this = Arc::clone(self);
        tokio::spawn(async move { this.stream_turn(turn, tx).await });
        Ok(rx)
    }

    async fn stream_turn(&self, turn: Turn, tx: mpsc::Sender<String>) {
        let timeout = self.cfg.backend_timeout();
        let opened = tokio::time::timeout(
            timeout,
            self.llm.stream_complete(&turn.system, turn.messages.clone(), self.params),
        )
        .await;

        let mut upstream = match opened {
            Ok(Ok(rx)) => rx,
            Ok(Err(e)) => {
                tracing::warn!("Conversation stream failed to open: {:#}", e);
                return self.deliver_apology(&turn, &tx).await;
            }
            Err(_) => {
                tracing::warn!("Conversation stream timed out after {:?}", timeout);
                return self.deliver_apology(&turn, &tx).await;
            }
        };

        let mut response = String::new();
        let mut degraded = false;
        loop {
            let next = tokio::select! {
                next = tokio::time::timeout(timeout, upstream.recv()) => next,
                _ = tx.closed() => {
                    tracing::info!("Stream consumer went away, discarding reply");
                    return;
                }
            };
            let event = match next {
                Ok(ev) => ev,
                Err(_) => {
                    tracing::warn!("Conversation stream stalled");
                    degraded = true;
                    break;
                }
            };
            match event {
                Some(StreamEvent::TextDelta(fragment)) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    response.push_str(&fragment);
                    if tx.send(fragment).await.is_err() {
                        tracing::info!("Stream consumer went away, discarding reply");
                        return;
                    }
                }
                Some(StreamEvent::Done { .. }) | None => break,
                Some(StreamEvent::Error(e)) => {
                    tracing::warn!("Conversation stream error: {}", e);
                    degraded = true;
                    break;
                }
            }
        }
        drop(upstream);

        if response.trim().is_empty() {
            return self.deliver_apology(&turn, &tx).await;
        }
        if tx.is_closed() {
            tracing::info!("Stream consumer went away, discarding reply");
            return;
        }
        self.finish(&turn, &response, degraded).await;
    }

    async fn deliver_apology(&self, turn: &Turn, tx: &mpsc::Sender<String>) {
        if tx.send(APOLOGY.to_string()).await.is_err() {
            return;
        }
        self.finish(turn, APOLOGY, true).await;
    }

    /// Validate, open or continue the thread, store the user message, and
    /// build the prompt.
    async fn begin(&self, text: &str) -> Result<Turn, ChatError> {
        let user_text = text.trim();
        if user_text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let (thread_id, is_new) = {
            let mut current = self.current_thread.lock().await;
            match current.clone() {
                Some(id) => (id, false),
                None => {
                    let id = mint_thread_id();
                    *current = Some(id.clone());
                    (id, true)
                }
            }
        };
        if is_new {
            tracing::info!("Conversation {} started", thread_id);
            self.engine.apply(events::NEW_CONVERSATION, None).await;
        }

        let user_record = NewRecord::new(kinds::USER_MESSAGE, user_text)
            .with_emotion(self.engine.snapshot())
            .with_thread(thread_id.clone())
            .with_importance(self.cfg.user_importance);
        let user_id = match self.log.append(user_record).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!("Failed to store user message: {:#}", e);
                None
            }
        };

        let tc = match TimeContext::gather(self.log.as_ref()).await {
            Ok(tc) => tc,
            Err(e) => {
                tracing::warn!("Time context unavailable: {:#}", e);
                TimeContext::at(chrono::Utc::now(), 0, 0, None, None)
            }
        };

        let mut thoughts = self
            .log
            .recent(Some(kinds::THOUGHT), self.cfg.context_thoughts)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to load recent thoughts: {:#}", e);
                Vec::new()
            });
        thoughts.reverse();

        let memories: Vec<MemoryRecord> = self
            .log
            .search(user_text, self.cfg.memory_hits.saturating_mul(3))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Memory search failed: {:#}", e);
                Vec::new()
            })
            .into_iter()
            .filter(|r| r.kind != kinds::USER_MESSAGE)
            .take(self.cfg.memory_hits)
            .collect();

        let history = self
            .log
            .by_thread(&thread_id, self.cfg.history_turns.saturating_add(1))
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to load thread history: {:#}", e);
                Vec::new()
            });
        let messages = build_messages(&history, user_id, user_text, self.cfg.history_turns);

        let system = conversation_system_prompt(&tc, &self.engine.snapshot(), &thoughts, &memories);

        Ok(Turn {
            thread_id,
            user_text: user_text.to_string(),
            system,
            messages,
        })
    }

    /// Store the reply and let the user's tone move the emotion state.
    async fn finish(&self, turn: &Turn, response: &str, degraded: bool) {
        let mut record = NewRecord::new(kinds::RESPONSE, response)
            .with_emotion(self.engine.snapshot())
            .with_thread(turn.thread_id.clone())
            .with_importance(self.cfg.response_importance);
        if degraded {
            record = record.with_metadata(json!({ "degraded": true }));
        }
        if let Err(e) = self.log.append(record).await {
            tracing::error!("Failed to store response: {:#}", e);
        }

        if let Some(event) = detect_reaction(&turn.user_text).event() {
            self.engine
                .apply(event, Some(truncate_chars(&turn.user_text, 50)))
                .await;
        }
    }
}

fn mint_thread_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Thread history (minus the message just written) followed by the new
/// user turn, shaped for a chat API.
fn build_messages(
    history: &[MemoryRecord],
    current_id: Option<i64>,
    user_text: &str,
    max_turns: usize,
) -> Vec<Message> {
    let prior: Vec<&MemoryRecord> = history
        .iter()
        .filter(|r| Some(r.id) != current_id)
        .filter(|r| r.is_interaction())
        .collect();
    let skip = prior.len().saturating_sub(max_turns);

    let mut messages: Vec<Message> = prior
        .into_iter()
        .skip(skip)
        .map(|r| {
            let text = truncate_chars(&r.content, 2000);
            if r.kind == kinds::USER_MESSAGE {
                Message::user(text)
            } else {
                Message::assistant(text)
            }
        })
        .collect();
    messages.push(Message::user(user_text));
    normalize_turns(messages)
}
