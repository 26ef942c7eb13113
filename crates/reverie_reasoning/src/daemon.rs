//! Thought daemon: the background cognition loop.
//!
//! One cycle ticks the emotion engine, assembles context, asks the thought
//! backend for a single sentence, filters and dedups it, scores it, persists
//! it, feeds the category event back into the emotion state and notifies
//! subscribers. The wait before the next cycle shrinks as excitement and
//! curiosity rise.
//!
//! Control runs through a `watch` channel of [`DaemonState`]. Stopping
//! interrupts an in-flight backend call or sleep; pausing freezes the
//! remaining part of a sleep until resumed.

use crate::api_types::Message;
use crate::context::{thought_prompt, truncate_chars, TimeContext};
use crate::dedup::DuplicateGuard;
use crate::filter::{clean_thought, ContentFilter, DenylistFilter};
use crate::llm::{CompletionParams, LlmClient};
use crate::pacing::ThoughtPacer;
use crate::prompts::{random_seed, THOUGHT_SYSTEM_PROMPT};
use crate::salience::{ImportanceScorer, KeywordScorer};
use crate::subscribers::{SubscriberSet, ThoughtSubscriber};
use anyhow::{Context, Result};
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use reverie_core::config::CognitionConfig;
use reverie_core::record::{kinds, markers};
use reverie_core::{MemoryLog, MemoryRecord, NewRecord};
use reverie_limbic::EmotionEngine;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonState {
    Stopped,
    Running,
    Paused,
}

/// Result of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Accepted(MemoryRecord),
    /// Too similar to a recent thought; nothing was written.
    Duplicate,
    /// The backend produced nothing usable.
    Empty,
    /// Backend error, timeout, or persistence failure.
    Failed,
}

/// Cleaned backend output awaiting dedup and persistence.
#[derive(Debug, Clone)]
struct Candidate {
    content: String,
    /// Replaced by a seed memory after the content filter rejected it.
    fallback: bool,
}

fn default_params() -> CompletionParams {
    CompletionParams {
        max_tokens: 80,
        temperature: 0.9,
    }
}

pub struct ThoughtDaemon {
    engine: Arc<EmotionEngine>,
    log: Arc<dyn MemoryLog>,
    llm: Arc<dyn LlmClient>,
    filter: Box<dyn ContentFilter>,
    scorer: Box<dyn ImportanceScorer>,
    subscribers: SubscriberSet,
    pacer: ThoughtPacer,
    params: CompletionParams,
    cfg: CognitionConfig,
    dedup: Mutex<DuplicateGuard>,
    thought_count: AtomicU64,
    state_tx: watch::Sender<DaemonState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ThoughtDaemon {
    pub fn new(
        engine: Arc<EmotionEngine>,
        log: Arc<dyn MemoryLog>,
        llm: Arc<dyn LlmClient>,
        cfg: CognitionConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(DaemonState::Stopped);
        Self {
            engine,
            log,
            llm,
            filter: Box::new(DenylistFilter::default()),
            scorer: Box::new(KeywordScorer),
            subscribers: SubscriberSet::new(cfg.subscriber_timeout()),
            pacer: ThoughtPacer::from_config(&cfg),
            params: default_params(),
            dedup: Mutex::new(DuplicateGuard::new(cfg.dedup_window, cfg.dedup_threshold as f64)),
            thought_count: AtomicU64::new(0),
            state_tx,
            task: Mutex::new(None),
            cfg,
        }
    }

    pub fn with_filter(mut self, filter: Box<dyn ContentFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_scorer(mut self, scorer: Box<dyn ImportanceScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_params(mut self, params: CompletionParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_subscriber(mut self, subscriber: Arc<dyn ThoughtSubscriber>) -> Self {
        self.subscribers.add(subscriber);
        self
    }

    pub fn state(&self) -> DaemonState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<DaemonState> {
        self.state_tx.subscribe()
    }

    pub fn thought_count(&self) -> u64 {
        self.thought_count.load(Ordering::Relaxed)
    }

    /// Reload the thought counter and the dedup window from the log.
    pub async fn hydrate(&self) -> Result<()> {
        let counts = self.log.counts().await.context("Failed to read counts")?;
        self.thought_count.store(counts.thoughts, Ordering::Relaxed);

        let mut recent = self
            .log
            .recent(Some(kinds::THOUGHT), self.cfg.dedup_window)
            .await
            .context("Failed to read recent thoughts")?;
        recent.reverse();

        let mut guard = DuplicateGuard::new(self.cfg.dedup_window, self.cfg.dedup_threshold as f64);
        for r in recent {
            guard.remember(r.content);
        }
        *self.dedup.lock().await = guard;
        Ok(())
    }

    /// Spawn the loop. Returns false if it is already running or paused.
    pub async fn start(self: &Arc<Self>) -> bool {
        let mut task = self.task.lock().await;
        if self.state() != DaemonState::Stopped {
            tracing::debug!("Thought daemon already active");
            return false;
        }
        // A previous loop may still be writing its stop marker.
        if let Some(old) = task.take() {
            let _ = old.await;
        }
        self.state_tx.send_replace(DaemonState::Running);
        let this = Arc::clone(self);
        *task = Some(tokio::spawn(async move { this.run().await }));
        true
    }

    /// Running → Paused.
    pub fn pause(&self) -> bool {
        self.transition(DaemonState::Running, DaemonState::Paused)
    }

    /// Paused → Running.
    pub fn resume(&self) -> bool {
        self.transition(DaemonState::Paused, DaemonState::Running)
    }

    fn transition(&self, from: DaemonState, to: DaemonState) -> bool {
        let changed = self.state_tx.send_if_modified(|s| {
            if *s == from {
                *s = to;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::info!("Thought daemon {:?} -> {:?}", from, to);
        }
        changed
    }

    /// Request a stop; the loop exits at its next await point.
    pub fn stop(&self) {
        let previous = self.state_tx.send_replace(DaemonState::Stopped);
        if previous != DaemonState::Stopped {
            tracing::info!("Thought daemon stopping");
        }
    }

    /// Stop and wait for the loop to finish.
    pub async fn shutdown(&self) {
        self.stop();
        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!("Thought daemon task failed: {}", e);
            }
        }
    }

    async fn run(self: Arc<Self>) {
        let mut state_rx = self.state_tx.subscribe();

        if let Err(e) = self.hydrate().await {
            tracing::warn!("Thought daemon hydration failed: {:#}", e);
        }
        self.mark(markers::DAEMON_START, "Thought daemon activated").await;
        tracing::info!("Thought daemon started ({} thoughts so far)", self.thought_count());

        loop {
            if !wait_running(&mut state_rx, Duration::ZERO).await {
                break;
            }

            let generated = tokio::select! {
                _ = stopped(&mut state_rx) => break,
                g = self.generate() => g,
            };
            let outcome = self.accept(generated).await;

            let delay = match &outcome {
                CycleOutcome::Accepted(_) | CycleOutcome::Empty => {
                    self.pacer.next_delay(&self.engine.snapshot())
                }
                CycleOutcome::Duplicate => self.cfg.min_interval(),
                CycleOutcome::Failed => self.cfg.error_cooldown(),
            };
            tracing::debug!("Next thought in {:.1}s", delay.as_secs_f64());

            if !wait_running(&mut state_rx, delay).await {
                break;
            }
        }

        self.mark(markers::DAEMON_STOP, "Thought daemon deactivated").await;
        tracing::info!("Thought daemon stopped");
    }

    /// Run a single cycle without pacing.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let generated = self.generate().await;
        self.accept(generated).await
    }

    /// Context assembly and generation. Safe to cancel.
    async fn generate(&self) -> Result<Option<Candidate>> {
        self.engine.tick().await;

        let tc = TimeContext::gather(self.log.as_ref()).await?;
        let mut recent = self
            .log
            .recent(Some(kinds::THOUGHT), self.cfg.context_thoughts)
            .await?;
        recent.reverse();
        let hint = self.pick_hint().await;
        let emotion = self.engine.snapshot();
        let prompt = thought_prompt(&tc, &emotion, &recent, hint.as_deref());

        let raw = tokio::time::timeout(
            self.cfg.backend_timeout(),
            self.llm
                .complete(THOUGHT_SYSTEM_PROMPT, vec![Message::user(prompt)], self.params),
        )
        .await
        .map_err(|_| anyhow::anyhow!("{} timed out after {:?}", self.llm.name(), self.cfg.backend_timeout()))??;

        let cleaned = clean_thought(&raw, self.cfg.max_thought_chars);
        if cleaned.is_empty() {
            return Ok(None);
        }

        match self.filter.check(&cleaned) {
            Ok(()) => Ok(Some(Candidate {
                content: cleaned,
                fallback: false,
            })),
            Err(reason) => {
                tracing::info!("Thought rejected ({}): {}", reason, cleaned);
                Ok(Some(Candidate {
                    content: random_seed().to_string(),
                    fallback: true,
                }))
            }
        }
    }

    /// Either a recent user message or a seed memory, with low probability.
    async fn pick_hint(&self) -> Option<String> {
        let p = self.cfg.hint_probability;
        if !(p > 0.0) || !rand::thread_rng().gen_bool(p.min(1.0)) {
            return None;
        }
        if rand::random::<bool>() {
            match self.log.recent(Some(kinds::USER_MESSAGE), 3).await {
                Ok(msgs) => {
                    if let Some(m) = msgs.choose(&mut rand::thread_rng()) {
                        return Some(m.content.clone());
                    }
                }
                Err(e) => tracing::debug!("Hint lookup failed: {:#}", e),
            }
        }
        Some(random_seed().to_string())
    }

    /// Dedup, score, persist, and notify. Not cancelled by stop.
    async fn accept(&self, generated: Result<Option<Candidate>>) -> CycleOutcome {
        let candidate = match generated {
            Ok(Some(c)) => c,
            Ok(None) => {
                tracing::debug!("Empty thought, skipping");
                return CycleOutcome::Empty;
            }
            Err(e) => {
                tracing::warn!("Thought generation failed: {:#}", e);
                return CycleOutcome::Failed;
            }
        };

        let mut dedup = self.dedup.lock().await;
        if dedup.is_duplicate(&candidate.content) {
            tracing::info!("Discarding near-duplicate thought: {}", candidate.content);
            return CycleOutcome::Duplicate;
        }

        let (importance, category) = self.scorer.score(&candidate.content);
        let emotion = self.engine.snapshot();
        let number = self.thought_count() + 1;
        let mut metadata = json!({
            "thought_number": number,
            "category": category.as_str(),
        });
        if candidate.fallback {
            metadata["fallback"] = json!(true);
        }

        let new_record = NewRecord::thought(candidate.content.clone())
            .with_emotion(emotion)
            .with_importance(importance)
            .with_metadata(metadata);
        let record = MemoryRecord {
            id: 0,
            timestamp: Utc::now(),
            kind: new_record.kind.clone(),
            content: new_record.content.clone(),
            emotion: new_record.emotion,
            thread_id: None,
            importance: new_record.importance,
            metadata: new_record.metadata.clone(),
        };

        let id = match self.log.append(new_record).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!("Failed to persist thought: {:#}", e);
                return CycleOutcome::Failed;
            }
        };
        let record = MemoryRecord { id, ..record };
        self.thought_count.store(number, Ordering::Relaxed);
        dedup.remember(candidate.content.clone());
        drop(dedup);

        self.engine
            .apply(category.event(), Some(truncate_chars(&record.content, 50)))
            .await;
        tracing::info!("Thought #{} [{}]: {}", number, category.as_str(), record.content);

        if !self.subscribers.is_empty() {
            let emotion_after = self.engine.snapshot();
            self.subscribers.notify_all(&record, &emotion_after).await;
        }

        CycleOutcome::Accepted(record)
    }

    async fn mark(&self, event: &str, note: &str) {
        if let Err(e) = self.log.mark_time(event, Some(note)).await {
            tracing::warn!("Failed to write {} marker: {:#}", event, e);
        }
    }
}

/// Resolves once the state becomes `Stopped`.
async fn stopped(rx: &mut watch::Receiver<DaemonState>) {
    let _ = rx.wait_for(|s| *s == DaemonState::Stopped).await;
}

/// Sleep for `delay` of running time. Paused time does not count.
/// Returns false once stopped.
async fn wait_running(rx: &mut watch::Receiver<DaemonState>, delay: Duration) -> bool {
    let mut remaining = delay;
    loop {
        let state = *rx.borrow_and_update();
        match state {
            DaemonState::Stopped => return false,
            DaemonState::Paused => {
                if rx.changed().await.is_err() {
                    return false;
                }
                continue;
            }
            DaemonState::Running => {}
        }

        if remaining.is_zero() {
            return true;
        }
        let started = Instant::now();
        tokio::select! {
            _ = tokio::time::sleep(remaining) => return true,
            changed = rx.changed() => {
                if changed.is_err() {
                    return false;
                }
                remaining = remaining.saturating_sub(started.elapsed());
            }
        }
    }
}
