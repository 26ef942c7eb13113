//! Live emotion state.
//!
//! The EmotionEngine owns the single authoritative EmotionVector. It:
//! - Applies named events and time-based decay
//! - Persists a snapshot on every mutation (best-effort)
//! - Publishes the live vector on a watch channel

use reverie_core::emotion::{event_effects, EmotionVector};
use reverie_core::{EmotionSnapshot, EmotionStore};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

pub const DECAY_TRIGGER: &str = "decay";

struct Inner {
    vector: EmotionVector,
    last_tick: Instant,
}

pub struct EmotionEngine {
    /// Critical section is read-modify-clamp-persist.
    inner: Mutex<Inner>,

    /// Live vector for lock-free readers.
    state_watch_tx: watch::Sender<EmotionVector>,

    /// Snapshot persistence. `None` keeps everything in memory.
    store: Option<Arc<dyn EmotionStore>>,
}

impl EmotionEngine {
    /// Engine with default values and no persistence.
    pub fn new() -> Self {
        Self::build(EmotionVector::default(), None)
    }

    pub fn with_store(store: Arc<dyn EmotionStore>) -> Self {
        Self::build(EmotionVector::default(), Some(store))
    }

    /// Start from a specific vector (clamped).
    pub fn with_initial(mut vector: EmotionVector, store: Option<Arc<dyn EmotionStore>>) -> Self {
        vector.clamp();
        Self::build(vector, store)
    }

    fn build(vector: EmotionVector, store: Option<Arc<dyn EmotionStore>>) -> Self {
        let (state_watch_tx, _) = watch::channel(vector);
        Self {
            inner: Mutex::new(Inner {
                vector,
                last_tick: Instant::now(),
            }),
            state_watch_tx,
            store,
        }
    }

    /// Load the most recent persisted snapshot into the live state.
    ///
    /// Returns true when a snapshot was found. Failures leave the defaults in place.
    pub async fn hydrate(&self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.latest_emotion().await {
            Ok(Some(snapshot)) => {
                let mut inner = self.inner.lock().await;
                inner.vector = snapshot.emotion;
                inner.vector.clamp();
                self.state_watch_tx.send_replace(inner.vector);
                tracing::info!(
                    "Emotion state restored from {} ({})",
                    snapshot.timestamp.to_rfc3339(),
                    inner.vector.summary()
                );
                true
            }
            Ok(None) => {
                tracing::debug!("No persisted emotion snapshot, starting from defaults");
                false
            }
            Err(e) => {
                tracing::warn!("Failed to load emotion snapshot: {:#}", e);
                false
            }
        }
    }

    /// Apply a named event. Unknown names are a no-op returning false.
    pub async fn apply(&self, event: &str, details: Option<&str>) -> bool {
        let Some(effects) = event_effects(event) else {
            tracing::debug!("Ignoring unknown emotion event '{}'", event);
            return false;
        };

        let trigger = match details {
            Some(d) if !d.is_empty() => format!("{}: {}", event, d),
            _ => event.to_string(),
        };

        let mut inner = self.inner.lock().await;
        inner.vector.apply_effects(effects);
        let vector = inner.vector;
        self.state_watch_tx.send_replace(vector);
        self.persist(vector, trigger).await;
        tracing::trace!("Applied emotion event {}: {}", event, vector.summary());
        true
    }

    /// Decay toward baseline by `elapsed_secs`.
    pub async fn decay(&self, elapsed_secs: f64) {
        let mut inner = self.inner.lock().await;
        inner.vector.decay(elapsed_secs);
        let vector = inner.vector;
        self.state_watch_tx.send_replace(vector);
        self.persist(vector, DECAY_TRIGGER.to_string()).await;
    }

    /// Decay by the wall-clock time since the previous tick (or engine creation).
    pub async fn tick(&self) {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(inner.last_tick).as_secs_f64();
        inner.last_tick = now;
        inner.vector.decay(elapsed);
        let vector = inner.vector;
        self.state_watch_tx.send_replace(vector);
        self.persist(vector, DECAY_TRIGGER.to_string()).await;
    }

    /// Force a state (for manual intervention and tests).
    pub async fn set_state(&self, mut vector: EmotionVector, trigger: &str) {
        vector.clamp();
        let mut inner = self.inner.lock().await;
        inner.vector = vector;
        self.state_watch_tx.send_replace(vector);
        self.persist(vector, trigger.to_string()).await;
    }

    /// Current live vector.
    pub fn snapshot(&self) -> EmotionVector {
        *self.state_watch_tx.borrow()
    }

    /// Subscribe to state updates
    pub fn subscribe(&self) -> watch::Receiver<EmotionVector> {
        self.state_watch_tx.subscribe()
    }

    pub fn summary(&self) -> String {
        self.snapshot().summary()
    }

    pub fn thought_style_hint(&self) -> String {
        self.snapshot().thought_style_hint()
    }

    async fn persist(&self, vector: EmotionVector, trigger: String) {
        let Some(store) = &self.store else {
            return;
        };
        let snapshot = EmotionSnapshot::now(vector, Some(trigger));
        if let Err(e) = store.record_emotion(&snapshot).await {
            tracing::warn!("Failed to persist emotion snapshot: {:#}", e);
        }
    }
}

impl Default for EmotionEngine {
    fn default() -> Self {
        Self::new()
    }
}
