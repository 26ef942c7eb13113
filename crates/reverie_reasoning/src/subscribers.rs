//! Thought delivery to external observers.

use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::join_all;
use reverie_core::{EmotionVector, MemoryRecord};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// An accepted thought as seen by live observers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThoughtEvent {
    pub record: MemoryRecord,
    /// Emotion after the thought's category event was applied.
    pub emotion: EmotionVector,
}

/// Receives every accepted thought.
#[async_trait]
pub trait ThoughtSubscriber: Send + Sync {
    fn name(&self) -> &str {
        "subscriber"
    }

    async fn notify(&self, record: &MemoryRecord, emotion: &EmotionVector) -> Result<()>;
}

/// Fans out to all subscribers concurrently. A slow or failing subscriber is
/// logged and skipped; it never delays the others past `timeout`.
pub struct SubscriberSet {
    subscribers: Vec<Arc<dyn ThoughtSubscriber>>,
    timeout: Duration,
}

impl SubscriberSet {
    pub fn new(timeout: Duration) -> Self {
        Self {
            subscribers: Vec::new(),
            timeout,
        }
    }

    pub fn add(&mut self, subscriber: Arc<dyn ThoughtSubscriber>) {
        self.subscribers.push(subscriber);
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Returns how many subscribers were notified successfully.
    pub async fn notify_all(&self, record: &MemoryRecord, emotion: &EmotionVector) -> usize {
        let deliveries = self.subscribers.iter().map(|sub| async move {
            match tokio::time::timeout(self.timeout, sub.notify(record, emotion)).await {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    tracing::warn!("Subscriber '{}' failed: {:#}", sub.name(), e);
                    false
                }
                Err(_) => {
                    tracing::warn!("Subscriber '{}' timed out after {:?}", sub.name(), self.timeout);
                    false
                }
            }
        });
        join_all(deliveries).await.into_iter().filter(|ok| *ok).count()
    }
}

/// Feeds a `broadcast` channel; having no live receivers is not an error.
pub struct BroadcastSubscriber {
    tx: broadcast::Sender<ThoughtEvent>,
}

impl BroadcastSubscriber {
    pub fn new(tx: broadcast::Sender<ThoughtEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ThoughtSubscriber for BroadcastSubscriber {
    fn name(&self) -> &str {
        "broadcast"
    }

    async fn notify(&self, record: &MemoryRecord, emotion: &EmotionVector) -> Result<()> {
        let event = ThoughtEvent {
            record: record.clone(),
            emotion: *emotion,
        };
        if self.tx.send(event).is_err() {
            tracing::trace!("No live thought receivers");
        }
        Ok(())
    }
}
