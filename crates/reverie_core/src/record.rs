use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::emotion::EmotionVector;

pub const DEFAULT_IMPORTANCE: f32 = 0.5;

/// Record kinds. The column is an open string; these are the ones the runtime writes.
pub mod kinds {
    pub const USER_MESSAGE: &str = "user-message";
    pub const RESPONSE: &str = "response";
    pub const THOUGHT: &str = "thought";
    pub const SELF_EDIT: &str = "self-edit";
}

/// Lifecycle marker names.
pub mod markers {
    pub const FIRST_BOOT: &str = "first-boot";
    pub const BOOT: &str = "boot";
    pub const DAEMON_START: &str = "daemon-start";
    pub const DAEMON_STOP: &str = "daemon-stop";
    pub const SHUTDOWN: &str = "shutdown";
}

/// Clamp importance into [0, 1]; NaN becomes the default.
pub fn clamp_importance(v: f32) -> f32 {
    if v.is_nan() {
        DEFAULT_IMPORTANCE
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// One entry of the memory log. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub content: String,
    pub emotion: Option<EmotionVector>,
    pub thread_id: Option<String>,
    pub importance: f32,
    pub metadata: Option<serde_json::Value>,
}

impl MemoryRecord {
    pub fn is_interaction(&self) -> bool {
        self.kind == kinds::USER_MESSAGE || self.kind == kinds::RESPONSE
    }

    /// Read a boolean flag from metadata; absent or non-boolean reads as false.
    pub fn flag(&self, key: &str) -> bool {
        self.metadata
            .as_ref()
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Write-side builder. The log assigns `id` and `timestamp`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub kind: String,
    pub content: String,
    pub emotion: Option<EmotionVector>,
    pub thread_id: Option<String>,
    pub importance: f32,
    pub metadata: Option<serde_json::Value>,
}

impl NewRecord {
    pub fn new(kind: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            content: content.into(),
            emotion: None,
            thread_id: None,
            importance: DEFAULT_IMPORTANCE,
            metadata: None,
        }
    }

    pub fn thought(content: impl Into<String>) -> Self {
        Self::new(kinds::THOUGHT, content)
    }

    pub fn with_emotion(mut self, emotion: EmotionVector) -> Self {
        self.emotion = Some(emotion);
        self
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = clamp_importance(importance);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Point-in-time copy of the emotion vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionSnapshot {
    pub timestamp: DateTime<Utc>,
    pub emotion: EmotionVector,
    pub trigger: Option<String>,
}

impl EmotionSnapshot {
    pub fn now(emotion: EmotionVector, trigger: Option<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            emotion,
            trigger,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeMarker {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub total: u64,
    pub thoughts: u64,
}
