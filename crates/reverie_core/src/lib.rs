pub mod config;
pub mod emotion;
pub mod record;
pub mod sentiment;

pub use config::ReverieConfig;
pub use emotion::{Dimension, EmotionVector};
pub use record::{Counts, EmotionSnapshot, MemoryRecord, NewRecord, TimeMarker};

use async_trait::async_trait;

/// Append-only store of memory records and lifecycle markers.
///
/// Every listing is bounded by `limit`; a limit of zero returns nothing.
#[async_trait]
pub trait MemoryLog: Send + Sync {
    /// Persist a record, returning its assigned id.
    async fn append(&self, record: NewRecord) -> anyhow::Result<i64>;

    /// Newest-first, optionally filtered by kind.
    async fn recent(&self, kind: Option<&str>, limit: usize) -> anyhow::Result<Vec<MemoryRecord>>;

    /// The last `limit` records of a thread, oldest-first.
    async fn by_thread(&self, thread_id: &str, limit: usize) -> anyhow::Result<Vec<MemoryRecord>>;

    /// Records containing every whitespace token of `query`, most important first.
    async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<MemoryRecord>>;

    async fn counts(&self) -> anyhow::Result<Counts>;

    async fn first_record(&self) -> anyhow::Result<Option<MemoryRecord>>;

    /// Latest user message or response.
    async fn last_interaction(&self) -> anyhow::Result<Option<MemoryRecord>>;

    async fn mark_time(&self, event: &str, note: Option<&str>) -> anyhow::Result<()>;
}

/// Persistence for emotion snapshots.
#[async_trait]
pub trait EmotionStore: Send + Sync {
    async fn record_emotion(&self, snapshot: &EmotionSnapshot) -> anyhow::Result<()>;
    async fn latest_emotion(&self) -> anyhow::Result<Option<EmotionSnapshot>>;
}
