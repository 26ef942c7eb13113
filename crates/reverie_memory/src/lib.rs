//! SQLite-backed memory log.
//!
//! Implements [`reverie_core::MemoryLog`] and [`reverie_core::EmotionStore`]
//! over a single `sqlx` pool: append-only records, emotion snapshots and
//! lifecycle time markers.

pub mod sqlite;

pub use sqlite::SqliteMemory;
