//! # Reverie Limbic System
//!
//! Holds the live emotion state shared by the thought loop and the
//! conversation handler. Every mutation goes through [`EmotionEngine`],
//! which clamps, publishes on a watch channel and snapshots to storage.

mod engine;

pub use engine::{EmotionEngine, DECAY_TRIGGER};
