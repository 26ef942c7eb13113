//! Keyword-based reaction detection for user messages.
//!
//! Shared across crates to avoid duplicating word lists.

use crate::emotion::events;

const PRAISE: &[&str] = &["thanks", "thank you", "great", "awesome", "perfect", "love", "amazing"];

const FRUSTRATION: &[&str] = &["frustrated", "annoyed", "broken", "wrong", "hate", "useless"];

/// How a user message reads, coarsely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Praise,
    Frustration,
    Neutral,
}

impl Reaction {
    /// The emotion event this reaction raises, if any.
    pub fn event(&self) -> Option<&'static str> {
        match self {
            Reaction::Praise => Some(events::USER_PRAISE),
            Reaction::Frustration => Some(events::USER_FRUSTRATION),
            Reaction::Neutral => None,
        }
    }
}

/// Classify a message. Praise wins when both vocabularies match.
pub fn detect_reaction(text: &str) -> Reaction {
    let lower = text.to_lowercase();
    if PRAISE.iter().any(|w| lower.contains(w)) {
        Reaction::Praise
    } else if FRUSTRATION.iter().any(|w| lower.contains(w)) {
        Reaction::Frustration
    } else {
        Reaction::Neutral
    }
}
