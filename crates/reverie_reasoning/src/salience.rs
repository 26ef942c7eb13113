//! Importance scoring and categorisation of accepted thoughts.

use reverie_core::emotion::events;

/// What kind of thought was produced; each maps to an emotion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThoughtCategory {
    Discovery,
    SelfImprovement,
    DeepThought,
}

impl ThoughtCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThoughtCategory::Discovery => "discovery",
            ThoughtCategory::SelfImprovement => "self-improvement",
            ThoughtCategory::DeepThought => "deep-thought",
        }
    }

    /// Emotion event raised when a thought of this category is accepted.
    pub fn event(&self) -> &'static str {
        match self {
            ThoughtCategory::Discovery => events::NEW_DISCOVERY,
            ThoughtCategory::SelfImprovement => events::SELF_IMPROVEMENT,
            ThoughtCategory::DeepThought => events::DEEP_THOUGHT,
        }
    }
}

/// Pluggable importance heuristic.
pub trait ImportanceScorer: Send + Sync {
    /// Importance in [0, 1] plus category.
    fn score(&self, text: &str) -> (f32, ThoughtCategory);
}

const BASE: f32 = 0.4;
const SALIENT: &[&str] = &["important", "key", "critical", "breakthrough"];
const CREATION: &[&str] = &["code", "build", "create"];
const REFERENCE: &[&str] = &["user", "help", "someone"];
const DISCOVERY: &[&str] = &["discover", "realize", "insight", "idea"];
const IMPROVEMENT: &[&str] = &["improve", "better", "optimize", "fix", "edit", "update"];

/// Keyword-bonus scorer.
#[derive(Debug, Clone, Default)]
pub struct KeywordScorer;

fn mentions(lower: &str, words: &[&str]) -> bool {
    words.iter().any(|w| lower.contains(w))
}

impl ImportanceScorer for KeywordScorer {
    fn score(&self, text: &str) -> (f32, ThoughtCategory) {
        let lower = text.to_ascii_lowercase();

        let mut importance = BASE;
        if mentions(&lower, SALIENT) {
            importance += 0.2;
        }
        if mentions(&lower, CREATION) {
            importance += 0.1;
        }
        if mentions(&lower, REFERENCE) {
            importance += 0.1;
        }
        if text.contains('(') && text.contains(')') {
            importance += 0.1;
        }

        let category = if mentions(&lower, DISCOVERY) {
            ThoughtCategory::Discovery
        } else if mentions(&lower, IMPROVEMENT) {
            ThoughtCategory::SelfImprovement
        } else {
            ThoughtCategory::DeepThought
        };

        (importance.min(1.0), category)
    }
}
