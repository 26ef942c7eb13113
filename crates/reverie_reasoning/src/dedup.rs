//! Near-duplicate detection over a sliding window of accepted thoughts.

use std::collections::{HashSet, VecDeque};

/// Word-set Jaccard similarity in [0, 1]. Two empty texts count as identical.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let wa = word_set(a);
    let wb = word_set(b);
    if wa.is_empty() && wb.is_empty() {
        return 1.0;
    }
    let inter = wa.intersection(&wb).count();
    let union = wa.union(&wb).count();
    inter as f64 / union as f64
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Remembers the last `window` accepted thoughts.
#[derive(Debug, Clone)]
pub struct DuplicateGuard {
    recent: VecDeque<String>,
    window: usize,
    threshold: f64,
}

impl DuplicateGuard {
    pub fn new(window: usize, threshold: f64) -> Self {
        Self {
            recent: VecDeque::with_capacity(window),
            window,
            threshold,
        }
    }

    /// True when `text` overlaps any remembered thought by more than the threshold.
    pub fn is_duplicate(&self, text: &str) -> bool {
        self.recent.iter().any(|prev| jaccard(prev, text) > self.threshold)
    }

    pub fn remember(&mut self, text: impl Into<String>) {
        if self.window == 0 {
            return;
        }
        while self.recent.len() >= self.window {
            self.recent.pop_front();
        }
        self.recent.push_back(text.into());
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jaccard_basics() {
        assert_eq!(jaccard("a b c", "a b c"), 1.0);
        assert_eq!(jaccard("a b", "c d"), 0.0);
        assert!((jaccard("The cat sat", "the cat ran") - 0.5).abs() < 1e-9);
        // punctuation and case are ignored
        assert_eq!(jaccard("Hello, world!", "hello world"), 1.0);
    }

    #[test]
    fn test_guard_detects_overlap() {
        let mut guard = DuplicateGuard::new(10, 0.4);
        guard.remember("I wonder about the nature of time");
        assert!(guard.is_duplicate("I wonder about the nature of memory"));
        assert!(!guard.is_duplicate("Rain on the window sounds like static"));
    }

    #[test]
    fn test_rephrased_thought_is_rejected_new_topic_accepted() {
        let mut guard = DuplicateGuard::new(10, 0.4);
        guard.remember("the sky is blue today");
        // 4 shared words out of 6
        assert!((jaccard("the sky is blue today", "the sky looks blue today") - 4.0 / 6.0).abs() < 1e-9);
        assert!(guard.is_duplicate("the sky looks blue today"));
        assert!(!guard.is_duplicate("markets closed lower"));
    }

    #[test]
    fn test_guard_window_evicts_oldest() {
        let mut guard = DuplicateGuard::new(2, 0.4);
        guard.remember("alpha beta gamma");
        guard.remember("one two three");
        guard.remember("red green blue");
        assert_eq!(guard.len(), 2);
        assert!(!guard.is_duplicate("alpha beta gamma"));
        assert!(guard.is_duplicate("red green blue"));
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut guard = DuplicateGuard::new(10, 0.5);
        guard.remember("the cat sat");
        // exactly 0.5 overlap is allowed
        assert!(!guard.is_duplicate("the cat ran"));
    }

    #[test]
    fn test_zero_window_remembers_nothing() {
        let mut guard = DuplicateGuard::new(0, 0.4);
        guard.remember("anything");
        assert!(guard.is_empty());
        assert!(!guard.is_duplicate("anything"));
    }
}
