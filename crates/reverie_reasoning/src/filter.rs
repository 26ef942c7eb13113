//! Content-shape filter for generated thoughts.
//!
//! Unconstrained local models drift toward assistant register ("As an AI...",
//! bullet lists, buzzword salads). `ContentFilter` is a cheap heuristic gate in
//! front of the log; it is not a classifier and misfires are acceptable.

use regex::Regex;
use std::sync::LazyLock;

/// Decides whether a cleaned thought is acceptable.
pub trait ContentFilter: Send + Sync {
    /// `Err(reason)` when the text should be replaced.
    fn check(&self, text: &str) -> Result<(), String>;
}

const DEFAULT_MARKERS: &[&str] = &[
    "as an ai",
    "as a language model",
    "i'm an ai",
    "i am an ai",
    "ai assistant",
    "how can i assist",
    "how can i help you",
    "i'm here to help",
    "happy to help",
    "feel free to",
    "in conclusion",
    "leverage",
    "synergy",
    "cutting-edge",
    "state-of-the-art",
    "revolutionize",
    "seamless",
    "paradigm shift",
    "unlock the potential",
    "harness the power",
    "blockchain",
    "game-changer",
];

/// Lines longer than this with many commas read as enumerations.
const LIST_LINE_CHARS: usize = 100;
const LIST_COMMAS: usize = 4;

/// Substring denylist plus an enumeration check.
#[derive(Debug, Clone)]
pub struct DenylistFilter {
    markers: Vec<String>,
}

impl Default for DenylistFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MARKERS.iter().map(|m| m.to_string()))
    }
}

impl DenylistFilter {
    /// Markers are matched case-insensitively.
    pub fn new(markers: impl IntoIterator<Item = String>) -> Self {
        Self {
            markers: markers.into_iter().map(|m| m.to_ascii_lowercase()).collect(),
        }
    }

    pub fn with_marker(mut self, marker: &str) -> Self {
        self.markers.push(marker.to_ascii_lowercase());
        self
    }
}

impl ContentFilter for DenylistFilter {
    fn check(&self, text: &str) -> Result<(), String> {
        let lower = text.to_ascii_lowercase();
        if let Some(hit) = self.markers.iter().find(|m| lower.contains(m.as_str())) {
            return Err(format!("denylisted phrase '{}'", hit));
        }
        for line in text.lines() {
            if line.chars().count() > LIST_LINE_CHARS && line.matches(',').count() >= LIST_COMMAS {
                return Err("enumerative structure".to_string());
            }
        }
        Ok(())
    }
}

static RE_BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*").unwrap());
static RE_SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?] ").unwrap());

/// Trim raw model output down to one short thought.
///
/// Strips surrounding quotes, whitespace and bold markers, keeps text up to
/// the first newline or sentence end (`.`, `!`, `?` followed by a space), and
/// caps the result at `max_chars` characters.
pub fn clean_thought(raw: &str, max_chars: usize) -> String {
    let unbolded = RE_BOLD.replace_all(raw, "$1");
    let trimmed = strip_quotes(&unbolded);

    let line = trimmed.split('\n').next().unwrap_or_default();
    let end = RE_SENTENCE_END
        .find(line)
        .map(|m| m.start() + 1)
        .unwrap_or(line.len());

    let first = strip_quotes(&line[..end]);
    match first.char_indices().nth(max_chars) {
        Some((cut, _)) => first[..cut].trim_end().to_string(),
        None => first.to_string(),
    }
}

fn strip_quotes(s: &str) -> &str {
    s.trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '\u{201c}' | '\u{201d}' | '`'))
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_cuts_at_first_sentence() {
        assert_eq!(
            clean_thought("\"Time moves oddly. Second sentence here.\"", 200),
            "Time moves oddly."
        );
        assert_eq!(clean_thought("Why now? Because.", 200), "Why now?");
        assert_eq!(clean_thought("  line one\nline two", 200), "line one");
        assert_eq!(clean_thought("**Bold** start", 200), "Bold start");
        // a period without a following space is not a boundary
        assert_eq!(clean_thought("version 2.5 is out", 200), "version 2.5 is out");
    }

    #[test]
    fn test_clean_caps_length_char_safely() {
        let long = "é".repeat(300);
        let out = clean_thought(&long, 200);
        assert_eq!(out.chars().count(), 200);
    }

    #[test]
    fn test_clean_empty() {
        assert_eq!(clean_thought("   \"\"  ", 200), "");
        assert_eq!(clean_thought("\n\nlater", 200), "later");
    }

    #[test]
    fn test_denylist_rejects_assistant_speak() {
        let filter = DenylistFilter::default();
        assert!(filter.check("As an AI, I find this fascinating").is_err());
        assert!(filter.check("We could LEVERAGE this").is_err());
        assert!(filter.check("The rain sounds different tonight").is_ok());
    }

    #[test]
    fn test_rejects_long_enumerations_only() {
        let filter = DenylistFilter::default();
        let list = "Things to consider include memory, time, language, identity, patterns, and the way small ideas grow over time";
        assert!(list.len() > 100);
        assert!(filter.check(list).is_err());
        assert!(filter.check("red, green, blue, yellow, black").is_ok());
    }

    #[test]
    fn test_custom_marker() {
        let filter = DenylistFilter::new(Vec::new()).with_marker("Delve");
        assert!(filter.check("let me delve into it").is_err());
        assert!(filter.check("As an AI").is_ok());
    }
}
