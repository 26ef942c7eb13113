//! Terminal input parsing and output formatting.

use reverie_core::MemoryRecord;
use reverie_reasoning::{MindStatus, ThoughtEvent};

pub const DEFAULT_LISTING: usize = 10;

pub const HELP: &str = "\
Commands:
  /new              start a new conversation thread
  /pause            pause the background thought loop
  /resume           resume it
  /thoughts [n]     show the last n thoughts (default 10)
  /search <query>   keyword search over all memories
  /status           emotions, counts and loop state
  /help             this text
  /quit             leave
Anything else is sent as a chat message.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Chat(String),
    New,
    Pause,
    Resume,
    Thoughts(usize),
    Search(String),
    Status,
    Help,
    Quit,
    /// Malformed arguments; carries the usage hint.
    Usage(&'static str),
    Unknown(String),
}

pub fn parse(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Chat(line.to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    match name.to_ascii_lowercase().as_str() {
        "new" => Command::New,
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "thoughts" if arg.is_empty() => Command::Thoughts(DEFAULT_LISTING),
        "thoughts" => match arg.parse::<usize>() {
            Ok(n) if n > 0 => Command::Thoughts(n),
            _ => Command::Usage("/thoughts [n] where n is a positive number"),
        },
        "search" if arg.is_empty() => Command::Usage("/search <query>"),
        "search" => Command::Search(arg.to_string()),
        other => Command::Unknown(other.to_string()),
    }
}

pub fn format_thought(event: &ThoughtEvent) -> String {
    let record = &event.record;
    let number = record
        .metadata
        .as_ref()
        .and_then(|m| m.get("thought_number"))
        .and_then(|n| n.as_u64());
    let category = record
        .metadata
        .as_ref()
        .and_then(|m| m.get("category"))
        .and_then(|c| c.as_str())
        .unwrap_or("thought");
    match number {
        Some(n) => format!("~ #{} ({}) {}", n, category, record.content),
        None => format!("~ ({}) {}", category, record.content),
    }
}

pub fn format_record(record: &MemoryRecord) -> String {
    format!(
        "[{}] {:<12} {}",
        record.timestamp.format("%Y-%m-%d %H:%M"),
        record.kind,
        record.content
    )
}

pub fn format_status(status: &MindStatus) -> String {
    let e = &status.emotions;
    let mut out = format!(
        "Mood: {} (dominant: {})\n\
         curiosity {:.2} | satisfaction {:.2} | frustration {:.2} | excitement {:.2}\n\
         focus {:.2} | empathy {:.2} | confidence {:.2}\n\
         Thought loop: {:?}\n\
         Memories: {} ({} thoughts)\n\
         Time: {} ({})\n\
         Last interaction: {}\n\
         Uptime: {}",
        status.summary,
        status.dominant,
        e.curiosity,
        e.satisfaction,
        e.frustration,
        e.excitement,
        e.focus,
        e.empathy,
        e.confidence,
        status.daemon,
        status.counts.total,
        status.counts.thoughts,
        status.time.current_time,
        status.time.time_of_day,
        status.time.since_last_interaction,
        status.time.since_first_memory,
    );
    if let Some(thread) = &status.thread_id {
        out.push_str(&format!("\nConversation: {}", thread));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use reverie_core::EmotionVector;

    #[test]
    fn test_plain_text_is_chat() {
        assert_eq!(parse("  hello there "), Command::Chat("hello there".into()));
        assert_eq!(parse("   "), Command::Empty);
    }

    #[test]
    fn test_commands() {
        assert_eq!(parse("/new"), Command::New);
        assert_eq!(parse("/PAUSE"), Command::Pause);
        assert_eq!(parse("/resume"), Command::Resume);
        assert_eq!(parse("/status"), Command::Status);
        assert_eq!(parse("/exit"), Command::Quit);
        assert_eq!(parse("/frobnicate now"), Command::Unknown("frobnicate".into()));
    }

    #[test]
    fn test_thoughts_argument() {
        assert_eq!(parse("/thoughts"), Command::Thoughts(DEFAULT_LISTING));
        assert_eq!(parse("/thoughts 25"), Command::Thoughts(25));
        assert!(matches!(parse("/thoughts zero"), Command::Usage(_)));
        assert!(matches!(parse("/thoughts 0"), Command::Usage(_)));
    }

    #[test]
    fn test_search_needs_query() {
        assert_eq!(parse("/search  rainy  days "), Command::Search("rainy  days".into()));
        assert!(matches!(parse("/search"), Command::Usage(_)));
    }

    #[test]
    fn test_format_thought_uses_metadata() {
        let record = MemoryRecord {
            id: 3,
            timestamp: Utc::now(),
            kind: "thought".into(),
            content: "rain has a rhythm".into(),
            emotion: None,
            thread_id: None,
            importance: 0.4,
            metadata: Some(serde_json::json!({"thought_number": 12, "category": "discovery"})),
        };
        let event = ThoughtEvent {
            record: record.clone(),
            emotion: EmotionVector::default(),
        };
        assert_eq!(format_thought(&event), "~ #12 (discovery) rain has a rhythm");

        let bare = ThoughtEvent {
            record: MemoryRecord { metadata: None, ..record },
            emotion: EmotionVector::default(),
        };
        assert_eq!(format_thought(&bare), "~ (thought) rain has a rhythm");
    }
}
