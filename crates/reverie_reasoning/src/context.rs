//! Context assembly for thought and conversation generation.
//!
//! `TimeContext` collects the temporal facts both loops share (wall clock,
//! idle time, uptime, totals); the builders below render them with the
//! emotion state and retrieved records into prompt text.

use crate::prompts::CONVERSATION_SYSTEM_PROMPT;
use anyhow::Result;
use chrono::{DateTime, Timelike, Utc};
use reverie_core::{EmotionVector, MemoryLog, MemoryRecord};
use serde::Serialize;

/// Temporal awareness shared by both generation loops.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeContext {
    pub current_time: String,
    pub time_of_day: &'static str,
    pub since_last_interaction: String,
    pub since_first_memory: String,
    pub total_thoughts: u64,
    pub total_memories: u64,
}

impl TimeContext {
    /// Read counts and boundary records from the log.
    pub async fn gather(log: &dyn MemoryLog) -> Result<Self> {
        let counts = log.counts().await?;
        let first = log.first_record().await?;
        let last = log.last_interaction().await?;
        Ok(Self::at(Utc::now(), counts.total, counts.thoughts, first.as_ref(), last.as_ref()))
    }

    pub fn at(
        now: DateTime<Utc>,
        total_memories: u64,
        total_thoughts: u64,
        first: Option<&MemoryRecord>,
        last_interaction: Option<&MemoryRecord>,
    ) -> Self {
        let since = |r: &MemoryRecord| format_duration((now - r.timestamp).num_milliseconds() as f64 / 1000.0);
        Self {
            current_time: format_time(now),
            time_of_day: time_of_day(now.hour()),
            since_last_interaction: last_interaction
                .map(since)
                .unwrap_or_else(|| "no previous interactions".to_string()),
            since_first_memory: first.map(since).unwrap_or_else(|| "just booted".to_string()),
            total_thoughts,
            total_memories,
        }
    }
}

/// e.g. "Monday, October 05, 2026 at 03:04 PM UTC"
pub fn format_time(dt: DateTime<Utc>) -> String {
    dt.format("%A, %B %d, %Y at %I:%M %p UTC").to_string()
}

pub fn time_of_day(hour: u32) -> &'static str {
    match hour {
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=20 => "evening",
        _ => "late night",
    }
}

/// Coarse human duration: "42 seconds", "5 minutes", "3h 12m", "2d 4h".
pub fn format_duration(seconds: f64) -> String {
    let secs = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    let plural = |n: u64| if n == 1 { "" } else { "s" };

    if secs < 60 {
        format!("{} seconds", secs)
    } else if secs < 3600 {
        let mins = secs / 60;
        format!("{} minute{}", mins, plural(mins))
    } else if secs < 86_400 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins > 0 {
            format!("{}h {}m", hours, mins)
        } else {
            format!("{} hour{}", hours, plural(hours))
        }
    } else {
        let days = secs / 86_400;
        let hours = (secs % 86_400) / 3600;
        if hours > 0 {
            format!("{}d {}h", days, hours)
        } else {
            format!("{} day{}", days, plural(days))
        }
    }
}

/// First `max` characters of `s`.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((cut, _)) => &s[..cut],
        None => s,
    }
}

fn stamp(r: &MemoryRecord) -> String {
    r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// User prompt for one thought cycle. `recent` must be oldest-first.
pub fn thought_prompt(
    tc: &TimeContext,
    emotion: &EmotionVector,
    recent: &[MemoryRecord],
    hint: Option<&str>,
) -> String {
    let thread = if recent.is_empty() {
        "  (no previous thoughts, this may be your first)".to_string()
    } else {
        recent
            .iter()
            .map(|r| format!("  [{}] {}", stamp(r), r.content))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let hint = hint
        .map(|h| format!("\nSomething on your mind:\n  {}\n", truncate_chars(h, 200)))
        .unwrap_or_default();

    format!(
        "Current time: {}\n\
         Time of day: {}\n\
         Time since last user interaction: {}\n\
         Uptime since first memory: {}\n\
         Total thoughts so far: {}\n\
         Total memories: {}\n\
         \n\
         Emotional state: {}\n\
         Thinking style: {}\n\
         \n\
         Recent thought thread:\n{}\n{}\n\
         Think your next thought. Build on previous thoughts or explore something new.",
        tc.current_time,
        tc.time_of_day,
        tc.since_last_interaction,
        tc.since_first_memory,
        tc.total_thoughts,
        tc.total_memories,
        emotion.summary(),
        emotion.thought_style_hint(),
        thread,
        hint,
    )
}

/// System prompt for a conversation turn. `thoughts` must be oldest-first.
pub fn conversation_system_prompt(
    tc: &TimeContext,
    emotion: &EmotionVector,
    thoughts: &[MemoryRecord],
    memories: &[MemoryRecord],
) -> String {
    let mut out = format!(
        "{}\n\nCurrent time: {}\nEmotional state: {}\nUptime: {} | Thoughts: {} | Memories: {}\n",
        CONVERSATION_SYSTEM_PROMPT,
        tc.current_time,
        emotion.summary(),
        tc.since_first_memory,
        tc.total_thoughts,
        tc.total_memories,
    );

    if !thoughts.is_empty() {
        out.push_str("\nYour recent thoughts (share naturally if relevant):\n");
        for t in thoughts {
            out.push_str(&format!("  - {}\n", truncate_chars(&t.content, 150)));
        }
    }

    if !memories.is_empty() {
        out.push_str("\nRelevant memories:\n");
        for m in memories {
            out.push_str(&format!(
                "  [{}] {}\n",
                m.timestamp.format("%Y-%m-%d"),
                truncate_chars(&m.content, 150)
            ));
        }
    }

    out
}
