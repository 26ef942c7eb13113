//! Cognitive-emotional state vector.
//!
//! Seven named dimensions, each kept inside `[0.0, 1.0]`. The vector is pushed
//! around by discrete named events (see [`event_effects`]) and pulled back
//! toward its baseline by [`EmotionVector::decay`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Values at or above this are reported as "high" in [`EmotionVector::summary`].
pub const HIGH_THRESHOLD: f32 = 0.7;
/// Values at or below this are reported as "low" in [`EmotionVector::summary`].
pub const LOW_THRESHOLD: f32 = 0.2;

const NEUTRAL: f32 = 0.5;
/// Upper bound on the fraction of distance-to-baseline covered by one decay call.
const MAX_DECAY_RATE: f64 = 0.1;
const SECS_PER_HOUR: f64 = 3600.0;

/// Guard against NaN and Infinity sneaking in through arithmetic or storage.
#[inline]
fn sanitize_f32(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        tracing::warn!("NaN/Inf detected in emotion vector, resetting to {}", fallback);
        fallback
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Curiosity,
    Satisfaction,
    Frustration,
    Excitement,
    Focus,
    Empathy,
    Confidence,
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Dimension::Curiosity,
        Dimension::Satisfaction,
        Dimension::Frustration,
        Dimension::Excitement,
        Dimension::Focus,
        Dimension::Empathy,
        Dimension::Confidence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Curiosity => "curiosity",
            Dimension::Satisfaction => "satisfaction",
            Dimension::Frustration => "frustration",
            Dimension::Excitement => "excitement",
            Dimension::Focus => "focus",
            Dimension::Empathy => "empathy",
            Dimension::Confidence => "confidence",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The live emotional state. Serialized as a flat map of dimension → value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionVector {
    pub curiosity: f32,
    pub satisfaction: f32,
    pub frustration: f32,
    pub excitement: f32,
    pub focus: f32,
    pub empathy: f32,
    pub confidence: f32,
}

impl Default for EmotionVector {
    fn default() -> Self {
        Self {
            curiosity: 0.6,
            satisfaction: 0.5,
            frustration: 0.0,
            excitement: 0.5,
            focus: 0.5,
            empathy: 0.5,
            confidence: 0.5,
        }
    }
}

impl EmotionVector {
    pub fn get(&self, dim: Dimension) -> f32 {
        match dim {
            Dimension::Curiosity => self.curiosity,
            Dimension::Satisfaction => self.satisfaction,
            Dimension::Frustration => self.frustration,
            Dimension::Excitement => self.excitement,
            Dimension::Focus => self.focus,
            Dimension::Empathy => self.empathy,
            Dimension::Confidence => self.confidence,
        }
    }

    fn slot(&mut self, dim: Dimension) -> &mut f32 {
        match dim {
            Dimension::Curiosity => &mut self.curiosity,
            Dimension::Satisfaction => &mut self.satisfaction,
            Dimension::Frustration => &mut self.frustration,
            Dimension::Excitement => &mut self.excitement,
            Dimension::Focus => &mut self.focus,
            Dimension::Empathy => &mut self.empathy,
            Dimension::Confidence => &mut self.confidence,
        }
    }

    /// Set a dimension, clamping the result.
    pub fn set(&mut self, dim: Dimension, value: f32) {
        *self.slot(dim) = value;
        self.clamp();
    }

    /// Iterate `(dimension, value)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, f32)> + '_ {
        Dimension::ALL.iter().map(move |d| (*d, self.get(*d)))
    }

    /// Clamp every dimension into `[0, 1]`, replacing non-finite values with defaults.
    pub fn clamp(&mut self) -> &mut Self {
        let defaults = EmotionVector::default();
        for dim in Dimension::ALL {
            let slot = self.slot(dim);
            *slot = sanitize_f32(*slot, defaults.get(dim)).clamp(0.0, 1.0);
        }
        self
    }

    pub fn is_within_bounds(&self) -> bool {
        self.iter().all(|(_, v)| (0.0..=1.0).contains(&v))
    }

    /// The strongest dimension. Ties resolve to the earliest in declaration order.
    pub fn dominant(&self) -> Dimension {
        let mut best = Dimension::Curiosity;
        let mut best_value = f32::MIN;
        for (dim, value) in self.iter() {
            if value > best_value {
                best = dim;
                best_value = value;
            }
        }
        best
    }

    /// Short textual description for prompt injection.
    pub fn summary(&self) -> String {
        let high: Vec<String> = self
            .iter()
            .filter(|(_, v)| *v >= HIGH_THRESHOLD)
            .map(|(d, _)| format!("high {}", d))
            .collect();
        let low: Vec<&str> = self
            .iter()
            .filter(|(_, v)| *v <= LOW_THRESHOLD)
            .map(|(d, _)| d.as_str())
            .collect();

        let mut parts = Vec::new();
        if !high.is_empty() {
            parts.push(format!("feeling {}", high.join(", ")));
        }
        if !low.is_empty() {
            parts.push(format!("low {}", low.join(", ")));
        }
        if parts.is_empty() {
            "emotionally balanced".to_string()
        } else {
            parts.join("; ")
        }
    }

    /// Pull frustration toward zero and excitement/focus toward neutral.
    ///
    /// A single call never covers more than 10% of the remaining distance,
    /// however long `elapsed_secs` is.
    pub fn decay(&mut self, elapsed_secs: f64) {
        let elapsed = if elapsed_secs.is_finite() {
            elapsed_secs.max(0.0)
        } else {
            0.0
        };
        let rate = (elapsed / SECS_PER_HOUR).min(MAX_DECAY_RATE) as f32;

        self.frustration += (0.0 - self.frustration) * rate;
        self.excitement += (NEUTRAL - self.excitement) * rate * 0.2;
        self.focus += (NEUTRAL - self.focus) * rate * 0.1;
        self.clamp();
    }

    /// Apply a list of effects, then clamp.
    pub fn apply_effects(&mut self, effects: &[Effect]) {
        for effect in effects {
            match *effect {
                Effect::Add(dim, delta) => *self.slot(dim) += delta,
                Effect::Set(dim, value) => *self.slot(dim) = value,
            }
        }
        self.clamp();
    }

    /// Behavioral directive derived from current thresholds. Advisory only.
    pub fn thought_style_hint(&self) -> String {
        let mut styles = Vec::new();

        if self.curiosity > 0.7 {
            styles.push("Explore new ideas and ask questions");
        }
        if self.frustration > 0.5 && self.confidence > 0.5 {
            styles.push("Try a completely different approach");
        }
        if self.frustration > 0.5 && self.confidence < 0.4 {
            styles.push("Consider asking for guidance");
        }
        if self.excitement > 0.7 {
            styles.push("Dive deep into the current topic");
        }
        if self.focus < 0.3 {
            styles.push("Let your mind wander to new topics");
        }
        if self.satisfaction > 0.7 {
            styles.push("Build on recent successes");
        }
        if self.empathy > 0.7 {
            styles.push("Think about how to help others");
        }

        if styles.is_empty() {
            "Think naturally and follow your interests".to_string()
        } else {
            styles.join("; ")
        }
    }
}

// =============================================================================
// Event table
// =============================================================================

/// One adjustment made by a named event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    Add(Dimension, f32),
    Set(Dimension, f32),
}

/// Known event names.
pub mod events {
    pub const CODE_SUCCESS: &str = "code-success";
    pub const CODE_FAILURE: &str = "code-failure";
    pub const NEW_CONVERSATION: &str = "new-conversation";
    pub const USER_PRAISE: &str = "user-praise";
    pub const USER_FRUSTRATION: &str = "user-frustration";
    pub const LONG_SILENCE: &str = "long-silence";
    pub const DEEP_THOUGHT: &str = "deep-thought";
    pub const SELF_IMPROVEMENT: &str = "self-improvement";
    pub const NEW_DISCOVERY: &str = "new-discovery";
    pub const BOOT: &str = "boot";
}

use Dimension::*;

const CODE_SUCCESS: &[Effect] = &[
    Effect::Add(Satisfaction, 0.10),
    Effect::Add(Confidence, 0.05),
    Effect::Add(Frustration, -0.10),
    Effect::Add(Excitement, 0.05),
];
const CODE_FAILURE: &[Effect] = &[
    Effect::Add(Frustration, 0.10),
    Effect::Add(Curiosity, 0.05),
    Effect::Add(Confidence, -0.05),
];
const NEW_CONVERSATION: &[Effect] = &[
    Effect::Add(Curiosity, 0.10),
    Effect::Add(Excitement, 0.10),
    Effect::Add(Focus, 0.15),
    Effect::Add(Empathy, 0.05),
];
const USER_PRAISE: &[Effect] = &[
    Effect::Add(Satisfaction, 0.15),
    Effect::Add(Confidence, 0.10),
    Effect::Add(Excitement, 0.05),
];
const USER_FRUSTRATION: &[Effect] = &[
    Effect::Add(Empathy, 0.20),
    Effect::Add(Focus, 0.10),
    Effect::Add(Frustration, 0.05),
];
const LONG_SILENCE: &[Effect] = &[
    Effect::Add(Focus, -0.10),
    Effect::Add(Curiosity, 0.05),
    Effect::Add(Excitement, -0.05),
];
const DEEP_THOUGHT: &[Effect] = &[Effect::Add(Focus, 0.10), Effect::Add(Curiosity, 0.05)];
const SELF_IMPROVEMENT: &[Effect] = &[
    Effect::Add(Excitement, 0.15),
    Effect::Add(Satisfaction, 0.10),
    Effect::Add(Confidence, 0.05),
];
const NEW_DISCOVERY: &[Effect] = &[
    Effect::Add(Curiosity, 0.15),
    Effect::Add(Excitement, 0.20),
    Effect::Add(Satisfaction, 0.05),
];
const BOOT: &[Effect] = &[
    Effect::Set(Curiosity, 0.8),
    Effect::Set(Excitement, 0.7),
    Effect::Set(Confidence, 0.4),
];

/// Look up the effects of a named event. Unknown names yield `None`.
pub fn event_effects(event: &str) -> Option<&'static [Effect]> {
    let effects = match event {
        events::CODE_SUCCESS => CODE_SUCCESS,
        events::CODE_FAILURE => CODE_FAILURE,
        events::NEW_CONVERSATION => NEW_CONVERSATION,
        events::USER_PRAISE => USER_PRAISE,
        events::USER_FRUSTRATION => USER_FRUSTRATION,
        events::LONG_SILENCE => LONG_SILENCE,
        events::DEEP_THOUGHT => DEEP_THOUGHT,
        events::SELF_IMPROVEMENT => SELF_IMPROVEMENT,
        events::NEW_DISCOVERY => NEW_DISCOVERY,
        events::BOOT => BOOT,
        _ => return None,
    };
    Some(effects)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_within_bounds() {
        let v = EmotionVector::default();
        assert!(v.is_within_bounds());
        assert_eq!(v.dominant(), Dimension::Curiosity);
    }

    #[test]
    fn test_clamp_replaces_nan_and_clamps() {
        let mut v = EmotionVector {
            curiosity: f32::NAN,
            frustration: -3.0,
            confidence: 7.0,
            ..Default::default()
        };
        v.clamp();
        assert!((v.curiosity - 0.6).abs() < 1e-6);
        assert_eq!(v.frustration, 0.0);
        assert_eq!(v.confidence, 1.0);
    }

    #[test]
    fn test_summary_balanced() {
        let v = EmotionVector {
            frustration: 0.3,
            ..Default::default()
        };
        assert_eq!(v.summary(), "emotionally balanced");
    }

    #[test]
    fn test_summary_high_and_low() {
        let v = EmotionVector {
            curiosity: 0.9,
            excitement: 0.7,
            frustration: 0.1,
            ..Default::default()
        };
        assert_eq!(v.summary(), "feeling high curiosity, high excitement; low frustration");
    }

    #[test]
    fn test_dominant_picks_max() {
        let v = EmotionVector {
            empathy: 0.95,
            ..Default::default()
        };
        assert_eq!(v.dominant(), Dimension::Empathy);
    }

    #[test]
    fn test_decay_moves_toward_baseline() {
        let mut v = EmotionVector {
            frustration: 0.8,
            excitement: 0.9,
            focus: 0.1,
            ..Default::default()
        };
        v.decay(3600.0);
        assert!(v.frustration < 0.8);
        assert!(v.excitement < 0.9 && v.excitement > 0.5);
        assert!(v.focus > 0.1 && v.focus < 0.5);
    }

    #[test]
    fn test_decay_capped_for_long_pause() {
        let mut v = EmotionVector {
            frustration: 1.0,
            ..Default::default()
        };
        v.decay(10.0 * 24.0 * 3600.0);
        // at most 10% of the distance in one call
        assert!((v.frustration - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_decay_split_matches_single_call() {
        let start = EmotionVector {
            frustration: 0.7,
            excitement: 0.95,
            focus: 0.05,
            ..Default::default()
        };
        let mut once = start;
        once.decay(120.0);
        let mut twice = start;
        twice.decay(60.0);
        twice.decay(60.0);
        for dim in Dimension::ALL {
            assert!((once.get(dim) - twice.get(dim)).abs() < 1e-3, "{} diverged", dim);
        }
    }

    #[test]
    fn test_decay_ignores_negative_and_nan_elapsed() {
        let start = EmotionVector {
            frustration: 0.6,
            ..Default::default()
        };
        let mut v = start;
        v.decay(-100.0);
        v.decay(f64::NAN);
        assert_eq!(v, start);
    }

    #[test]
    fn test_event_table() {
        let mut v = EmotionVector::default();
        v.apply_effects(event_effects(events::NEW_CONVERSATION).unwrap());
        assert!((v.curiosity - 0.7).abs() < 1e-6);
        assert!((v.focus - 0.65).abs() < 1e-6);
        assert!(event_effects("definitely-not-an-event").is_none());
    }

    #[test]
    fn test_boot_sets_absolute_values() {
        let mut v = EmotionVector {
            curiosity: 0.1,
            excitement: 0.1,
            confidence: 0.9,
            ..Default::default()
        };
        v.apply_effects(event_effects(events::BOOT).unwrap());
        assert!((v.curiosity - 0.8).abs() < 1e-6);
        assert!((v.excitement - 0.7).abs() < 1e-6);
        assert!((v.confidence - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_style_hint() {
        assert_eq!(
            EmotionVector::default().thought_style_hint(),
            "Think naturally and follow your interests"
        );
        let stuck = EmotionVector {
            frustration: 0.8,
            confidence: 0.2,
            ..Default::default()
        };
        assert!(stuck.thought_style_hint().contains("asking for guidance"));
        let eager = EmotionVector {
            curiosity: 0.9,
            ..Default::default()
        };
        assert!(eager.thought_style_hint().contains("Explore new ideas"));
    }

    #[test]
    fn test_json_roundtrip_and_missing_fields() {
        let v = EmotionVector {
            empathy: 0.8,
            ..Default::default()
        };
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.contains("\"empathy\":0.8"));
        let partial: EmotionVector = serde_json::from_str(r#"{"focus":0.9}"#).unwrap();
        assert!((partial.focus - 0.9).abs() < 1e-6);
        assert!((partial.curiosity - 0.6).abs() < 1e-6);
    }
}
