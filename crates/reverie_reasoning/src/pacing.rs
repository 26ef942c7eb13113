//! Thought pacing.
//!
//! Excited, curious states think faster; flat states drift toward the
//! maximum interval.

use rand::Rng;
use reverie_core::config::CognitionConfig;
use reverie_core::EmotionVector;
use std::time::Duration;

/// Computes the wait between thoughts from the emotion state.
#[derive(Debug, Clone)]
pub struct ThoughtPacer {
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub jitter: Duration,
}

impl ThoughtPacer {
    pub fn new(min_interval: Duration, max_interval: Duration, jitter: Duration) -> Self {
        // a reversed range collapses to the minimum
        let max_interval = max_interval.max(min_interval);
        Self {
            min_interval,
            max_interval,
            jitter,
        }
    }

    pub fn from_config(cfg: &CognitionConfig) -> Self {
        Self::new(cfg.min_interval(), cfg.max_interval(), cfg.jitter())
    }

    /// Delay before jitter: `max - (max - min) * (excitement + curiosity) / 2`.
    pub fn base_delay(&self, emotion: &EmotionVector) -> Duration {
        let min = self.min_interval.as_secs_f64();
        let max = self.max_interval.as_secs_f64();
        let speed = ((emotion.excitement + emotion.curiosity) as f64 / 2.0).clamp(0.0, 1.0);
        Duration::from_secs_f64(max - (max - min) * speed)
    }

    /// Base delay plus uniform jitter in `[-jitter, +jitter]`, never below the minimum.
    pub fn next_delay(&self, emotion: &EmotionVector) -> Duration {
        let base = self.base_delay(emotion).as_secs_f64();
        let j = self.jitter.as_secs_f64();
        let offset = if j > 0.0 {
            rand::thread_rng().gen_range(-j..=j)
        } else {
            0.0
        };
        let secs = (base + offset).max(self.min_interval.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pacer() -> ThoughtPacer {
        ThoughtPacer::new(Duration::from_secs(8), Duration::from_secs(30), Duration::from_secs(3))
    }

    fn with_drive(excitement: f32, curiosity: f32) -> EmotionVector {
        EmotionVector {
            excitement,
            curiosity,
            ..Default::default()
        }
    }

    #[test]
    fn test_base_delay_extremes() {
        let p = pacer();
        assert_eq!(p.base_delay(&with_drive(0.0, 0.0)), Duration::from_secs(30));
        assert_eq!(p.base_delay(&with_drive(1.0, 1.0)), Duration::from_secs(8));
        assert_eq!(p.base_delay(&with_drive(0.5, 0.5)), Duration::from_secs(19));
    }

    #[test]
    fn test_excited_state_thinks_faster() {
        let p = pacer();
        assert!(p.base_delay(&with_drive(0.9, 0.9)) < p.base_delay(&with_drive(0.1, 0.2)));
    }

    #[test]
    fn test_next_delay_within_jitter_and_floor() {
        let p = pacer();
        for _ in 0..200 {
            let fast = p.next_delay(&with_drive(1.0, 1.0));
            assert!(fast >= Duration::from_secs(8));
            assert!(fast <= Duration::from_secs(11));

            let slow = p.next_delay(&with_drive(0.0, 0.0));
            assert!(slow >= Duration::from_secs(27));
            assert!(slow <= Duration::from_secs(33));
        }
    }

    #[test]
    fn test_reversed_range_collapses() {
        let p = ThoughtPacer::new(Duration::from_secs(10), Duration::from_secs(5), Duration::ZERO);
        assert_eq!(p.next_delay(&with_drive(0.0, 0.0)), Duration::from_secs(10));
    }
}
