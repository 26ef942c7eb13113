use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReverieConfig {
    pub memory: MemoryConfig,
    #[serde(deserialize_with = "thought_llm")]
    pub thought_llm: LlmConfig,
    #[serde(deserialize_with = "conversation_llm")]
    pub conversation_llm: LlmConfig,
    pub cognition: CognitionConfig,
    pub dialogue: DialogueConfig,
}

impl Default for ReverieConfig {
    fn default() -> Self {
        Self {
            memory: MemoryConfig::default(),
            thought_llm: LlmConfig::thought_defaults(),
            conversation_llm: LlmConfig::conversation_defaults(),
            cognition: CognitionConfig::default(),
            dialogue: DialogueConfig::default(),
        }
    }
}

impl ReverieConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: ReverieConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("REVERIE_DB_PATH") {
            self.memory.db_path = v;
        }
        if let Ok(v) = std::env::var("THOUGHT_PROVIDER") {
            self.thought_llm.provider = v;
        }
        if let Ok(v) = std::env::var("THOUGHT_MODEL") {
            self.thought_llm.model = v;
        }
        if let Ok(v) = std::env::var("CONVERSATION_PROVIDER") {
            self.conversation_llm.provider = v;
        }
        if let Ok(v) = std::env::var("CONVERSATION_MODEL") {
            self.conversation_llm.model = v;
        }
        // Local backend endpoint; the conversation backend keeps its own default.
        if let Ok(v) = std::env::var("LLM_BASE_URL") {
            self.thought_llm.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("REVERIE_MIN_INTERVAL") {
            if let Ok(n) = v.parse() {
                self.cognition.min_interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("REVERIE_MAX_INTERVAL") {
            if let Ok(n) = v.parse() {
                self.cognition.max_interval_secs = n;
            }
        }
    }
}

fn secs(v: f64) -> Duration {
    if v.is_finite() && v > 0.0 {
        Duration::from_secs_f64(v)
    } else {
        Duration::ZERO
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub db_path: String,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: "reverie.db".to_string(),
        }
    }
}

/// One generation backend. `provider` is one of `ollama`, `anthropic`, `mock`.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
}

impl LlmConfig {
    pub fn thought_defaults() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "qwen2.5:3b".to_string(),
            base_url: None,
            temperature: 0.9,
            max_tokens: 80,
            request_timeout_secs: 120,
        }
    }

    pub fn conversation_defaults() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-haiku-4-5-20251001".to_string(),
            base_url: None,
            temperature: 0.7,
            max_tokens: 2048,
            request_timeout_secs: 60,
        }
    }
}

/// Partial `[*_llm]` table; missing keys keep the section's own defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LlmOverrides {
    provider: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    request_timeout_secs: Option<u64>,
}

impl LlmOverrides {
    fn over(self, mut base: LlmConfig) -> LlmConfig {
        if let Some(v) = self.provider {
            base.provider = v;
        }
        if let Some(v) = self.model {
            base.model = v;
        }
        if self.base_url.is_some() {
            base.base_url = self.base_url;
        }
        if let Some(v) = self.temperature {
            base.temperature = v;
        }
        if let Some(v) = self.max_tokens {
            base.max_tokens = v;
        }
        if let Some(v) = self.request_timeout_secs {
            base.request_timeout_secs = v;
        }
        base
    }
}

fn thought_llm<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<LlmConfig, D::Error> {
    LlmOverrides::deserialize(d).map(|o| o.over(LlmConfig::thought_defaults()))
}

fn conversation_llm<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<LlmConfig, D::Error> {
    LlmOverrides::deserialize(d).map(|o| o.over(LlmConfig::conversation_defaults()))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CognitionConfig {
    pub min_interval_secs: f64,
    pub max_interval_secs: f64,
    pub jitter_secs: f64,
    pub error_cooldown_secs: f64,
    pub backend_timeout_secs: f64,
    /// Word-set Jaccard overlap above which a new thought is discarded.
    pub dedup_threshold: f32,
    pub dedup_window: usize,
    pub hint_probability: f64,
    pub max_thought_chars: usize,
    pub context_thoughts: usize,
    pub subscriber_timeout_secs: f64,
}

impl Default for CognitionConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: 8.0,
            max_interval_secs: 30.0,
            jitter_secs: 3.0,
            error_cooldown_secs: 10.0,
            backend_timeout_secs: 60.0,
            dedup_threshold: 0.4,
            dedup_window: 10,
            hint_probability: 0.15,
            max_thought_chars: 200,
            context_thoughts: 5,
            subscriber_timeout_secs: 2.0,
        }
    }
}

impl CognitionConfig {
    pub fn min_interval(&self) -> Duration {
        secs(self.min_interval_secs)
    }

    pub fn max_interval(&self) -> Duration {
        secs(self.max_interval_secs)
    }

    pub fn jitter(&self) -> Duration {
        secs(self.jitter_secs)
    }

    pub fn error_cooldown(&self) -> Duration {
        secs(self.error_cooldown_secs)
    }

    pub fn backend_timeout(&self) -> Duration {
        secs(self.backend_timeout_secs)
    }

    pub fn subscriber_timeout(&self) -> Duration {
        secs(self.subscriber_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    pub history_turns: usize,
    pub memory_hits: usize,
    pub context_thoughts: usize,
    pub user_importance: f32,
    pub response_importance: f32,
    /// Route conversation to the thought backend when the primary one fails.
    pub fallback_to_thought_backend: bool,
    pub backend_timeout_secs: f64,
    /// Budget for the primary backend before the fallback is tried.
    pub primary_timeout_secs: f64,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            history_turns: 20,
            memory_hits: 3,
            context_thoughts: 5,
            user_importance: 0.7,
            response_importance: 0.5,
            fallback_to_thought_backend: true,
            backend_timeout_secs: 180.0,
            primary_timeout_secs: 50.0,
        }
    }
}

impl DialogueConfig {
    pub fn backend_timeout(&self) -> Duration {
        secs(self.backend_timeout_secs)
    }

    /// Capped at half the whole-turn budget so the fallback always gets the
    /// rest.
    pub fn primary_timeout(&self) -> Duration {
        secs(self.primary_timeout_secs).min(self.backend_timeout() / 2)
    }
}

// ============================================================================
// Tests
// ============================================================================
