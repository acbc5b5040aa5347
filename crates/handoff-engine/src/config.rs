//! Engine configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Consensus voting parameters.
    pub consensus: ConsensusConfig,
    /// Change gate parameters.
    pub gate: GateConfig,
    /// Clarifying question parameters.
    pub questions: QuestionConfig,
    /// Clinician data responder parameters.
    pub responder: ResponderConfig,
    /// LLM backend for the oracle/extractor capabilities.
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Seconds after which an observation's weight is halved.
    pub half_life_secs: f64,
    /// Recent observations kept per field for voting.
    pub window: usize,
    /// Top-two score gap below which a field is contested.
    pub margin: f64,
    /// Whitespace tokens kept per value before truncation.
    pub max_tokens_per_field: usize,
    /// Confidence used when the caller does not supply one.
    pub default_confidence: f64,
    /// Consensus score below which a field needs clarification.
    pub clarification_threshold: f64,
    /// Confidence ceiling for observations that contradict the consensus.
    pub conflict_confidence_cap: f64,
}

/// Which timeline observation timestamps and decay are measured on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecayClock {
    /// Scene offsets drive the clock; replays are deterministic.
    #[default]
    Scene,
    /// Wall-clock time, for live streams.
    Wall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Emitted snapshots passed to the oracle as history.
    pub history_depth: usize,
    /// Oracle call budget in milliseconds.
    pub oracle_timeout_ms: u64,
    /// Extractor call budget in milliseconds.
    pub extractor_timeout_ms: u64,
    pub decay_clock: DecayClock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestionConfig {
    /// Questions returned per snapshot.
    pub max_questions: usize,
    /// Asked when no candidate survives deduplication.
    pub default_question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    /// Budget for attaching an answer to a question, in milliseconds.
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    #[default]
    Anthropic,
    /// OpenAI-compatible endpoint (LM Studio by default).
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmBackend,
    pub model: String,
    /// Endpoint override. Empty means the provider default.
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

// ============================================================
// Defaults
// ============================================================

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            half_life_secs: 120.0,
            window: 6,
            margin: 0.2,
            max_tokens_per_field: 12,
            default_confidence: 0.8,
            clarification_threshold: 0.5,
            conflict_confidence_cap: 0.5,
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            history_depth: 2,
            oracle_timeout_ms: 15_000,
            extractor_timeout_ms: 15_000,
            decay_clock: DecayClock::Scene,
        }
    }
}

impl Default for QuestionConfig {
    fn default() -> Self {
        Self {
            max_questions: 1,
            default_question: "What additional clinical data would help clarify the situation?".into(),
        }
    }
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self { timeout_ms: 2_000 }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmBackend::Anthropic,
            model: "claude-haiku-4-5".into(),
            base_url: String::new(),
            max_tokens: 16,
            temperature: 0.0,
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl EngineConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

impl GateConfig {
    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_millis(self.oracle_timeout_ms)
    }

    pub fn extractor_timeout(&self) -> Duration {
        Duration::from_millis(self.extractor_timeout_ms)
    }
}

impl ResponderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
