//! Significance oracles: decide whether an update is worth surfacing
//!
//! The gate treats every `Err` as "not significant", so implementations
//! should report ambiguity as an error rather than guess.

use async_trait::async_trait;
use handoff_core::{Record, Snapshot, StreamEvent};
use handoff_llm::{LlmProvider, LlmRequest};
use std::sync::Arc;
use tracing::debug;

use crate::error::{CapabilityError, CapabilityResult};

#[async_trait]
pub trait SignificanceOracle: Send + Sync {
    /// `history` holds recently emitted snapshots, oldest first.
    async fn decide(&self, event: &StreamEvent, record: &Record, history: &[Snapshot]) -> CapabilityResult<bool>;
}

/// Every update is significant. Useful for demos and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysSignificant;

#[async_trait]
impl SignificanceOracle for AlwaysSignificant {
    async fn decide(&self, _event: &StreamEvent, _record: &Record, _history: &[Snapshot]) -> CapabilityResult<bool> {
        Ok(true)
    }
}

/// Offline oracle: significant iff the trigger text mentions a trigger word.
#[derive(Debug, Clone)]
pub struct KeywordOracle {
    words: Vec<String>,
}

impl Default for KeywordOracle {
    fn default() -> Self {
        Self::new(["sat", "pressure", "tension", "needle", "decompression"])
    }
}

impl KeywordOracle {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words.into_iter().map(|w| w.as_ref().to_lowercase()).collect(),
        }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }
}

#[async_trait]
impl SignificanceOracle for KeywordOracle {
    async fn decide(&self, event: &StreamEvent, _record: &Record, _history: &[Snapshot]) -> CapabilityResult<bool> {
        let text = event.text().to_lowercase();
        Ok(self.words.iter().any(|w| text.contains(w.as_str())))
    }
}

// ============================================================
// LLM oracle
// ============================================================

const ORACLE_INSTRUCTIONS: &str = "You are monitoring a patient in the OR. Decide if the new observation \
indicates a significant change in patient status that should update the SBAR. \
Reply with 'SIGNIFICANT' or 'NO CHANGE' only.";

/// Phrases that mean "not significant". Checked before the positive token,
/// since "not significant" contains it.
const NEGATIVE_PHRASES: &[&str] = &["no change", "not significant", "insignificant"];
const POSITIVE_TOKEN: &str = "significant";

pub struct LlmOracle {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl LlmOracle {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 16,
            temperature: 0.0,
        }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn build_prompt(event: &StreamEvent, record: &Record, history: &[Snapshot]) -> String {
        let history_text = if history.is_empty() {
            "None available.".to_string()
        } else {
            history
                .iter()
                .rev()
                .enumerate()
                .map(|(i, snap)| {
                    let fields: Vec<String> = snap
                        .record()
                        .entries()
                        .map(|(f, v)| format!("{}: {}", f.label(), v.unwrap_or("None")))
                        .collect();
                    format!("{}. {}", i + 1, fields.join(" | "))
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        let mut prompt = format!(
            "{}\n\nRecent SBAR history (most recent first):\n{}\n\nCurrent SBAR:\n",
            ORACLE_INSTRUCTIONS, history_text
        );
        for (field, value) in record.entries() {
            prompt.push_str(&format!("- {}: {}\n", field.label(), value.unwrap_or("None")));
        }
        prompt.push_str(&format!(
            "\nNew observation at t={:.1}s:\n{}\n\nAnswer:",
            event.start_offset(),
            event.text()
        ));
        prompt
    }
}

/// Two-way verdict. Anything that is neither is an error.
pub fn parse_verdict(response: &str) -> CapabilityResult<bool> {
    let normalized = response.trim().to_lowercase();
    if NEGATIVE_PHRASES.iter().any(|p| normalized.contains(p)) {
        return Ok(false);
    }
    if normalized.contains(POSITIVE_TOKEN) {
        return Ok(true);
    }
    Err(CapabilityError::unparseable(response.trim()))
}

#[async_trait]
impl SignificanceOracle for LlmOracle {
    async fn decide(&self, event: &StreamEvent, record: &Record, history: &[Snapshot]) -> CapabilityResult<bool> {
        let request = LlmRequest::single_turn(self.model.clone(), None, Self::build_prompt(event, record, history))
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature);
        let response = self.provider.complete(request, None).await?;
        debug!(provider = self.provider.name(), response = %response.trim(), "Oracle reply");
        parse_verdict(&response)
    }
}

// ============================================================
// Closure adapter
// ============================================================

pub struct FnOracle<F>(F);

/// Adapt a plain function or closure into a [`SignificanceOracle`].
pub fn oracle_fn<F>(f: F) -> FnOracle<F>
where
    F: Fn(&StreamEvent, &Record, &[Snapshot]) -> CapabilityResult<bool> + Send + Sync,
{
    FnOracle(f)
}

#[async_trait]
impl<F> SignificanceOracle for FnOracle<F>
where
    F: Fn(&StreamEvent, &Record, &[Snapshot]) -> CapabilityResult<bool> + Send + Sync,
{
    async fn decide(&self, event: &StreamEvent, record: &Record, history: &[Snapshot]) -> CapabilityResult<bool> {
        (self.0)(event, record, history)
    }
}
