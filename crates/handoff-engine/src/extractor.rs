//! Field extraction: utterance -> candidate field updates

use async_trait::async_trait;
use handoff_core::{FieldName, Record, StreamEvent};
use handoff_llm::{LlmProvider, LlmRequest};
use std::sync::Arc;
use tracing::debug;

use crate::error::{CapabilityError, CapabilityResult};
use crate::normalize::collapse_whitespace;

/// One candidate `(field, raw value)` pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldUpdate {
    pub field: FieldName,
    pub value: String,
}

impl FieldUpdate {
    pub fn new(field: FieldName, value: impl Into<String>) -> Self {
        Self { field, value: value.into() }
    }
}

/// Maps an event to zero or more field updates. Must not touch any state.
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract(&self, event: &StreamEvent, record: &Record) -> CapabilityResult<Vec<FieldUpdate>>;
}

// ============================================================
// Keyword extractor
// ============================================================

const DEFAULT_KEYWORDS: &[(FieldName, &[&str])] = &[
    (FieldName::Situation, &["sat", "oxygen", "spo2", "vent", "pressure", "etco2"]),
    (FieldName::Background, &["history", "recent", "surgery", "comorbidity", "background"]),
    (FieldName::Assessment, &["diagnosis", "tension", "assessment", "exam", "finding"]),
    (
        FieldName::Recommendation,
        &["prepare", "needle", "decompression", "give", "administer", "recommend", "action", "plan"],
    ),
];

/// Offline extractor: the first field whose keyword list matches the
/// lowercased text receives the whole utterance.
#[derive(Clone, Debug)]
pub struct KeywordExtractor {
    table: Vec<(FieldName, Vec<String>)>,
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self {
            table: DEFAULT_KEYWORDS
                .iter()
                .map(|(f, words)| (*f, words.iter().map(|w| w.to_string()).collect()))
                .collect(),
        }
    }
}

impl KeywordExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the keyword table. Order is priority order.
    pub fn with_table(table: Vec<(FieldName, Vec<String>)>) -> Self {
        let table = table
            .into_iter()
            .map(|(f, words)| (f, words.into_iter().map(|w| w.to_lowercase()).collect()))
            .collect();
        Self { table }
    }

    pub fn classify(&self, text: &str) -> Option<FieldName> {
        let lower = text.to_lowercase();
        self.table
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w.as_str())))
            .map(|(f, _)| *f)
    }
}

#[async_trait]
impl FieldExtractor for KeywordExtractor {
    async fn extract(&self, event: &StreamEvent, _record: &Record) -> CapabilityResult<Vec<FieldUpdate>> {
        let value = collapse_whitespace(event.text());
        if value.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .classify(&value)
            .map(|field| vec![FieldUpdate::new(field, value)])
            .unwrap_or_default())
    }
}

// ============================================================
// LLM extractor
// ============================================================

const EXTRACTOR_INSTRUCTIONS: &str = "You label utterances from an operating-room emergency. \
Decide which SBAR field the utterance updates: SITUATION (current vitals and status), \
BACKGROUND (history, recent events), ASSESSMENT (diagnosis, findings) or \
RECOMMENDATION (actions to take). Reply with exactly one of SITUATION, BACKGROUND, \
ASSESSMENT, RECOMMENDATION or NONE.";

/// Asks a model which field the utterance belongs to.
pub struct LlmFieldExtractor {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl LlmFieldExtractor {
    pub fn new(provider: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: 8,
            temperature: 0.0,
        }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn build_prompt(event: &StreamEvent, record: &Record) -> String {
        let mut prompt = String::from("Current SBAR:\n");
        for (field, value) in record.entries() {
            prompt.push_str(&format!("- {}: {}\n", field.label(), value.unwrap_or("None")));
        }
        prompt.push_str(&format!(
            "\nUtterance at t={:.1}s:\n{}\n\nField:",
            event.start_offset(),
            event.text()
        ));
        prompt
    }

    /// Map a model reply to a field. `Ok(None)` for an explicit NONE.
    pub fn parse_label(response: &str) -> CapabilityResult<Option<FieldName>> {
        let word = response
            .split(|c: char| !c.is_ascii_alphabetic())
            .find(|w| !w.is_empty())
            .unwrap_or("");
        if word.eq_ignore_ascii_case("none") {
            return Ok(None);
        }
        if word.len() < 2 {
            return Err(CapabilityError::unparseable(response.trim()));
        }
        word.parse::<FieldName>()
            .map(Some)
            .map_err(|_| CapabilityError::unparseable(response.trim()))
    }
}

#[async_trait]
impl FieldExtractor for LlmFieldExtractor {
    async fn extract(&self, event: &StreamEvent, record: &Record) -> CapabilityResult<Vec<FieldUpdate>> {
        let value = collapse_whitespace(event.text());
        if value.is_empty() {
            return Ok(Vec::new());
        }
        let request = LlmRequest::single_turn(
            self.model.clone(),
            Some(EXTRACTOR_INSTRUCTIONS.to_string()),
            Self::build_prompt(event, record),
        )
        .with_max_tokens(self.max_tokens)
        .with_temperature(self.temperature);

        let response = self.provider.complete(request, None).await?;
        debug!(provider = self.provider.name(), response = %response.trim(), "Extractor reply");
        Ok(Self::parse_label(&response)?
            .map(|field| vec![FieldUpdate::new(field, value)])
            .unwrap_or_default())
    }
}

// ============================================================
// Closure adapter
// ============================================================

pub struct FnExtractor<F>(F);

/// Adapt a plain function or closure into a [`FieldExtractor`].
pub fn extractor_fn<F>(f: F) -> FnExtractor<F>
where
    F: Fn(&StreamEvent, &Record) -> CapabilityResult<Vec<FieldUpdate>> + Send + Sync,
{
    FnExtractor(f)
}

#[async_trait]
impl<F> FieldExtractor for FnExtractor<F>
where
    F: Fn(&StreamEvent, &Record) -> CapabilityResult<Vec<FieldUpdate>> + Send + Sync,
{
    async fn extract(&self, event: &StreamEvent, record: &Record) -> CapabilityResult<Vec<FieldUpdate>> {
        (self.0)(event, record)
    }
}
