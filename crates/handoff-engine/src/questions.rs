//! Clarifying question generation
//!
//! Candidates come from three places, in priority order: keywords in the
//! triggering utterance, fields still missing from the record, and the
//! first cognitive prompt of each relevant protocol. Questions already asked
//! in this session are never repeated.

use handoff_core::{FieldName, Record};
use std::collections::HashSet;

use crate::config::QuestionConfig;

/// Anything that can contribute a protocol-derived prompt.
pub trait PromptSource {
    fn first_cognitive_prompt(&self) -> Option<&str>;
}

impl PromptSource for Vec<String> {
    fn first_cognitive_prompt(&self) -> Option<&str> {
        self.first().map(|s| s.as_str())
    }
}

const KEYWORD_QUESTIONS: &[(&[&str], &str)] = &[
    (
        &["bp", "blood pressure", "pressure"],
        "Could you update the current blood pressure and any recent trends?",
    ),
    (
        &["sat", "spo2", "oxygen"],
        "What is the latest oxygen saturation and how has it been changing?",
    ),
    (
        &["etco2", "co2"],
        "Can you provide the most recent end-tidal CO2 value and trajectory?",
    ),
    (
        &["heart rate", "pulse", "tachy", "brady"],
        "What is the current heart rate and rhythm status?",
    ),
    (
        &["med", "drug", "dose", "phenylephrine", "epi", "vaso", "bolus"],
        "Which medications or interventions were given most recently and what was the response?",
    ),
    (
        &["procedure", "decompression", "tube", "needle", "line"],
        "What procedures have been performed so far and what were their outcomes?",
    ),
];

pub fn missing_field_question(field: FieldName) -> &'static str {
    match field {
        FieldName::Situation => "Can you summarize the current situation or most pressing concern?",
        FieldName::Background => "What noteworthy background or comorbidities should we keep in mind?",
        FieldName::Assessment => "What is your leading assessment or differential at this moment?",
        FieldName::Recommendation => "What actions or next steps are being considered right now?",
    }
}

/// Coerce to interrogative form: trimmed, one trailing `?`.
/// Returns `None` for blank input.
pub fn to_question(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut question = if trimmed.ends_with('?') {
        trimmed.to_string()
    } else {
        format!("{}?", trimmed.trim_end_matches('.'))
    };
    while question.contains("??") {
        question = question.replace("??", "?");
    }
    Some(question)
}

pub struct QuestionGenerator {
    config: QuestionConfig,
    /// Lowercased questions already asked this session.
    asked: HashSet<String>,
}

impl Default for QuestionGenerator {
    fn default() -> Self {
        Self::new(QuestionConfig::default())
    }
}

impl QuestionGenerator {
    pub fn new(config: QuestionConfig) -> Self {
        Self {
            config,
            asked: HashSet::new(),
        }
    }

    pub fn config(&self) -> &QuestionConfig {
        &self.config
    }

    pub fn default_question(&self) -> &str {
        &self.config.default_question
    }

    /// Forget every question asked so far. Call at session boundaries.
    pub fn reset(&mut self) {
        self.asked.clear();
    }

    pub fn asked_count(&self) -> usize {
        self.asked.len()
    }

    /// Up to `max_questions` new questions; the default question when none survive.
    pub fn generate<P: PromptSource>(&mut self, record: &Record, event_text: &str, protocols: &[P]) -> Vec<String> {
        let mut candidates: Vec<String> = Vec::new();

        let lowered = event_text.trim().to_lowercase();
        for (keywords, question) in KEYWORD_QUESTIONS {
            if keywords.iter().any(|k| lowered.contains(k)) {
                candidates.push(question.to_string());
            }
        }
        for field in record.missing_fields() {
            candidates.push(missing_field_question(field).to_string());
        }
        for doc in protocols {
            if let Some(prompt) = doc.first_cognitive_prompt() {
                candidates.push(prompt.to_string());
            }
        }

        let mut seen = HashSet::new();
        let mut selected: Vec<String> = candidates
            .iter()
            .filter_map(|c| to_question(c))
            .filter(|q| {
                let key = q.to_lowercase();
                !self.asked.contains(&key) && seen.insert(key)
            })
            .collect();

        if selected.is_empty() {
            selected.push(self.config.default_question.clone());
        }
        selected.truncate(self.config.max_questions.max(1));

        for question in &selected {
            self.asked.insert(question.to_lowercase());
        }
        selected
    }
}
