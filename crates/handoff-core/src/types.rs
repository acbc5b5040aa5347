//! Core types for Handoff

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::Error;

/// One of the four SBAR fields. No others exist.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldName {
    Situation,
    Background,
    Assessment,
    Recommendation,
}

impl FieldName {
    /// All fields in SBAR order.
    pub const ALL: [FieldName; 4] = [
        FieldName::Situation,
        FieldName::Background,
        FieldName::Assessment,
        FieldName::Recommendation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Situation => "situation",
            FieldName::Background => "background",
            FieldName::Assessment => "assessment",
            FieldName::Recommendation => "recommendation",
        }
    }

    /// Capitalized name for display ("Situation").
    pub fn label(&self) -> &'static str {
        match self {
            FieldName::Situation => "Situation",
            FieldName::Background => "Background",
            FieldName::Assessment => "Assessment",
            FieldName::Recommendation => "Recommendation",
        }
    }

    /// Single-letter tag used in compact summaries.
    pub fn initial(&self) -> char {
        match self {
            FieldName::Situation => 'S',
            FieldName::Background => 'B',
            FieldName::Assessment => 'A',
            FieldName::Recommendation => 'R',
        }
    }

    pub fn index(&self) -> usize {
        match self {
            FieldName::Situation => 0,
            FieldName::Background => 1,
            FieldName::Assessment => 2,
            FieldName::Recommendation => 3,
        }
    }
}

impl std::fmt::Display for FieldName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FieldName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "situation" | "s" => Ok(FieldName::Situation),
            "background" | "b" => Ok(FieldName::Background),
            "assessment" | "a" => Ok(FieldName::Assessment),
            "recommendation" | "r" => Ok(FieldName::Recommendation),
            other => Err(Error::UnknownField(other.to_string())),
        }
    }
}

/// The four-field structured summary.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub situation: Option<String>,
    pub background: Option<String>,
    pub assessment: Option<String>,
    pub recommendation: Option<String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: FieldName) -> Option<&str> {
        match field {
            FieldName::Situation => self.situation.as_deref(),
            FieldName::Background => self.background.as_deref(),
            FieldName::Assessment => self.assessment.as_deref(),
            FieldName::Recommendation => self.recommendation.as_deref(),
        }
    }

    pub fn set(&mut self, field: FieldName, value: Option<String>) {
        let slot = match field {
            FieldName::Situation => &mut self.situation,
            FieldName::Background => &mut self.background,
            FieldName::Assessment => &mut self.assessment,
            FieldName::Recommendation => &mut self.recommendation,
        };
        *slot = value;
    }

    /// Builder-style setter, mostly for tests and fixtures.
    pub fn with(mut self, field: FieldName, value: impl Into<String>) -> Self {
        self.set(field, Some(value.into()));
        self
    }

    /// A field counts as filled only if it has non-whitespace content.
    pub fn is_filled(&self, field: FieldName) -> bool {
        self.get(field).is_some_and(|v| !v.trim().is_empty())
    }

    pub fn is_complete(&self) -> bool {
        FieldName::ALL.iter().all(|f| self.is_filled(*f))
    }

    pub fn missing_fields(&self) -> Vec<FieldName> {
        FieldName::ALL
            .iter()
            .copied()
            .filter(|f| !self.is_filled(*f))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        FieldName::ALL.iter().all(|f| !self.is_filled(*f))
    }

    /// Fields in SBAR order with their current values.
    pub fn entries(&self) -> impl Iterator<Item = (FieldName, Option<&str>)> + '_ {
        FieldName::ALL.iter().map(move |f| (*f, self.get(*f)))
    }
}

/// One candidate update to a field. Appended to history, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub field: FieldName,
    /// Value as stored (after token truncation).
    pub raw_value: String,
    pub normalized_value: String,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub conflict: bool,
}

/// Per-field consensus, derived on demand from the recent window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsensusRecord {
    pub value: Option<String>,
    pub score: f64,
    pub contested: bool,
}

impl ConsensusRecord {
    /// The result for a field that has never been observed.
    pub fn empty() -> Self {
        Self {
            value: None,
            score: 0.0,
            contested: true,
        }
    }
}
