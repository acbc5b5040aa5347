//! Answering clarifying questions from recorded scene data
//!
//! A scene can ship a `clinician_data.yaml` with timestamped vitals,
//! medications, procedures and findings. Questions are routed by keyword to
//! the matching category and answered with the latest entry at or before the
//! time of the triggering event.

use async_trait::async_trait;
use handoff_core::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[async_trait]
pub trait Responder: Send + Sync {
    /// Answer `question` as of scene time `event_time` (seconds). `None` means "latest".
    async fn respond(&self, question: &str, event_time: Option<f64>) -> Result<String>;
}

/// One timestamped entry. Everything except `t` is free-form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataEntry {
    #[serde(default)]
    pub t: f64,
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_yaml::Value>,
}

impl DataEntry {
    /// A field rendered as text; numbers and booleans are stringified.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            serde_yaml::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            serde_yaml::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn text_or(&self, key: &str, default: &str) -> String {
        self.text(key).unwrap_or_else(|| default.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
struct DataFile {
    #[serde(default)]
    vitals: serde_yaml::Mapping,
    #[serde(default)]
    medications: Vec<DataEntry>,
    #[serde(default)]
    procedures: Vec<DataEntry>,
    #[serde(default)]
    evaluations: Vec<DataEntry>,
    #[serde(default)]
    labs: Vec<DataEntry>,
    #[serde(default)]
    imaging: Vec<DataEntry>,
}

const VITAL_KEYWORDS: &[(&str, &[&str])] = &[
    ("blood_pressure", &["blood pressure", "bp", "pressures"]),
    ("spo2", &["oxygen", "sat", "spo2"]),
    ("heart_rate", &["heart rate", "pulse"]),
    ("etco2", &["etco2", "co2"]),
];
const MEDICATION_KEYWORDS: &[&str] = &["medication", "drug", "dose", "phenylephrine", "pressors", "vasopressor"];
const PROCEDURE_KEYWORDS: &[&str] = &["procedure", "decompression", "needle", "chest tube", "intervention", "line"];
const EVALUATION_KEYWORDS: &[&str] = &["result", "response", "outcome", "evaluation"];
const LAB_KEYWORDS: &[&str] = &["lab", "blood gas", "abg", "lactate", "panel", "potassium", "hemoglobin"];
const IMAGING_KEYWORDS: &[&str] = &["imaging", "ultrasound", "tee", "x-ray", "scan"];

#[derive(Debug, Default)]
pub struct ClinicianDataStore {
    /// Metric name -> readings sorted by `t`, in file order of metrics.
    vitals: Vec<(String, Vec<DataEntry>)>,
    medications: Vec<DataEntry>,
    procedures: Vec<DataEntry>,
    evaluations: Vec<DataEntry>,
    labs: Vec<DataEntry>,
    imaging: Vec<DataEntry>,
}

impl ClinicianDataStore {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let file: Option<DataFile> = serde_yaml::from_str(content)?;
        let file = file.unwrap_or_default();

        let mut vitals = Vec::new();
        for (metric, readings) in file.vitals {
            let Some(metric) = metric.as_str().map(str::to_string) else {
                continue;
            };
            let readings: Vec<DataEntry> = serde_yaml::from_value(readings)?;
            vitals.push((metric, sorted(readings)));
        }

        Ok(Self {
            vitals,
            medications: sorted(file.medications),
            procedures: sorted(file.procedures),
            evaluations: sorted(file.evaluations),
            labs: sorted(file.labs),
            imaging: sorted(file.imaging),
        })
    }

    /// Categories this store can answer about.
    pub fn available_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self.vitals.iter().map(|(m, _)| m.clone()).collect();
        for (name, entries) in [
            ("medications", &self.medications),
            ("procedures", &self.procedures),
            ("evaluations", &self.evaluations),
            ("labs", &self.labs),
            ("imaging", &self.imaging),
        ] {
            if !entries.is_empty() {
                fields.push(name.to_string());
            }
        }
        fields
    }

    pub fn answer(&self, question: &str, event_time: Option<f64>) -> String {
        let query = question.to_lowercase();
        let cutoff = event_time.unwrap_or(f64::INFINITY);
        let mentions = |words: &[&str]| words.iter().any(|w| query.contains(w));

        for (metric, keywords) in VITAL_KEYWORDS {
            if mentions(*keywords) {
                return self.format_vital(metric, cutoff);
            }
        }
        if mentions(MEDICATION_KEYWORDS) {
            return self.format_medication(cutoff);
        }
        if mentions(PROCEDURE_KEYWORDS) {
            return self.format_procedure(cutoff);
        }
        if mentions(EVALUATION_KEYWORDS) {
            return self.format_evaluation(cutoff);
        }
        if mentions(LAB_KEYWORDS) {
            return self.format_lab(cutoff);
        }
        if mentions(IMAGING_KEYWORDS) {
            return self.format_imaging(cutoff);
        }

        format!("I can provide updates for: {}.", self.available_fields().join(", "))
    }

    fn format_vital(&self, metric: &str, cutoff: f64) -> String {
        let label = metric.replace('_', " ");
        let readings = self.vitals.iter().find(|(m, _)| m == metric).map(|(_, r)| r.as_slice());
        let Some(entry) = readings.and_then(|r| latest_before(r, cutoff)) else {
            return format!("No {} data recorded.", label);
        };
        let suffix = entry.text("note").map(|n| format!(" ({})", n)).unwrap_or_default();
        format!(
            "{} {} at t={:.1}s via {}{}.",
            capitalize(&label),
            entry.text_or("value", "unknown"),
            entry.t,
            entry.text_or("source", "unknown source"),
            suffix
        )
    }

    fn format_medication(&self, cutoff: f64) -> String {
        let Some(entry) = latest_before(&self.medications, cutoff) else {
            return "No medications documented yet.".to_string();
        };
        let mut phrase = format!(
            "{} {} given at t={:.1}s.",
            entry.text_or("name", "medication"),
            entry.text_or("dose", "unspecified dose"),
            entry.t
        );
        if let Some(response) = entry.text("response") {
            phrase.push_str(&format!(" Response noted: {}.", response));
        }
        phrase
    }

    fn format_procedure(&self, cutoff: f64) -> String {
        let Some(entry) = latest_before(&self.procedures, cutoff) else {
            return "No procedures performed yet.".to_string();
        };
        let name = entry.text_or("name", "procedure").replace('_', " ");
        let details: Vec<String> = ["site", "detail", "response"]
            .iter()
            .filter_map(|k| entry.text(k))
            .collect();
        let suffix = if details.is_empty() {
            String::new()
        } else {
            format!(" ({})", details.join("; "))
        };
        format!("{} at t={:.1}s{}.", capitalize(&name), entry.t, suffix)
    }

    fn format_evaluation(&self, cutoff: f64) -> String {
        let Some(entry) = latest_before(&self.evaluations, cutoff) else {
            return "No evaluation findings recorded yet.".to_string();
        };
        format!(
            "Evaluation of {} at t={:.1}s: {}.",
            entry.text_or("focus", "assessment").replace('_', " "),
            entry.t,
            entry.text_or("finding", "finding unavailable")
        )
    }

    fn format_lab(&self, cutoff: f64) -> String {
        let Some(entry) = latest_before(&self.labs, cutoff) else {
            return "No laboratory data recorded yet.".to_string();
        };
        let name = entry.text("test").or_else(|| entry.text("name")).unwrap_or_else(|| "lab".into());
        let suffix = entry.text("note").map(|n| format!(" ({})", n)).unwrap_or_default();
        format!(
            "{} at t={:.1}s: {}{}.",
            name,
            entry.t,
            entry.text_or("result", "result pending"),
            suffix
        )
    }

    fn format_imaging(&self, cutoff: f64) -> String {
        let Some(entry) = latest_before(&self.imaging, cutoff) else {
            return "No imaging assessments recorded yet.".to_string();
        };
        let modality = entry
            .text("modality")
            .or_else(|| entry.text("name"))
            .unwrap_or_else(|| "imaging".into())
            .to_uppercase();
        format!(
            "{} at t={:.1}s: {}.",
            modality,
            entry.t,
            entry.text_or("finding", "finding unavailable")
        )
    }
}

#[async_trait]
impl Responder for ClinicianDataStore {
    async fn respond(&self, question: &str, event_time: Option<f64>) -> Result<String> {
        Ok(self.answer(question, event_time))
    }
}

fn sorted(mut entries: Vec<DataEntry>) -> Vec<DataEntry> {
    entries.sort_by(|a, b| a.t.total_cmp(&b.t));
    entries
}

/// Latest entry at or before `cutoff`; the earliest entry when all are later.
fn latest_before(entries: &[DataEntry], cutoff: f64) -> Option<&DataEntry> {
    entries
        .iter()
        .take_while(|e| e.t <= cutoff)
        .last()
        .or_else(|| entries.first())
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}
