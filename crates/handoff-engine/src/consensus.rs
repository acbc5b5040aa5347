//! Consensus store: decay-weighted voting over recent observations per field
//!
//! Every observation is appended to an immutable history. Each field also
//! keeps a bounded window of its most recent observations; the consensus
//! value is whichever normalized value carries the most decayed confidence
//! in that window. Nothing is cached: consensus is recomputed on demand
//! against the store's clock.

use chrono::{DateTime, Utc};
use handoff_core::{ConsensusRecord, FieldName, Observation, Record, Result};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::config::ConsensusConfig;
use crate::normalize::{normalize_value, truncate_tokens};

pub struct ConsensusStore {
    config: ConsensusConfig,
    clock: Arc<dyn Clock>,
    history: Vec<Observation>,
    /// Indices into `history`, oldest first, per field.
    recent: [VecDeque<usize>; 4],
}

impl ConsensusStore {
    pub fn new(config: ConsensusConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: ConsensusConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            history: Vec::new(),
            recent: Default::default(),
        }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Record a candidate value for `field` at the store clock's current time.
    ///
    /// `confidence` defaults to the configured default (0.8).
    pub fn record_observation(
        &mut self,
        field: FieldName,
        raw_value: &str,
        confidence: Option<f64>,
        source: &str,
    ) -> Observation {
        let at = self.clock.now();
        self.record_observation_at(field, raw_value, confidence, source, at)
    }

    pub fn record_observation_at(
        &mut self,
        field: FieldName,
        raw_value: &str,
        confidence: Option<f64>,
        source: &str,
        at: DateTime<Utc>,
    ) -> Observation {
        let raw_value = truncate_tokens(raw_value, self.config.max_tokens_per_field);
        let normalized_value = normalize_value(&raw_value);

        let current = self.best_current_at(field, at).value;
        let conflict = current.is_some_and(|best| best != normalized_value);

        let confidence = confidence
            .filter(|c| !c.is_nan())
            .unwrap_or(self.config.default_confidence);
        let mut confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        if conflict {
            confidence = confidence.min(self.config.conflict_confidence_cap);
        }

        let observation = Observation {
            field,
            raw_value,
            normalized_value,
            confidence,
            timestamp: at,
            source: source.to_string(),
            conflict,
        };
        debug!(
            field = %field,
            value = %observation.normalized_value,
            confidence,
            conflict,
            "Observation recorded"
        );

        let idx = self.history.len();
        self.history.push(observation.clone());
        let window = &mut self.recent[field.index()];
        window.push_back(idx);
        while window.len() > self.config.window.max(1) {
            window.pop_front();
        }
        observation
    }

    /// Decayed weight of a single observation as seen at `now`.
    pub fn decayed_weight(&self, observation: &Observation, now: DateTime<Utc>) -> f64 {
        let delta = now - observation.timestamp;
        let elapsed = match delta.num_microseconds() {
            Some(micros) => micros.max(0) as f64 / 1_000_000.0,
            None => delta.num_milliseconds().max(0) as f64 / 1000.0,
        };
        if self.config.half_life_secs <= 0.0 {
            return observation.confidence;
        }
        observation.confidence * 0.5_f64.powf(elapsed / self.config.half_life_secs)
    }

    pub fn best_current(&self, field: FieldName) -> ConsensusRecord {
        self.best_current_at(field, self.clock.now())
    }

    /// Vote over the field's window. Ties go to the most recently observed value.
    pub fn best_current_at(&self, field: FieldName, now: DateTime<Utc>) -> ConsensusRecord {
        // (normalized value, accumulated weight, position of latest vote)
        let mut votes: Vec<(&str, f64, usize)> = Vec::new();
        for (pos, &idx) in self.recent[field.index()].iter().enumerate() {
            let obs = &self.history[idx];
            let weight = self.decayed_weight(obs, now);
            match votes.iter_mut().find(|(v, _, _)| *v == obs.normalized_value) {
                Some(entry) => {
                    entry.1 += weight;
                    entry.2 = pos;
                }
                None => votes.push((obs.normalized_value.as_str(), weight, pos)),
            }
        }

        if votes.is_empty() {
            return ConsensusRecord::empty();
        }

        votes.sort_by(|a, b| b.1.total_cmp(&a.1).then(b.2.cmp(&a.2)));
        let (top_value, top_score, _) = votes[0];
        let second = votes.get(1).map(|v| v.1).unwrap_or(0.0);

        ConsensusRecord {
            value: Some(top_value.to_string()),
            score: top_score,
            contested: (top_score - second) < self.config.margin,
        }
    }

    pub fn consensus_snapshot(&self) -> BTreeMap<FieldName, ConsensusRecord> {
        let now = self.clock.now();
        FieldName::ALL
            .iter()
            .map(|f| (*f, self.best_current_at(*f, now)))
            .collect()
    }

    pub fn needs_clarification(&self, field: FieldName) -> bool {
        let best = self.best_current(field);
        best.value.is_none() || best.contested || best.score < self.config.clarification_threshold
    }

    /// Fixed vitals-oriented prompts for each field that needs clarification.
    pub fn clarification_prompts(&self) -> Vec<&'static str> {
        FieldName::ALL
            .iter()
            .filter(|f| self.needs_clarification(**f))
            .map(|f| clarification_prompt(*f))
            .collect()
    }

    /// Compact `S=<value>@HH:MM:SS B=...` summary of confident fields only.
    pub fn serialize_for_downstream(&self) -> String {
        let now = self.clock.now();
        let mut parts = Vec::new();
        for field in FieldName::ALL {
            let best = self.best_current_at(field, now);
            let Some(value) = best.value else { continue };
            if best.contested || best.score < self.config.clarification_threshold {
                continue;
            }
            let time = self
                .latest_supporting(field, &value)
                .map(|obs| obs.timestamp.format("%H:%M:%S").to_string())
                .unwrap_or_default();
            parts.push(format!("{}={}@{}", field.initial(), value, time));
        }
        parts.join(" ")
    }

    /// The current record: each field holds the stored value of its most
    /// recent observation agreeing with the consensus.
    pub fn record(&self) -> Record {
        let now = self.clock.now();
        let mut record = Record::new();
        for field in FieldName::ALL {
            let value = self
                .best_current_at(field, now)
                .value
                .and_then(|best| self.latest_supporting(field, &best))
                .map(|obs| obs.raw_value.clone());
            record.set(field, value);
        }
        record
    }

    pub fn export_history(&self) -> &[Observation] {
        &self.history
    }

    /// Write the full history as JSON lines.
    pub fn write_history_jsonl(&self, path: &Path) -> Result<()> {
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        for obs in &self.history {
            let line = HistoryLine {
                t: obs.timestamp.timestamp_millis() as f64 / 1000.0,
                field: obs.field,
                value: &obs.raw_value,
                value_norm: &obs.normalized_value,
                confidence: obs.confidence,
                conflict: obs.conflict,
                source: &obs.source,
            };
            serde_json::to_writer(&mut file, &line)?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(())
    }

    fn latest_supporting(&self, field: FieldName, normalized: &str) -> Option<&Observation> {
        self.recent[field.index()]
            .iter()
            .rev()
            .map(|&idx| &self.history[idx])
            .find(|obs| obs.normalized_value == normalized)
    }
}

pub fn clarification_prompt(field: FieldName) -> &'static str {
    match field {
        FieldName::Situation => "Current oxygen saturation (number + %)?",
        FieldName::Background => "Current blood pressure (systolic/diastolic)?",
        FieldName::Assessment => "Patient appearance (cyanotic/pink/alert)?",
        FieldName::Recommendation => "Action to take now (e.g., epi dose/CPR)?",
    }
}

#[derive(Serialize)]
struct HistoryLine<'a> {
    t: f64,
    field: FieldName,
    value: &'a str,
    value_norm: &'a str,
    confidence: f64,
    conflict: bool,
    source: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;

    fn store() -> (ConsensusStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at_epoch());
        let store = ConsensusStore::with_clock(ConsensusConfig::default(), clock.clone());
        (store, clock)
    }

    #[test]
    fn empty_field_is_contested_with_zero_score() {
        let (store, _) = store();
        assert_eq!(store.best_current(FieldName::Assessment), ConsensusRecord::empty());
        assert!(store.needs_clarification(FieldName::Assessment));
    }

    #[test]
    fn window_evicts_oldest() {
        let (mut store, _) = store();
        for i in 0..8 {
            store.record_observation(FieldName::Situation, &format!("v{}", i), Some(0.1), "t");
        }
        assert_eq!(store.recent[0].len(), 6);
        assert_eq!(store.export_history().len(), 8);
        assert_eq!(store.history[store.recent[0][0]].raw_value, "v2");
    }

    #[test]
    fn confidence_is_clamped() {
        let (mut store, _) = store();
        let obs = store.record_observation(FieldName::Background, "copd", Some(1.7), "t");
        assert_eq!(obs.confidence, 1.0);
        let obs = store.record_observation(FieldName::Assessment, "pink", Some(-0.3), "t");
        assert_eq!(obs.confidence, 0.0);
    }

    #[test]
    fn nan_confidence_falls_back_to_default() {
        let (mut store, _) = store();
        let obs = store.record_observation(FieldName::Situation, "sats 90", Some(f64::NAN), "t");
        assert_eq!(obs.confidence, 0.8);
        let obs = store.record_observation(FieldName::Background, "copd", Some(f64::INFINITY), "t");
        assert_eq!(obs.confidence, 1.0);

        store.record_observation(FieldName::Assessment, "pink", Some(0.9), "t");
        let bad = store.record_observation(FieldName::Assessment, "cyanotic", Some(f64::NAN), "t");
        assert!(bad.confidence <= 0.5);
        let best = store.best_current(FieldName::Assessment);
        assert_eq!(best.value.as_deref(), Some("pink"));
        assert!(best.score.is_finite());
    }

    #[test]
    fn decay_resolves_below_a_millisecond() {
        let (mut store, clock) = store();
        store.record_observation(FieldName::Situation, "sats 90", Some(0.8), "t");
        let before = store.best_current(FieldName::Situation).score;
        clock.advance(chrono::Duration::microseconds(500));
        assert!(store.best_current(FieldName::Situation).score < before);
    }

    #[test]
    fn tie_goes_to_most_recent() {
        let (mut store, _) = store();
        store.record_observation(FieldName::Assessment, "cyanotic", Some(0.5), "t");
        store.record_observation(FieldName::Assessment, "pink", Some(0.5), "t");
        let best = store.best_current(FieldName::Assessment);
        assert_eq!(best.value.as_deref(), Some("pink"));
        assert!(best.contested);
    }

    #[test]
    fn old_votes_fade() {
        let (mut store, clock) = store();
        store.record_observation(FieldName::Situation, "sats 80", Some(0.8), "t");
        clock.advance(Duration::seconds(120));
        let best = store.best_current(FieldName::Situation);
        assert!((best.score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn record_keeps_latest_supporting_raw_value() {
        let (mut store, clock) = store();
        store.record_observation(FieldName::Situation, "O2 sats 72%", None, "t");
        clock.advance(Duration::seconds(1));
        store.record_observation(FieldName::Situation, "SpO2 72%", None, "t");
        assert_eq!(store.record().situation.as_deref(), Some("SpO2 72%"));
        assert!(store.record().background.is_none());
    }
}
