//! Tests for handoff-engine: consensus voting, gate behavior, question generation

use async_trait::async_trait;
use chrono::Duration;
use handoff_core::{FieldName, Record, Snapshot, StreamEvent};
use handoff_engine::config::{ConsensusConfig, DecayClock};
use handoff_engine::*;
use std::sync::{Arc, Mutex};

fn manual_store() -> (ConsensusStore, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at_epoch());
    (ConsensusStore::with_clock(ConsensusConfig::default(), clock.clone()), clock)
}

fn event(t: f64, text: &str) -> StreamEvent {
    StreamEvent::new(t, t + 1.0, text).unwrap()
}

// ===========================================================================
// ConsensusStore
// ===========================================================================

#[test]
fn decay_is_monotonic() {
    let (mut store, clock) = manual_store();
    store.record_observation(FieldName::Situation, "sats 90", Some(0.9), "test");

    let mut last = store.best_current(FieldName::Situation).score;
    for _ in 0..5 {
        clock.advance(Duration::seconds(30));
        let score = store.best_current(FieldName::Situation).score;
        assert!(score < last, "{} should be below {}", score, last);
        last = score;
    }
}

#[test]
fn differing_observation_is_a_conflict() {
    let (mut store, clock) = manual_store();
    let first = store.record_observation(FieldName::Assessment, "cyanotic", Some(0.9), "test");
    assert!(!first.conflict);

    clock.advance(Duration::seconds(1));
    let second = store.record_observation(FieldName::Assessment, "pink", Some(0.9), "test");
    assert!(second.conflict);
    assert!(second.confidence <= 0.5);

    let history = store.export_history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].confidence, 0.9);
}

#[test]
fn agreeing_observation_is_not_a_conflict() {
    let (mut store, _) = manual_store();
    store.record_observation(FieldName::Situation, "SpO2 92%", None, "test");
    let again = store.record_observation(FieldName::Situation, "sats 92", None, "test");
    assert!(!again.conflict);
    assert_eq!(again.confidence, 0.8);
}

#[test]
fn scenario_a_flip_flopping_sats() {
    let (mut store, clock) = manual_store();
    store.record_observation(FieldName::Situation, "O2 sats 72%", Some(0.8), "asr");
    clock.advance(Duration::seconds(1));
    store.record_observation(FieldName::Situation, "oxygen 95%", Some(0.8), "asr");
    clock.advance(Duration::seconds(1));
    store.record_observation(FieldName::Situation, "SpO2 72%", Some(0.8), "asr");

    let best = store.best_current(FieldName::Situation);
    assert!(best.value.as_deref().unwrap().contains("sats 72"));
    assert!(!best.contested);
    assert!((best.score - 1.5908).abs() < 1e-3);
    assert!(!store.needs_clarification(FieldName::Situation));
}

#[test]
fn truncated_values_compare_with_ellipsis() {
    let (mut store, _) = manual_store();
    let long_a = "one two three four five six seven eight nine ten eleven twelve thirteen";
    let long_b = "one two three four five six seven eight nine ten eleven twelve fourteen";

    let first = store.record_observation(FieldName::Background, long_a, None, "test");
    assert!(first.raw_value.ends_with(" ..."));
    assert!(first.normalized_value.ends_with("..."));

    // Only the dropped tail differs, so the stored forms agree.
    let second = store.record_observation(FieldName::Background, long_b, None, "test");
    assert!(!second.conflict);
    assert_eq!(first.normalized_value, second.normalized_value);

    let third = store.record_observation(FieldName::Background, "one two", None, "test");
    assert!(third.conflict);
}

#[test]
fn consensus_snapshot_covers_all_fields() {
    let (mut store, _) = manual_store();
    store.record_observation(FieldName::Recommendation, "needle decompression", None, "test");
    let snapshot = store.consensus_snapshot();
    assert_eq!(snapshot.len(), 4);
    assert_eq!(snapshot[&FieldName::Situation], handoff_core::ConsensusRecord::empty());
    assert_eq!(
        snapshot[&FieldName::Recommendation].value.as_deref(),
        Some("needle decompression")
    );
}

#[test]
fn downstream_summary_skips_unconfident_fields() {
    let (mut store, clock) = manual_store();
    clock.advance(Duration::seconds(75));
    store.record_observation(FieldName::Situation, "SpO2 88%", Some(0.9), "test");
    store.record_observation(FieldName::Background, "copd", Some(0.3), "test");
    store.record_observation(FieldName::Assessment, "cyanotic", Some(0.5), "test");
    store.record_observation(FieldName::Assessment, "pink", Some(0.8), "test");

    assert_eq!(store.serialize_for_downstream(), "S=sats 88@00:01:15");
}

#[test]
fn clarification_prompts_follow_field_order() {
    let (mut store, _) = manual_store();
    store.record_observation(FieldName::Situation, "sats 95", Some(0.9), "test");
    store.record_observation(FieldName::Assessment, "alert", Some(0.9), "test");
    assert_eq!(
        store.clarification_prompts(),
        vec![
            "Current blood pressure (systolic/diastolic)?",
            "Action to take now (e.g., epi dose/CPR)?",
        ]
    );
}

#[test]
fn history_is_written_as_json_lines() {
    let (mut store, clock) = manual_store();
    store.record_observation(FieldName::Situation, "sats 90", None, "asr");
    clock.advance(Duration::milliseconds(2500));
    store.record_observation(FieldName::Situation, "sats 80", None, "asr");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.jsonl");
    store.write_history_jsonl(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["field"], "situation");
    assert_eq!(lines[0]["value_norm"], "sats 90");
    assert_eq!(lines[1]["t"], 2.5);
    assert_eq!(lines[1]["conflict"], true);
    assert_eq!(lines[1]["source"], "asr");
}

#[test]
fn context_window_renders_summary() {
    let (mut store, _) = manual_store();
    store.record_observation(FieldName::Situation, "sats 95", Some(0.9), "test");
    let mut ctx = ContextWindow::new(64);
    ctx.add_input("sats 95", &store);
    assert_eq!(ctx.render(&store), "sats 95\nS=sats 95@00:00:00");
    assert_eq!(ctx.token_count(&store), 4);
}

// ===========================================================================
// ChangeGate
// ===========================================================================

fn collecting_gate(
    config: &EngineConfig,
    oracle: Arc<dyn SignificanceOracle>,
) -> (ChangeGate, Arc<Mutex<Vec<Snapshot>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = seen.clone();
    let gate = ChangeGate::new(config, Arc::new(KeywordExtractor::new()), oracle)
        .with_sink(move |s| sink_seen.lock().unwrap().push(s.clone()));
    (gate, seen)
}

#[tokio::test]
async fn scenario_c_repeated_significant_event_emits_once() {
    let (mut gate, seen) = collecting_gate(&EngineConfig::default(), Arc::new(AlwaysSignificant));
    for i in 0..10 {
        gate.process_event(&event(i as f64, "Sats dropping to 85")).await;
    }
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].index(), 1);
    assert_eq!(seen[0].record().situation.as_deref(), Some("Sats dropping to 85"));
}

#[tokio::test]
async fn scenario_d_unparseable_oracle_emits_nothing() {
    let oracle = oracle_fn(|_: &StreamEvent, _: &Record, _: &[Snapshot]| {
        Err(CapabilityError::unparseable("I think so?"))
    });
    let (mut gate, seen) = collecting_gate(&EngineConfig::default(), Arc::new(oracle));
    let outcome = gate.process(&event(0.0, "Sats 80")).await;
    assert_eq!(outcome, GateOutcome::NotSignificant);
    assert!(seen.lock().unwrap().is_empty());
    // The update itself still lands in the store.
    assert_eq!(gate.record().situation.as_deref(), Some("Sats 80"));
}

struct SlowOracle;

#[async_trait]
impl SignificanceOracle for SlowOracle {
    async fn decide(&self, _: &StreamEvent, _: &Record, _: &[Snapshot]) -> CapabilityResult<bool> {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        Ok(true)
    }
}

#[tokio::test]
async fn oracle_timeout_is_not_significant() {
    let mut config = EngineConfig::default();
    config.gate.oracle_timeout_ms = 20;
    let (mut gate, seen) = collecting_gate(&config, Arc::new(SlowOracle));
    assert_eq!(gate.process(&event(0.0, "Sats 80")).await, GateOutcome::NotSignificant);
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(gate.state(), GateState::Idle);
}

#[tokio::test]
async fn extractor_failure_skips_event() {
    let extractor = extractor_fn(|_: &StreamEvent, _: &Record| Err(CapabilityError::failed("offline")));
    let mut gate = ChangeGate::new(&EngineConfig::default(), Arc::new(extractor), Arc::new(AlwaysSignificant));
    assert_eq!(gate.process(&event(0.0, "Sats 80")).await, GateOutcome::NoUpdate);
    assert!(gate.store().export_history().is_empty());
}

#[tokio::test]
async fn duplicate_is_reported_and_changes_emit_again() {
    let (mut gate, _) = collecting_gate(&EngineConfig::default(), Arc::new(AlwaysSignificant));
    assert!(matches!(gate.process(&event(0.0, "Sats 90")).await, GateOutcome::Emitted(_)));
    assert_eq!(gate.process(&event(1.0, "Sats 90")).await, GateOutcome::Duplicate);
    let snap = gate.process_event(&event(2.0, "History of COPD")).await.unwrap();
    assert_eq!(snap.index(), 2);
    assert_eq!(snap.record().situation.as_deref(), Some("Sats 90"));
    assert_eq!(snap.record().background.as_deref(), Some("History of COPD"));
    assert_eq!(gate.last_emitted(), Some(snap.record()));
}

#[tokio::test]
async fn scene_time_drives_decay() {
    let mut config = EngineConfig::default();
    config.gate.decay_clock = DecayClock::Scene;
    let (mut gate, _) = collecting_gate(&config, Arc::new(AlwaysSignificant));

    gate.process_event(&event(0.0, "Sats 72")).await;
    let snap = gate.process_event(&event(240.0, "Sats 95")).await.unwrap();

    // Two half-lives later the old 0.8 vote weighs 0.2, below the capped 0.5.
    assert_eq!(snap.record().situation.as_deref(), Some("Sats 95"));
    let best = gate.store().best_current(FieldName::Situation);
    assert!((best.score - 0.5).abs() < 1e-9);
    assert!(!best.contested);
}

#[tokio::test]
async fn huge_scene_offset_keeps_previous_scene_time() {
    let (mut gate, seen) = collecting_gate(&EngineConfig::default(), Arc::new(AlwaysSignificant));
    gate.process_event(&event(30.0, "Sats 90")).await;

    let far = StreamEvent::from_json_line(r#"{"t_start": 1e13, "t_end": 1e13, "text": "history of asthma"}"#, 2)
        .unwrap();
    let snap = gate.process_event(&far).await.unwrap();
    assert_eq!(snap.record().background.as_deref(), Some("history of asthma"));

    let history = gate.store().export_history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].timestamp, history[0].timestamp);
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn keyword_oracle_gates_emission() {
    let (mut gate, seen) = collecting_gate(&EngineConfig::default(), Arc::new(KeywordOracle::default()));
    // Background update, but no trigger word.
    assert_eq!(
        gate.process(&event(0.0, "Recent surgery yesterday")).await,
        GateOutcome::NotSignificant
    );
    assert!(gate.process_event(&event(1.0, "Tension pneumothorax suspected")).await.is_some());
    assert_eq!(seen.lock().unwrap().len(), 1);
}

// ===========================================================================
// QuestionGenerator
// ===========================================================================

const NO_PROTOCOLS: &[Vec<String>] = &[];

#[test]
fn scenario_b_missing_recommendation_is_asked() {
    let mut config = EngineConfig::default().questions;
    config.max_questions = 10;
    let mut gen = QuestionGenerator::new(config);
    let qs = gen.generate(&Record::new(), "What is BP now?", NO_PROTOCOLS);
    assert!(qs.contains(&"What actions or next steps are being considered right now?".to_string()));
    assert_eq!(qs[0], "Could you update the current blood pressure and any recent trends?");
    assert!(qs.iter().all(|q| q.ends_with('?')));
}

#[test]
fn questions_are_not_repeated_across_calls() {
    let mut gen = QuestionGenerator::default();
    let record = Record::new()
        .with(FieldName::Situation, "sats 90")
        .with(FieldName::Background, "copd")
        .with(FieldName::Assessment, "pneumothorax");

    let first = gen.generate(&record, "pressure falling", NO_PROTOCOLS);
    assert_eq!(first, vec!["Could you update the current blood pressure and any recent trends?"]);

    let second = gen.generate(&record, "pressure falling", NO_PROTOCOLS);
    assert_eq!(second, vec!["What actions or next steps are being considered right now?"]);

    let third = gen.generate(&record, "pressure falling", NO_PROTOCOLS);
    assert_eq!(third, vec![gen.default_question().to_string()]);
}

#[test]
fn duplicate_candidates_collapse_case_insensitively() {
    let mut config = EngineConfig::default().questions;
    config.max_questions = 5;
    let mut gen = QuestionGenerator::new(config);
    let record = Record::new()
        .with(FieldName::Situation, "s")
        .with(FieldName::Background, "b")
        .with(FieldName::Assessment, "a")
        .with(FieldName::Recommendation, "r");
    let protocols = vec![
        vec!["Check for tension pneumothorax".to_string()],
        vec!["CHECK FOR TENSION PNEUMOTHORAX?".to_string()],
    ];
    let qs = gen.generate(&record, "", &protocols);
    assert_eq!(qs, vec!["Check for tension pneumothorax?"]);
}
