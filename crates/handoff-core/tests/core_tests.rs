//! Tests for handoff-core: field names, records, events, snapshots, errors

use handoff_core::*;

// ===========================================================================
// FieldName
// ===========================================================================

#[test]
fn field_name_all_is_sbar_order() {
    let names: Vec<&str> = FieldName::ALL.iter().map(|f| f.as_str()).collect();
    assert_eq!(names, vec!["situation", "background", "assessment", "recommendation"]);
}

#[test]
fn field_name_initials() {
    let initials: String = FieldName::ALL.iter().map(|f| f.initial()).collect();
    assert_eq!(initials, "SBAR");
}

#[test]
fn field_name_parses_case_insensitively() {
    assert_eq!("Situation".parse::<FieldName>().unwrap(), FieldName::Situation);
    assert_eq!(" RECOMMENDATION ".parse::<FieldName>().unwrap(), FieldName::Recommendation);
    assert_eq!("b".parse::<FieldName>().unwrap(), FieldName::Background);
}

#[test]
fn field_name_rejects_unknown() {
    let err = "plan".parse::<FieldName>().unwrap_err();
    assert!(matches!(err, Error::UnknownField(ref s) if s == "plan"));
}

#[test]
fn field_name_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&FieldName::Assessment).unwrap(), r#""assessment""#);
}

// ===========================================================================
// Record
// ===========================================================================

#[test]
fn record_empty_is_not_complete() {
    let record = Record::new();
    assert!(!record.is_complete());
    assert!(record.is_empty());
    assert_eq!(record.missing_fields().len(), 4);
}

#[test]
fn record_whitespace_counts_as_missing() {
    let record = Record::new()
        .with(FieldName::Situation, "sats 88")
        .with(FieldName::Background, "   ");
    assert!(record.is_filled(FieldName::Situation));
    assert!(!record.is_filled(FieldName::Background));
    assert_eq!(
        record.missing_fields(),
        vec![FieldName::Background, FieldName::Assessment, FieldName::Recommendation]
    );
}

#[test]
fn record_complete_when_all_filled() {
    let record = Record::new()
        .with(FieldName::Situation, "hypoxic")
        .with(FieldName::Background, "copd")
        .with(FieldName::Assessment, "tension pneumothorax")
        .with(FieldName::Recommendation, "needle decompression");
    assert!(record.is_complete());
    assert!(record.missing_fields().is_empty());
}

#[test]
fn record_set_and_get() {
    let mut record = Record::new();
    record.set(FieldName::Assessment, Some("bronchospasm".into()));
    assert_eq!(record.get(FieldName::Assessment), Some("bronchospasm"));
    record.set(FieldName::Assessment, None);
    assert_eq!(record.get(FieldName::Assessment), None);
}

#[test]
fn record_equality_is_field_by_field() {
    let a = Record::new().with(FieldName::Situation, "sats 90");
    let b = Record::new().with(FieldName::Situation, "sats 90");
    let c = Record::new().with(FieldName::Situation, "sats 91");
    assert_eq!(a, b);
    assert_ne!(a, c);
}

// ===========================================================================
// StreamEvent
// ===========================================================================

#[test]
fn event_from_json_line() {
    let event = StreamEvent::from_json_line(r#"{"t_start":0.5,"t_end":1.5,"text":"hello"}"#, 1).unwrap();
    assert_eq!(event.text(), "hello");
    assert_eq!(event.duration(), 1.0);
}

#[test]
fn event_missing_key_reports_position() {
    let err = StreamEvent::from_json_line(r#"{"t_start":0.5,"text":"hello"}"#, 4).unwrap_err();
    assert_eq!(err.position(), Some(4));
    assert!(err.to_string().contains("t_end"));
}

#[test]
fn event_non_numeric_time_is_rejected() {
    let err = StreamEvent::from_json_line(r#"{"t_start":"soon","t_end":2,"text":"x"}"#, 2).unwrap_err();
    assert_eq!(err.position(), Some(2));
    assert!(err.to_string().contains("not numeric"));
}

#[test]
fn event_invalid_json_is_malformed() {
    let err = StreamEvent::from_json_line("{not json", 9).unwrap_err();
    assert_eq!(err.position(), Some(9));
}

#[test]
fn event_serializes_wire_names() {
    let event = StreamEvent::new(1.0, 2.0, "sat 90").unwrap();
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["t_start"], 1.0);
    assert_eq!(json["t_end"], 2.0);
    assert_eq!(json["text"], "sat 90");
}

// ===========================================================================
// Snapshot / QuestionEntry
// ===========================================================================

#[test]
fn snapshot_keeps_deep_copy_of_record() {
    let mut record = Record::new().with(FieldName::Situation, "sats 80");
    let event = StreamEvent::new(3.0, 4.0, "sats 80").unwrap();
    let snapshot = Snapshot::new(1, event, record.clone());
    record.set(FieldName::Situation, Some("sats 95".into()));
    assert_eq!(snapshot.record().get(FieldName::Situation), Some("sats 80"));
    assert_eq!(snapshot.t_start(), 3.0);
}

#[test]
fn question_entry_links_to_snapshot() {
    let event = StreamEvent::new(3.0, 4.0, "sats 80").unwrap();
    let snapshot = Snapshot::new(2, event, Record::new());
    let entry = QuestionEntry::new(&snapshot, "What is the BP?").with_answer(Some("80/40".into()));
    assert_eq!(entry.snapshot_index, 2);
    assert_eq!(entry.trigger_event.text(), "sats 80");
    assert_eq!(entry.answer.as_deref(), Some("80/40"));
}

// ===========================================================================
// Error helpers
// ===========================================================================

#[test]
fn error_helpers_format() {
    assert_eq!(
        Error::protocol_error("pneumothorax", "no prompts").to_string(),
        "protocol error: pneumothorax - no prompts"
    );
    assert!(Error::protocol_error("x", "y").position().is_none());
    assert_eq!(Error::malformed(4, "bad").position(), Some(4));
}
