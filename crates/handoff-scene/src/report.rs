//! Markdown artifacts for a replayed scene

use handoff_core::{QuestionEntry, Record, Snapshot};

use crate::protocols::ProtocolDoc;

/// Prompts listed per protocol in the references section.
const PROMPTS_PER_PROTOCOL: usize = 2;

/// One-line rendering: `Situation: x | Background: None | ...`.
pub fn format_record_line(record: &Record) -> String {
    record
        .entries()
        .map(|(field, value)| format!("{}: {}", field.label(), value.unwrap_or("None")))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Initial record plus one section per emitted snapshot.
pub fn build_markdown_body(initial: &Record, snapshots: &[Snapshot]) -> String {
    let mut lines: Vec<String> = vec!["# SBAR Evolution Report".into(), String::new()];

    lines.push("## Initial SBAR".into());
    lines.push(String::new());
    if initial.is_empty() {
        lines.push("All fields empty at start.".into());
    } else {
        for (field, value) in initial.entries() {
            lines.push(format!("- **{}**: {}", field.label(), value.unwrap_or("None")));
        }
    }
    lines.push(String::new());

    lines.push("## Significant Updates".into());
    lines.push(String::new());
    if snapshots.is_empty() {
        lines.push("No significant changes were detected during playback.".into());
    } else {
        for snap in snapshots {
            lines.push(format!("### Update {} (t={:.1}s)", snap.index(), snap.t_start()));
            lines.push(format!("- **Observation**: {}", snap.trigger_event().text()));
            for (field, value) in snap.record().entries() {
                lines.push(format!("  - {}: {}", field.label(), value.unwrap_or("None")));
            }
            lines.push(String::new());
        }
    }

    format!("{}\n", lines.join("\n").trim())
}

pub fn build_protocols_section(protocols: &[ProtocolDoc]) -> String {
    let mut lines: Vec<String> = vec!["## Referenced Protocols".into(), String::new()];
    if protocols.is_empty() {
        lines.push("_No protocol references loaded._".into());
        lines.push(String::new());
    }
    for doc in protocols {
        lines.push(format!("- **{}** (`{}`): {}", doc.meta.title, doc.meta.id, doc.summary));
        if !doc.cognitive_prompts.is_empty() {
            let prompts: Vec<&str> = doc
                .cognitive_prompts
                .iter()
                .take(PROMPTS_PER_PROTOCOL)
                .map(|s| s.as_str())
                .collect();
            lines.push(format!("  - Cognitive prompts: {}", prompts.join("; ")));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

/// Full evolution report: body followed by the protocol references.
pub fn build_report(initial: &Record, snapshots: &[Snapshot], protocols: &[ProtocolDoc]) -> String {
    format!(
        "{}\n\n{}",
        build_markdown_body(initial, snapshots).trim_end(),
        build_protocols_section(protocols)
    )
}

pub fn build_questions_markdown(entries: &[QuestionEntry]) -> String {
    let mut lines: Vec<String> = vec!["# Clinician Reflection Prompts".into(), String::new()];
    if entries.is_empty() {
        lines.push("_No questions generated._".into());
        lines.push(String::new());
        return lines.join("\n");
    }
    for entry in entries {
        lines.push(format!(
            "## Update {} (t={:.1}s)",
            entry.snapshot_index,
            entry.trigger_event.start_offset()
        ));
        lines.push(format!("- Observation: {}", entry.trigger_event.text()));
        lines.push(format!("- Question: {}", entry.question));
        if let Some(answer) = entry.answer.as_deref().filter(|a| !a.is_empty()) {
            lines.push(format!("- Answer: {}", answer));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_core::{FieldName, StreamEvent};

    #[test]
    fn record_line_marks_missing_fields() {
        let record = Record::new().with(FieldName::Assessment, "tension pneumothorax");
        assert_eq!(
            format_record_line(&record),
            "Situation: None | Background: None | Assessment: tension pneumothorax | Recommendation: None"
        );
    }

    #[test]
    fn empty_run_report() {
        let report = build_report(&Record::new(), &[], &[]);
        assert!(report.contains("All fields empty at start."));
        assert!(report.contains("No significant changes were detected during playback."));
        assert!(report.ends_with("_No protocol references loaded._\n"));
    }

    #[test]
    fn update_sections_carry_index_and_time() {
        let event = StreamEvent::new(42.5, 44.0, "Sats 80").unwrap();
        let snap = Snapshot::new(3, event, Record::new().with(FieldName::Situation, "Sats 80"));
        let body = build_markdown_body(&Record::new(), &[snap]);
        assert!(body.contains("### Update 3 (t=42.5s)"));
        assert!(body.contains("- **Observation**: Sats 80"));
        assert!(body.contains("  - Situation: Sats 80"));
        assert!(body.contains("  - Background: None"));
    }
}
