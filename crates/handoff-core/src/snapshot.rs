//! Snapshots and clarifying questions handed to callers

use serde::Serialize;

use crate::{Record, StreamEvent};

/// Immutable point-in-time capture of the record.
///
/// There are no setters: once built, a snapshot only changes owners.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    index: u64,
    trigger_event: StreamEvent,
    record: Record,
}

impl Snapshot {
    pub fn new(index: u64, trigger_event: StreamEvent, record: Record) -> Self {
        Self {
            index,
            trigger_event,
            record,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn trigger_event(&self) -> &StreamEvent {
        &self.trigger_event
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Scene time of the triggering event.
    pub fn t_start(&self) -> f64 {
        self.trigger_event.start_offset()
    }
}

/// One clarifying prompt tied to a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QuestionEntry {
    pub snapshot_index: u64,
    pub trigger_event: StreamEvent,
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
}

impl QuestionEntry {
    pub fn new(snapshot: &Snapshot, question: impl Into<String>) -> Self {
        Self {
            snapshot_index: snapshot.index(),
            trigger_event: snapshot.trigger_event().clone(),
            question: question.into(),
            answer: None,
        }
    }

    pub fn with_answer(mut self, answer: Option<String>) -> Self {
        self.answer = answer;
        self
    }
}
