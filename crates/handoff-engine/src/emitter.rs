//! Snapshot emitter: numbers snapshots and hands them to the caller's sink

use handoff_core::{Record, Snapshot, StreamEvent};
use tracing::info;

pub type SnapshotSink = Box<dyn FnMut(&Snapshot) + Send>;

pub struct SnapshotEmitter {
    next_index: u64,
    sink: Option<SnapshotSink>,
}

impl Default for SnapshotEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotEmitter {
    pub fn new() -> Self {
        Self { next_index: 1, sink: None }
    }

    pub fn with_sink(sink: impl FnMut(&Snapshot) + Send + 'static) -> Self {
        Self {
            next_index: 1,
            sink: Some(Box::new(sink)),
        }
    }

    /// Index the next emitted snapshot will carry.
    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn emit(&mut self, trigger: &StreamEvent, record: &Record) -> Snapshot {
        let snapshot = Snapshot::new(self.next_index, trigger.clone(), record.clone());
        self.next_index += 1;
        info!(
            index = snapshot.index(),
            t = snapshot.t_start(),
            "Snapshot emitted"
        );
        if let Some(sink) = self.sink.as_mut() {
            sink(&snapshot);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn indices_start_at_one_and_reach_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let mut emitter = SnapshotEmitter::with_sink(move |s| sink_seen.lock().unwrap().push(s.index()));
        let event = StreamEvent::new(1.0, 2.0, "x").unwrap();

        assert_eq!(emitter.emit(&event, &Record::new()).index(), 1);
        assert_eq!(emitter.emit(&event, &Record::new()).index(), 2);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(emitter.next_index(), 3);
    }
}
