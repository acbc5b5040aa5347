//! Change gate: extraction -> consensus -> significance -> emission
//!
//! One gate per conversation. It owns the consensus store and the emitter;
//! callers feed events in order and receive snapshots through the sink (and
//! as the return value).

use handoff_core::{Record, Snapshot, StreamEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clock::{Clock, ManualClock, SystemClock};
use crate::config::{DecayClock, EngineConfig, GateConfig};
use crate::consensus::ConsensusStore;
use crate::emitter::SnapshotEmitter;
use crate::error::{CapabilityError, CapabilityResult};
use crate::extractor::{FieldExtractor, FieldUpdate};
use crate::oracle::SignificanceOracle;

const OBSERVATION_SOURCE: &str = "input";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Waiting for an event.
    Idle,
    /// Updates applied, awaiting the oracle.
    Candidate,
    /// A snapshot just went out.
    Emitted,
}

/// What happened to one event.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// The extractor produced nothing (or failed).
    NoUpdate,
    /// The oracle said no, failed, or timed out.
    NotSignificant,
    /// Significant, but the record matches the last emitted one.
    Duplicate,
    Emitted(Snapshot),
}

impl GateOutcome {
    pub fn snapshot(self) -> Option<Snapshot> {
        match self {
            GateOutcome::Emitted(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

pub struct ChangeGate {
    config: GateConfig,
    store: ConsensusStore,
    extractor: Arc<dyn FieldExtractor>,
    oracle: Arc<dyn SignificanceOracle>,
    emitter: SnapshotEmitter,
    /// Set when decay runs on scene time.
    scene_clock: Option<Arc<ManualClock>>,
    history: Vec<Snapshot>,
    last_emitted: Option<Record>,
    state: GateState,
}

impl ChangeGate {
    pub fn new(
        config: &EngineConfig,
        extractor: Arc<dyn FieldExtractor>,
        oracle: Arc<dyn SignificanceOracle>,
    ) -> Self {
        let scene_clock = match config.gate.decay_clock {
            DecayClock::Scene => Some(Arc::new(ManualClock::at_epoch())),
            DecayClock::Wall => None,
        };
        let clock: Arc<dyn Clock> = match &scene_clock {
            Some(manual) => manual.clone(),
            None => Arc::new(SystemClock),
        };
        Self {
            config: config.gate.clone(),
            store: ConsensusStore::with_clock(config.consensus.clone(), clock),
            extractor,
            oracle,
            emitter: SnapshotEmitter::new(),
            scene_clock,
            history: Vec::new(),
            last_emitted: None,
            state: GateState::Idle,
        }
    }

    pub fn with_emitter(mut self, emitter: SnapshotEmitter) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn with_sink(self, sink: impl FnMut(&Snapshot) + Send + 'static) -> Self {
        self.with_emitter(SnapshotEmitter::with_sink(sink))
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn store(&self) -> &ConsensusStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConsensusStore {
        &mut self.store
    }

    /// Emitted snapshots kept as oracle history, oldest first.
    pub fn history(&self) -> &[Snapshot] {
        &self.history
    }

    pub fn last_emitted(&self) -> Option<&Record> {
        self.last_emitted.as_ref()
    }

    pub fn record(&self) -> Record {
        self.store.record()
    }

    /// Run one event through the gate; returns the snapshot if one was emitted.
    pub async fn process_event(&mut self, event: &StreamEvent) -> Option<Snapshot> {
        self.process(event).await.snapshot()
    }

    pub async fn process(&mut self, event: &StreamEvent) -> GateOutcome {
        let outcome = self.run(event).await;
        self.transition(GateState::Idle);
        outcome
    }

    async fn run(&mut self, event: &StreamEvent) -> GateOutcome {
        if let Some(clock) = &self.scene_clock {
            // An unrepresentable offset keeps the previous scene time.
            clock.set_offset_secs(event.start_offset());
        }

        let current = self.store.record();
        let updates = match self.extract(event, &current).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!(t = event.start_offset(), "Extractor failed, skipping event: {}", e);
                return GateOutcome::NoUpdate;
            }
        };
        if updates.is_empty() {
            return GateOutcome::NoUpdate;
        }

        for update in &updates {
            self.store
                .record_observation(update.field, &update.value, None, OBSERVATION_SOURCE);
        }
        self.transition(GateState::Candidate);

        let record = self.store.record();
        let significant = match self.decide(event, &record).await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(t = event.start_offset(), "Oracle failed, treating as not significant: {}", e);
                false
            }
        };
        if !significant {
            return GateOutcome::NotSignificant;
        }

        if self.last_emitted.as_ref() == Some(&record) {
            debug!(t = event.start_offset(), "Record unchanged, suppressing snapshot");
            return GateOutcome::Duplicate;
        }

        let snapshot = self.emitter.emit(event, &record);
        self.last_emitted = Some(record);
        self.history.push(snapshot.clone());
        let excess = self.history.len().saturating_sub(self.config.history_depth);
        self.history.drain(..excess);
        self.transition(GateState::Emitted);
        GateOutcome::Emitted(snapshot)
    }

    async fn extract(&self, event: &StreamEvent, record: &Record) -> CapabilityResult<Vec<FieldUpdate>> {
        let timeout = self.config.extractor_timeout();
        bounded("extractor", timeout, self.extractor.extract(event, record)).await
    }

    async fn decide(&self, event: &StreamEvent, record: &Record) -> CapabilityResult<bool> {
        let timeout = self.config.oracle_timeout();
        bounded("oracle", timeout, self.oracle.decide(event, record, &self.history)).await
    }

    fn transition(&mut self, next: GateState) {
        if self.state != next {
            debug!("Gate {:?} -> {:?}", self.state, next);
            self.state = next;
        }
    }
}

async fn bounded<T>(
    capability: &'static str,
    timeout: Duration,
    call: impl std::future::Future<Output = CapabilityResult<T>>,
) -> CapabilityResult<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(CapabilityError::Timeout {
            capability,
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
