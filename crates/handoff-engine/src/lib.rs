//! Handoff Engine - streaming consensus and change detection for SBAR handoffs
//!
//! Pipeline, one conversation at a time:
//! - Extractor: maps an utterance to candidate field updates
//! - ConsensusStore: decay-weighted voting over a short window per field
//! - ChangeGate: consults the significance oracle, suppresses duplicates
//! - SnapshotEmitter: numbered immutable snapshots to a caller sink
//! - QuestionGenerator: clarifying prompts for missing or noisy state

pub mod clock;
pub mod config;
pub mod consensus;
pub mod context;
pub mod emitter;
pub mod error;
pub mod extractor;
pub mod gate;
pub mod normalize;
pub mod oracle;
pub mod questions;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DecayClock, EngineConfig};
pub use consensus::ConsensusStore;
pub use context::ContextWindow;
pub use emitter::{SnapshotEmitter, SnapshotSink};
pub use error::{CapabilityError, CapabilityResult};
pub use extractor::{extractor_fn, FieldExtractor, FieldUpdate, KeywordExtractor, LlmFieldExtractor};
pub use gate::{ChangeGate, GateOutcome, GateState};
pub use oracle::{oracle_fn, AlwaysSignificant, KeywordOracle, LlmOracle, SignificanceOracle};
pub use questions::{PromptSource, QuestionGenerator};
