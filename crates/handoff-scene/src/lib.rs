//! Handoff Scene - scripted scene replay, protocol references, clinician data, reports
//!
//! Everything needed to push a recorded emergency through the engine offline
//! and leave Markdown artifacts behind.

pub mod harness;
pub mod protocols;
pub mod report;
pub mod responder;
pub mod scene;

pub use harness::{HarnessOptions, HarnessResult, SceneHarness};
pub use protocols::{ProtocolDoc, ProtocolLibrary, ProtocolMeta, SceneMetadata};
pub use report::{build_markdown_body, build_protocols_section, build_questions_markdown, build_report, format_record_line};
pub use responder::{ClinicianDataStore, Responder};
pub use scene::{from_offset, load_scene, parse_scene, spawn_replay, Pacer, ReplayOptions, SceneLoad};
