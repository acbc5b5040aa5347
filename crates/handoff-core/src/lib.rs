//! Handoff Core - Types, records, and error handling

pub mod error;
pub mod event;
pub mod snapshot;
pub mod types;

pub use error::{Error, Result};
pub use event::StreamEvent;
pub use snapshot::{QuestionEntry, Snapshot};
pub use types::*;
