//! Errors raised by pluggable capabilities (oracle, extractor)
//!
//! None of these ever reach the stream consumer: the gate maps each one to
//! its fallback and logs it.

use handoff_llm::LlmError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("{capability} timed out after {timeout_ms}ms")]
    Timeout { capability: &'static str, timeout_ms: u64 },

    #[error("Unparseable response: {0}")]
    Unparseable(String),

    #[error("Capability failed: {0}")]
    Failed(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

impl CapabilityError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn unparseable(response: impl Into<String>) -> Self {
        Self::Unparseable(response.into())
    }
}

pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;
