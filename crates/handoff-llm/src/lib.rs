//! Handoff LLM - Provider adapters behind the oracle and extractor capabilities

pub mod anthropic;
pub mod openai;
pub mod provider;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiCompatProvider;
pub use provider::{collect_text, LlmError, LlmProvider, LlmResult, LlmStream};
pub use tokio_util::sync::CancellationToken;
pub use types::*;
