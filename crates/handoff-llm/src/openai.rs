//! OpenAI-compatible chat completions provider (LM Studio and friends)
//!
//! Local runtimes expose `/v1/chat/completions`; responses are requested
//! non-streaming and replayed to the caller as a two-item stream.

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{LlmMessage, LlmRequest, StreamDelta, Usage};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const DEFAULT_LOCAL_URL: &str = "http://localhost:1234/v1/chat/completions";

pub struct OpenAiCompatProvider {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiCompatProvider {
    /// Provider pointed at a local LM Studio instance.
    pub fn local() -> Self {
        Self {
            client: Client::new(),
            api_key: None,
            base_url: DEFAULT_LOCAL_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str { "openai" }

    fn models(&self) -> &[&str] {
        // Local runtimes serve whatever model is loaded.
        &[""]
    }

    async fn complete_stream(
        &self,
        request: LlmRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<LlmStream> {
        let body = build_request_body(&request);
        debug!("OpenAI-compatible request: model={} url={}", body.model, self.base_url);

        let mut builder = self.client.post(&self.base_url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = match &cancel {
            Some(token) => tokio::select! {
                r = builder.send() => r?,
                _ = token.cancelled() => return Err(LlmError::Cancelled),
            },
            None => builder.send().await?,
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("OpenAI-compatible error {}: {}", status, error_text);
            return Err(match status.as_u16() {
                401 | 403 => LlmError::AuthFailed(error_text),
                429 => LlmError::RateLimited { retry_after_ms: 60000 },
                _ => LlmError::RequestFailed(format!("{}: {}", status, error_text)),
            });
        }

        let payload: serde_json::Value = response.json().await?;
        let (text, usage) = parse_completion(&payload)?;

        let items = vec![
            Ok(StreamDelta::Text(text)),
            Ok(StreamDelta::Done { stop_reason: Some("stop".into()), usage }),
        ];
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

fn build_request_body(request: &LlmRequest) -> ChatRequest {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    if let Some(system) = &request.system {
        messages.push(LlmMessage::system(system.clone()));
    }
    messages.extend(request.messages.iter().cloned());
    ChatRequest {
        model: request.model.clone(),
        messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        stream: false,
    }
}

/// Pull the assistant text out of a chat completion payload.
/// Some local runtimes answer `{ "response": "..." }` instead of `choices`.
pub fn parse_completion(payload: &serde_json::Value) -> LlmResult<(String, Option<Usage>)> {
    if let Ok(parsed) = serde_json::from_value::<ChatResponse>(payload.clone()) {
        if let Some(choice) = parsed.choices.into_iter().next() {
            let usage = parsed.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            });
            return Ok((choice.message.content, usage));
        }
    }
    if let Some(text) = payload.get("response").and_then(|v| v.as_str()) {
        return Ok((text.to_string(), None));
    }
    Err(LlmError::InvalidResponse(format!(
        "no choices in completion: {}",
        payload
    )))
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<LlmMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
