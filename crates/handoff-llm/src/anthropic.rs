//! Anthropic Messages API provider with SSE streaming

use crate::provider::{LlmError, LlmProvider, LlmResult, LlmStream};
use crate::types::{LlmRequest, StreamDelta, Usage};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str { "anthropic" }

    fn models(&self) -> &[&str] {
        &[
            "claude-haiku-4-5",
            "claude-sonnet-4-5",
            "claude-opus-4",
        ]
    }

    async fn complete_stream(
        &self,
        request: LlmRequest,
        cancel: Option<CancellationToken>,
    ) -> LlmResult<LlmStream> {
        let body = build_request_body(&request);

        debug!("Anthropic request: model={}", body.model);

        let send = self.client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send();

        let response = match &cancel {
            Some(token) => tokio::select! {
                r = send => r?,
                _ = token.cancelled() => return Err(LlmError::Cancelled),
            },
            None => send.await?,
        };

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Anthropic error {}: {}", status, error_text);

            if status.as_u16() == 401 {
                return Err(LlmError::AuthFailed(error_text));
            } else if status.as_u16() == 429 {
                return Err(LlmError::RateLimited { retry_after_ms: 60000 });
            } else {
                return Err(LlmError::RequestFailed(format!("{}: {}", status, error_text)));
            }
        }

        let stream = parse_sse_stream(response.bytes_stream(), cancel.unwrap_or_else(CancellationToken::new));
        Ok(Box::pin(stream))
    }
}

fn build_request_body(request: &LlmRequest) -> AnthropicRequest {
    // Anthropic takes the system prompt out-of-band; system-role messages fold into it.
    let mut system = request.system.clone();
    let mut messages = Vec::with_capacity(request.messages.len());
    for m in &request.messages {
        if m.role == "system" {
            system = Some(match system {
                Some(s) => format!("{}\n\n{}", s, m.content),
                None => m.content.clone(),
            });
        } else {
            messages.push(AnthropicMessage {
                role: m.role.clone(),
                content: m.content.clone(),
            });
        }
    }

    AnthropicRequest {
        model: request.model.clone(),
        messages,
        max_tokens: request.max_tokens.unwrap_or(256),
        stream: true,
        system,
        temperature: request.temperature,
    }
}

/// Interpret one SSE event. `None` means the event carries nothing for the caller.
pub fn parse_sse_event(event_type: &str, event_data: &str) -> Option<LlmResult<StreamDelta>> {
    match event_type {
        "content_block_delta" => {
            let data = serde_json::from_str::<ContentBlockDelta>(event_data).ok()?;
            match data.delta {
                DeltaType::TextDelta { text } => Some(Ok(StreamDelta::Text(text))),
                DeltaType::Other => None,
            }
        }
        "message_delta" => {
            if let Ok(data) = serde_json::from_str::<MessageDelta>(event_data) {
                if let Some(stop_reason) = data.delta.stop_reason {
                    debug!("Message complete: stop_reason={}", stop_reason);
                }
            }
            None
        }
        "message_stop" => Some(Ok(StreamDelta::Done {
            stop_reason: Some("end_turn".to_string()),
            usage: None,
        })),
        "error" => {
            let data = serde_json::from_str::<ErrorEvent>(event_data).ok()?;
            Some(Err(LlmError::StreamError(data.error.message)))
        }
        _ => None,
    }
}

fn parse_sse_stream(
    bytes_stream: impl futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
    cancel: CancellationToken,
) -> impl futures::Stream<Item = LlmResult<StreamDelta>> + Send {
    async_stream::stream! {
        let mut buffer = String::new();

        tokio::pin!(bytes_stream);

        loop {
            let chunk_result = tokio::select! {
                next = bytes_stream.next() => match next {
                    Some(c) => c,
                    None => break,
                },
                _ = cancel.cancelled() => {
                    yield Err(LlmError::Cancelled);
                    break;
                }
            };

            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    yield Err(LlmError::StreamError(e.to_string()));
                    continue;
                }
            };

            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(event_end) = buffer.find("\n\n") {
                let event_str = buffer[..event_end].to_string();
                buffer = buffer[event_end + 2..].to_string();

                let mut event_type = String::new();
                let mut event_data = String::new();

                for line in event_str.lines() {
                    if let Some(rest) = line.strip_prefix("event: ") {
                        event_type = rest.to_string();
                    } else if let Some(rest) = line.strip_prefix("data: ") {
                        event_data = rest.to_string();
                    }
                }

                if event_data.is_empty() { continue; }

                if let Some(item) = parse_sse_event(&event_type, &event_data) {
                    yield item;
                }
            }
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ContentBlockDelta {
    #[allow(dead_code)]
    index: u32,
    delta: DeltaType,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum DeltaType {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct MessageDelta {
    delta: MessageDeltaContent,
    #[allow(dead_code)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct MessageDeltaContent {
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEvent {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}
