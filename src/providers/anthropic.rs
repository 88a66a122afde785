// Hosted backend: Anthropic Messages API

use async_trait::async_trait;
use futures::stream::StreamExt;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::ProviderError;
use super::sse::{data_payload, SseLineBuffer};
use super::types::{BackendReply, ProviderRequest, Role};
use super::{ChatBackend, DeltaReceiver};

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// Hosted Anthropic backend
#[derive(Clone)]
pub struct AnthropicBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicBackend {
    pub fn new(
        api_key: String,
        model: impl Into<String>,
        connect_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            api_key,
            base_url: ANTHROPIC_API_URL.to_string(),
            model: model.into(),
        })
    }

    /// Point at a different host (proxies, tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn to_wire_request<'a>(&'a self, request: &'a ProviderRequest, stream: bool) -> WireRequest<'a> {
        let model = if request.model.is_empty() {
            self.model.as_str()
        } else {
            request.model.as_str()
        };

        // System turns travel in the top-level `system` field
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        WireRequest {
            model,
            max_tokens: request.max_tokens,
            system: if system.is_empty() {
                None
            } else {
                Some(system.join("\n\n"))
            },
            messages: request
                .messages
                .iter()
                .filter(|m| m.role != Role::System)
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: request.temperature,
            stream,
        }
    }

    async fn post(
        &self,
        request: &ProviderRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&self.to_wire_request(request, stream))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response.headers().get(RETRY_AFTER).cloned();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body, retry_after.as_ref()));
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    async fn complete(&self, request: &ProviderRequest) -> Result<BackendReply, ProviderError> {
        tracing::debug!(messages = request.messages.len(), "Sending request to Anthropic API");

        let response = self.post(request, false).await?;
        let body: WireResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let content: String = body
            .content
            .iter()
            .filter_map(|block| match block {
                WireContentBlock::Text { text } => Some(text.as_str()),
                WireContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.trim().is_empty() {
            return Err(ProviderError::InvalidResponse(
                "Anthropic response contained no text".to_string(),
            ));
        }

        Ok(BackendReply {
            content,
            model: body.model,
        })
    }

    async fn stream(
        &self,
        request: &ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<DeltaReceiver, ProviderError> {
        let response = self.post(request, true).await?;
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            tracing::debug!("[STREAM] Anthropic streaming task started");
            let mut body = response.bytes_stream();
            let mut lines = SseLineBuffer::new();

            'read: loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => break 'read,
                    _ = tx.closed() => break 'read,
                    chunk = body.next() => chunk,
                };

                let bytes = match chunk {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => {
                        let _ = tx.send(Err(e.into())).await;
                        break 'read;
                    }
                    None => {
                        // A complete reply always ends with message_stop
                        let _ = tx
                            .send(Err(ProviderError::Connection(
                                "stream ended before message_stop".to_string(),
                            )))
                            .await;
                        break 'read;
                    }
                };

                for line in lines.push(&bytes) {
                    let Some(payload) = data_payload(&line) else {
                        continue;
                    };
                    let event = match serde_json::from_str::<WireStreamEvent>(payload) {
                        Ok(event) => event,
                        Err(e) => {
                            tracing::debug!("Skipping unparseable Anthropic event: {}", e);
                            continue;
                        }
                    };
                    match event {
                        WireStreamEvent::ContentBlockDelta {
                            delta: WireDelta::TextDelta { text },
                        } if !text.is_empty() => {
                            if tx.send(Ok(text)).await.is_err() {
                                break 'read;
                            }
                        }
                        WireStreamEvent::MessageStop => break 'read,
                        WireStreamEvent::Error { error } => {
                            let _ = tx.send(Err(error.into_provider_error())).await;
                            break 'read;
                        }
                        _ => {}
                    }
                }
            }

            tracing::debug!("[STREAM] Anthropic streaming task finished");
        });

        Ok(rx)
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// Messages API wire types

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    model: String,
    content: Vec<WireContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireStreamEvent {
    ContentBlockDelta {
        delta: WireDelta,
    },
    MessageStop,
    Error {
        error: WireError,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireDelta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(rename = "type")]
    error_type: String,
    #[serde(default)]
    message: String,
}

impl WireError {
    fn into_provider_error(self) -> ProviderError {
        match self.error_type.as_str() {
            "overloaded_error" => ProviderError::Server {
                status: 529,
                body: self.message,
            },
            "api_error" => ProviderError::Server {
                status: 500,
                body: self.message,
            },
            "rate_limit_error" => ProviderError::RateLimited {
                retry_after_ms: None,
            },
            "authentication_error" | "permission_error" => ProviderError::Auth {
                status: 401,
                body: self.message,
            },
            _ => ProviderError::BadRequest {
                status: 400,
                body: self.message,
            },
        }
    }
}
