// OpenAI-compatible backend
//
// Works for any server speaking the Chat Completions protocol: LM Studio,
// Ollama, llama.cpp's server, vLLM, or OpenAI itself.

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
use super::types::{BackendReply, ProviderRequest};
use super::{ChatBackend, DeltaReceiver};

const EMPTY_CONTENT_PLACEHOLDER: &str = "(No content returned from model.)";
const STREAM_CHANNEL_CAPACITY: usize = 64;

/// Backend for OpenAI-compatible `/chat/completions` endpoints
#[derive(Clone)]
pub struct OpenAiCompatBackend {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiCompatBackend {
    /// `base_url` is normalized so both `http://host:1234` and `http://host:1234/v1` work.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: impl Into<String>,
        connect_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: normalize_base_url(base_url),
            model: model.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn to_wire_request<'a>(&'a self, request: &'a ProviderRequest, stream: bool) -> WireRequest<'a> {
        let model = if request.model.is_empty() {
            self.model.as_str()
        } else {
            request.model.as_str()
        };

        WireRequest {
            model,
            messages: request
                .messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream,
        }
    }

    async fn post(
        &self,
        request: &ProviderRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut builder = self
            .client
            .post(self.endpoint())
            .header("content-type", "application/json")
            .json(&self.to_wire_request(request, stream));

        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await?;
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
impl ChatBackend for OpenAiCompatBackend {
    async fn complete(&self, request: &ProviderRequest) -> Result<BackendReply, ProviderError> {
        tracing::debug!(
            messages = request.messages.len(),
            "Sending request to {}",
            self.endpoint()
        );

        let response = self.post(request, false).await?;
        let body: WireResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| EMPTY_CONTENT_PLACEHOLDER.to_string());

        Ok(BackendReply {
            content,
            model: body.model.unwrap_or_else(|| self.model.clone()),
        })
    }

    async fn stream(
        &self,
        request: &ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<DeltaReceiver, ProviderError> {
        let response = self.post(request, true).await?;
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);

        // Spawn task to parse SSE stream
        tokio::spawn(async move {
            tracing::debug!("[STREAM] OpenAI-compatible streaming task started");
            let mut body = response.bytes_stream();
            let mut lines = SseLineBuffer::new();

            'read: loop {
                let chunk = tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("[STREAM] cancelled, dropping upstream response");
                        break 'read;
                    }
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
                        if let Some(rest) = lines.finish() {
                            if let StreamLine::Delta(text) = parse_stream_line(&rest) {
                                let _ = tx.send(Ok(text)).await;
                            }
                        }
                        break 'read;
                    }
                };

                for line in lines.push(&bytes) {
                    match parse_stream_line(&line) {
                        StreamLine::Delta(text) => {
                            if tx.send(Ok(text)).await.is_err() {
                                break 'read;
                            }
                        }
                        StreamLine::Done => {
                            tracing::debug!("[STREAM] Received [DONE]");
                            break 'read;
                        }
                        StreamLine::Skip => {}
                    }
                }
            }

            tracing::debug!("[STREAM] OpenAI-compatible streaming task finished");
        });

        Ok(rx)
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Accept `http://host:port` or `http://host:port/v1`, with or without a trailing slash
pub fn normalize_base_url(base_url: &str) -> String {
    let trimmed = base_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{}/v1", trimmed)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum StreamLine {
    Delta(String),
    Done,
    Skip,
}

fn parse_stream_line(line: &str) -> StreamLine {
    let Some(payload) = data_payload(line) else {
        return StreamLine::Skip;
    };
    if payload == "[DONE]" {
        return StreamLine::Done;
    }
    // Malformed lines are skipped rather than failing the stream
    match serde_json::from_str::<WireStreamChunk>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty())
            .map_or(StreamLine::Skip, StreamLine::Delta),
        Err(e) => {
            tracing::debug!("Skipping unparseable stream line: {}", e);
            StreamLine::Skip
        }
    }
}

// Chat Completions wire types

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    delta: WireDelta,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
}
