// Unified request/response types for the provider gateway
//
// These types abstract over backend-specific formats (Anthropic, OpenAI-compatible
// servers, the stub) so the orchestrator works with a single shape.

use serde::{Deserialize, Serialize};

use crate::config::constants::DEFAULT_MAX_TOKENS;

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single conversational turn. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Inbound chat turn as sent by the web UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub subject_id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Learner identity used for skill tracking. Defaults to "anonymous".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl ChatRequest {
    pub fn new(subject_id: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            subject_id: subject_id.into(),
            messages,
            max_tokens: None,
            temperature: None,
            user_id: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn user_id(&self) -> &str {
        self.user_id
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(crate::config::constants::ANONYMOUS_USER)
    }

    /// Content of the most recent user message, if any
    pub fn latest_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Request handed to a backend adapter after prompt assembly
#[derive(Debug, Clone, Serialize)]
pub struct ProviderRequest {
    /// Full context, system message first
    pub messages: Vec<ChatMessage>,

    /// Model override; empty means the backend's configured model
    pub model: String,

    pub max_tokens: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    pub subject_id: String,

    /// Display name of the subject (used by the stub backend)
    pub subject_name: String,
}

impl ProviderRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: String::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            subject_id: String::new(),
            subject_name: String::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_subject(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.subject_id = id.into();
        self.subject_name = name.into();
        self
    }

    pub fn latest_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// What a backend adapter returns from a buffered call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReply {
    pub content: String,
    pub model: String,
}

/// Where the assistant message came from.
///
/// Keeps the "no real answer" cases apart: stub output and moderation refusals
/// are both delivered as ordinary messages, so callers must check this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    Backend,
    Stub,
    Moderation,
}

/// Result of a single-shot chat call
#[derive(Debug, Clone, Serialize)]
pub struct ChatResult {
    pub assistant_message: ChatMessage,
    pub model: String,
    pub is_stub: bool,
    pub source: ReplySource,
}

impl ChatResult {
    pub fn from_backend(reply: BackendReply, is_stub: bool) -> Self {
        Self {
            assistant_message: ChatMessage::assistant(reply.content),
            model: reply.model,
            is_stub,
            source: if is_stub {
                ReplySource::Stub
            } else {
                ReplySource::Backend
            },
        }
    }

    /// The fixed refusal returned when moderation blocks a turn
    pub fn refusal(message: impl Into<String>) -> Self {
        Self {
            assistant_message: ChatMessage::assistant(message),
            model: crate::config::constants::MODERATION_MODEL_ID.to_string(),
            is_stub: false,
            source: ReplySource::Moderation,
        }
    }

    pub fn text(&self) -> &str {
        &self.assistant_message.content
    }
}

/// Error category exposed to callers (HTTP status mapping, SSE error events)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    UpstreamUnavailable,
    BackendFatal,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::BackendFatal => "backend_fatal",
            Self::Internal => "internal",
        }
    }
}

/// Terminal error carried by a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Incremental unit of assistant output.
///
/// A stream is a sequence of `Delta`s closed by exactly one `End` or `Error`.
/// Concatenating the deltas gives the full assistant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSegment {
    Delta(String),
    End,
    Error(StreamError),
}

impl StreamSegment {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Delta(_))
    }

    pub fn as_delta(&self) -> Option<&str> {
        match self {
            Self::Delta(text) => Some(text),
            _ => None,
        }
    }
}
