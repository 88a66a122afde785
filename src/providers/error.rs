// Backend error taxonomy
//
// Every adapter maps its own failure shapes (HTTP status codes, SSE error
// events, reqwest transport errors) onto `ProviderError`. The gateway only
// reasons about `is_retryable()`.

use reqwest::header::HeaderValue;
use reqwest::StatusCode;
use thiserror::Error;

use super::types::{ErrorKind, StreamError};

/// Failure of a single backend call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("backend request timed out")]
    Timeout,

    #[error("could not reach backend: {0}")]
    Connection(String),

    #[error("backend rate limited the request")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("backend server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("backend rejected credentials ({status}): {body}")]
    Auth { status: u16, body: String },

    #[error("backend rejected the request ({status}): {body}")]
    BadRequest { status: u16, body: String },

    #[error("unexpected backend response: {0}")]
    InvalidResponse(String),

    #[error("backend call cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection(_) | Self::RateLimited { .. } | Self::Server { .. }
        )
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => None,
        }
    }

    /// Short label for logs and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection(_) => "connection",
            Self::RateLimited { .. } => "rate_limited",
            Self::Server { .. } => "server",
            Self::Auth { .. } => "auth",
            Self::BadRequest { .. } => "bad_request",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Cancelled => "cancelled",
        }
    }

    /// Classify a non-success HTTP response
    pub fn from_status(status: StatusCode, body: String, retry_after: Option<&HeaderValue>) -> Self {
        let code = status.as_u16();
        match code {
            401 | 403 => Self::Auth { status: code, body },
            408 => Self::Timeout,
            429 => Self::RateLimited {
                retry_after_ms: retry_after.and_then(parse_retry_after),
            },
            500..=599 => Self::Server { status: code, body },
            _ => Self::BadRequest { status: code, body },
        }
    }
}

/// `Retry-After` in delta-seconds. HTTP-date values are ignored.
fn parse_retry_after(value: &HeaderValue) -> Option<u64> {
    value
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1000))
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connection(e.to_string())
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_status(status, e.to_string(), None)
        } else {
            Self::Connection(e.to_string())
        }
    }
}

/// Outcome of the gateway's retry policy
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Transient failures persisted through every allowed attempt
    #[error("backend unavailable after {attempts} attempt(s): {source}")]
    UpstreamUnavailable { attempts: u32, source: ProviderError },

    /// Non-retryable failure (auth, malformed request). Indicates misconfiguration.
    #[error("backend call failed: {0}")]
    Fatal(#[source] ProviderError),

    #[error("backend call cancelled")]
    Cancelled,
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailable,
            Self::Fatal(_) => ErrorKind::BackendFatal,
            Self::Cancelled => ErrorKind::Internal,
        }
    }
}

impl From<&GatewayError> for StreamError {
    fn from(e: &GatewayError) -> Self {
        let message = match e {
            GatewayError::UpstreamUnavailable { .. } => {
                crate::config::constants::DEGRADED_MESSAGE.to_string()
            }
            GatewayError::Fatal(_) => crate::config::constants::MISCONFIGURED_MESSAGE.to_string(),
            GatewayError::Cancelled => e.to_string(),
        };
        StreamError {
            kind: e.kind(),
            message,
        }
    }
}
