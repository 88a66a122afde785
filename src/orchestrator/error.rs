// Orchestration error taxonomy
//
// Moderation blocks are not errors; they come back as ordinary replies with
// `ReplySource::Moderation`.

use thiserror::Error;

use crate::config::constants::{DEGRADED_MESSAGE, MISCONFIGURED_MESSAGE};
use crate::prompt::PromptError;
use crate::providers::{ErrorKind, GatewayError};

#[derive(Debug, Clone, Error)]
pub enum ChatError {
    /// Malformed request. Reported to the caller, never retried.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Transient backend failures outlasted the retry policy
    #[error("{}", DEGRADED_MESSAGE)]
    UpstreamUnavailable(#[source] GatewayError),

    /// Backend rejected the call (auth, bad model, malformed request)
    #[error("{}", MISCONFIGURED_MESSAGE)]
    BackendFatal(#[source] GatewayError),

    /// Bug or broken configuration inside the service
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            Self::BackendFatal(_) => ErrorKind::BackendFatal,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<GatewayError> for ChatError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::UpstreamUnavailable { .. } => Self::UpstreamUnavailable(e),
            GatewayError::Fatal(_) => Self::BackendFatal(e),
            GatewayError::Cancelled => Self::Internal("backend call cancelled".to_string()),
        }
    }
}

impl From<PromptError> for ChatError {
    fn from(e: PromptError) -> Self {
        Self::Internal(e.to_string())
    }
}
