// HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::orchestrator::ChatError;
use crate::providers::ErrorKind;

#[derive(Debug)]
pub enum ApiError {
    Chat(ChatError),
    BadRequest(String),
    RateLimited,
    Internal(anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    kind: &'a str,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Chat(e) => match e.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::BackendFatal => StatusCode::BAD_GATEWAY,
                ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Chat(e) => e.kind().as_str(),
            Self::BadRequest(_) => ErrorKind::Validation.as_str(),
            Self::RateLimited => "rate_limited",
            Self::Internal(_) => ErrorKind::Internal.as_str(),
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Chat(e) => e.to_string(),
            Self::BadRequest(msg) => msg.clone(),
            Self::RateLimited => "Too many requests, slow down.".to_string(),
            // Details stay in the logs
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        Self::Chat(e)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            match &self {
                Self::Internal(e) => tracing::error!(error = %e, "Request failed"),
                other => tracing::warn!(status = %status, kind = other.kind(), "Request failed"),
            }
        }
        let body = ErrorBody {
            error: self.message(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}
