// HTTP handlers

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::header,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Json,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;

use super::error::ApiError;
use super::AppState;
use crate::config::RedactedSettings;
use crate::providers::{ChatMessage, ChatRequest, ChatResult, ReplySource, StreamSegment};
use crate::recommend::NextQuestionSuggestion;
use crate::subjects::SubjectSummary;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub env: String,
    pub backend: String,
    pub model: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub assistant: ChatMessage,
    pub model: String,
    pub stub: bool,
    pub source: ReplySource,
}

impl From<ChatResult> for ChatResponse {
    fn from(r: ChatResult) -> Self {
        Self {
            assistant: r.assistant_message,
            model: r.model,
            stub: r.is_stub,
            source: r.source,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NextQuestionParams {
    pub subject_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let gateway = state.orchestrator.gateway();
    Json(HealthResponse {
        status: "ok",
        env: state.settings.env.clone(),
        backend: gateway.backend_name().to_string(),
        model: gateway.model().to_string(),
    })
}

pub async fn list_subjects(State(state): State<AppState>) -> Json<Vec<SubjectSummary>> {
    let subjects = state
        .orchestrator
        .subjects()
        .list()
        .iter()
        .map(SubjectSummary::from)
        .collect();
    Json(subjects)
}

pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let result = state.orchestrator.chat(request).await?;
    Ok(Json(result.into()))
}

/// Streams the reply as SSE. Dropping the response (client disconnect)
/// drops the `ChatStream`, which cancels the backend call.
pub async fn chat_stream(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let stream = state.orchestrator.chat_stream(request)?;

    let done = json!({
        "model": stream.model(),
        "stub": stream.is_stub(),
        "source": stream.source(),
    });
    let events = stream.map(move |segment| Ok(segment_event(segment, &done)));

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn segment_event(segment: StreamSegment, done: &serde_json::Value) -> Event {
    let event = match &segment {
        StreamSegment::Delta(content) => Event::default().json_data(json!({ "content": content })),
        StreamSegment::End => Event::default().event("done").json_data(done),
        StreamSegment::Error(e) => Event::default().event("error").json_data(e),
    };
    event.unwrap_or_else(|_| Event::default().data("{}"))
}

pub async fn next_question(
    State(state): State<AppState>,
    Query(params): Query<NextQuestionParams>,
) -> Result<Json<NextQuestionSuggestion>, ApiError> {
    let subject = state
        .orchestrator
        .subjects()
        .get(&params.subject_id)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown subject: {}", params.subject_id)))?;

    let user_id = params
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(crate::config::constants::ANONYMOUS_USER);

    let suggestion = state.recommendations.suggest_next(user_id, &subject.id).await?;
    Ok(Json(suggestion))
}

pub async fn debug_settings(State(state): State<AppState>) -> Json<RedactedSettings> {
    Json(state.settings.as_ref().clone())
}

pub async fn metrics_endpoint() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_response_shape() {
        let response: ChatResponse = ChatResult::refusal("no").into();
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["assistant"]["role"], "assistant");
        assert_eq!(value["assistant"]["content"], "no");
        assert_eq!(value["source"], "moderation");
        assert_eq!(value["stub"], false);
    }
}
