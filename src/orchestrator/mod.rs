// Orchestration core
//
// One chat turn moves RECEIVED -> MODERATED -> PROMPTED -> DISPATCHED and ends
// COMPLETED, BLOCKED or FAILED. The orchestrator holds no per-turn state; all
// of it lives in the call (or in the returned `ChatStream`).

mod error;
mod stream;

pub use error::ChatError;
pub use stream::ChatStream;

use chrono::Utc;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::constants::MAX_TOKENS_LIMIT;
use crate::logging::fingerprint;
use crate::metrics;
use crate::moderation::ModerationGate;
use crate::prompt::{PromptBudget, PromptBuilder};
use crate::providers::{ChatRequest, ChatResult, ProviderGateway, ProviderRequest, Role};
use crate::skills::{SkillExtractor, SkillRecorder};
use crate::subjects::{SubjectCatalog, SubjectConfig};
use stream::TurnRecording;

/// Lifecycle of a single turn, used in trace output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Received,
    Moderated,
    Prompted,
    Dispatched,
    Completed,
    Blocked,
    Failed,
}

impl TurnState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Moderated => "moderated",
            Self::Prompted => "prompted",
            Self::Dispatched => "dispatched",
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
        }
    }
}

/// Generation defaults applied when the request leaves them unset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationDefaults {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationDefaults {
    fn default() -> Self {
        Self {
            max_tokens: crate::config::constants::DEFAULT_MAX_TOKENS,
            temperature: crate::config::constants::DEFAULT_TEMPERATURE,
        }
    }
}

/// Request validated against the catalog
struct Turn {
    subject: SubjectConfig,
    user_id: String,
    user_text: String,
}

/// Sequences moderation, prompt assembly, dispatch and skill recording
#[derive(Clone)]
pub struct Orchestrator {
    gateway: ProviderGateway,
    subjects: Arc<dyn SubjectCatalog>,
    moderation: Arc<ModerationGate>,
    prompt: PromptBuilder,
    skills: Option<(SkillExtractor, SkillRecorder)>,
    defaults: GenerationDefaults,
}

impl Orchestrator {
    pub fn new(gateway: ProviderGateway, subjects: Arc<dyn SubjectCatalog>) -> Self {
        Self {
            gateway,
            subjects,
            moderation: Arc::new(ModerationGate::default()),
            prompt: PromptBuilder::default(),
            skills: None,
            defaults: GenerationDefaults::default(),
        }
    }

    pub fn with_moderation(mut self, gate: ModerationGate) -> Self {
        self.moderation = Arc::new(gate);
        self
    }

    pub fn with_prompt_budget(mut self, budget: PromptBudget) -> Self {
        self.prompt = PromptBuilder::new(budget);
        self
    }

    /// Record skill events for completed non-stub turns
    pub fn with_skill_recording(mut self, extractor: SkillExtractor, recorder: SkillRecorder) -> Self {
        self.skills = Some((extractor, recorder));
        self
    }

    pub fn with_defaults(mut self, defaults: GenerationDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn gateway(&self) -> &ProviderGateway {
        &self.gateway
    }

    pub fn subjects(&self) -> &Arc<dyn SubjectCatalog> {
        &self.subjects
    }

    /// Run one buffered turn
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResult, ChatError> {
        let span = tracing::info_span!(
            "chat_turn",
            turn = %Uuid::new_v4(),
            subject = %request.subject_id,
            mode = "complete"
        );
        async move {
            let result = self.run_complete(&request).await;
            let outcome = match &result {
                Ok(r) if r.source == crate::providers::ReplySource::Moderation => TurnState::Blocked,
                Ok(_) => TurnState::Completed,
                Err(e) => {
                    tracing::warn!(state = TurnState::Failed.as_str(), kind = e.kind().as_str(), error = %e, "Chat turn failed");
                    TurnState::Failed
                }
            };
            let label = match &result {
                Err(e) => e.kind().as_str(),
                Ok(_) => outcome.as_str(),
            };
            metrics::record_turn("complete", label);
            result
        }
        .instrument(span)
        .await
    }

    async fn run_complete(&self, request: &ChatRequest) -> Result<ChatResult, ChatError> {
        let turn = self.validate(request)?;

        if let Some(refusal) = self.moderate(&turn) {
            return Ok(ChatResult::refusal(refusal));
        }

        let provider_request = self.prepare(request, &turn)?;
        tracing::debug!(state = TurnState::Dispatched.as_str(), backend = self.gateway.backend_name(), "Dispatching turn");
        let result = self.gateway.complete(&provider_request).await?;

        if !result.is_stub {
            if let Some((extractor, recorder)) = &self.skills {
                let events = extractor.extract(
                    &turn.user_id,
                    &turn.subject.id,
                    &turn.user_text,
                    result.text(),
                    Utc::now(),
                );
                recorder.record(events);
            }
        }

        tracing::info!(
            state = TurnState::Completed.as_str(),
            model = %result.model,
            is_stub = result.is_stub,
            chars = result.text().len(),
            "Chat turn completed"
        );
        Ok(result)
    }

    /// Start a streamed turn.
    ///
    /// Validation failures come back as `Err` before any segment exists; every
    /// later failure is delivered in-band as a terminal `Error` segment.
    pub fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, ChatError> {
        let span = tracing::info_span!(
            "chat_turn",
            turn = %Uuid::new_v4(),
            subject = %request.subject_id,
            mode = "stream"
        );
        let _entered = span.enter();

        let prepared = self.validate(&request).and_then(|turn| {
            if let Some(refusal) = self.moderate(&turn) {
                return Ok(Err(refusal));
            }
            let provider_request = self.prepare(&request, &turn)?;
            Ok(Ok((turn, provider_request)))
        });

        let (turn, provider_request) = match prepared {
            Ok(Ok(ready)) => ready,
            Ok(Err(refusal)) => return Ok(ChatStream::refusal(&refusal).in_span(span.clone())),
            Err(e) => {
                tracing::warn!(state = TurnState::Failed.as_str(), kind = e.kind().as_str(), error = %e, "Stream turn rejected");
                metrics::record_turn("stream", e.kind().as_str());
                return Err(e);
            }
        };

        tracing::debug!(state = TurnState::Dispatched.as_str(), backend = self.gateway.backend_name(), "Dispatching streamed turn");
        let recording = self.skills.as_ref().map(|(extractor, recorder)| TurnRecording {
            extractor: extractor.clone(),
            recorder: recorder.clone(),
            user_id: turn.user_id,
            subject_id: turn.subject.id,
            user_text: turn.user_text,
        });
        Ok(ChatStream::live(self.gateway.stream(provider_request), recording).in_span(span.clone()))
    }

    fn validate(&self, request: &ChatRequest) -> Result<Turn, ChatError> {
        tracing::debug!(
            state = TurnState::Received.as_str(),
            messages = request.messages.len(),
            "Chat turn received"
        );

        let last = request
            .messages
            .last()
            .ok_or_else(|| ChatError::validation("messages must not be empty"))?;
        if last.role != Role::User {
            return Err(ChatError::validation("the last message must come from the user"));
        }
        if last.content.trim().is_empty() {
            return Err(ChatError::validation("the latest user message is empty"));
        }
        if let Some(max_tokens) = request.max_tokens {
            if max_tokens == 0 || max_tokens > MAX_TOKENS_LIMIT {
                return Err(ChatError::Validation(format!(
                    "max_tokens must be between 1 and {}",
                    MAX_TOKENS_LIMIT
                )));
            }
        }
        if let Some(t) = request.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ChatError::validation("temperature must be between 0 and 2"));
            }
        }

        let subject = self
            .subjects
            .get(&request.subject_id)
            .ok_or_else(|| ChatError::Validation(format!("unknown subject: {}", request.subject_id)))?;

        Ok(Turn {
            subject,
            user_id: request.user_id().to_string(),
            user_text: last.content.clone(),
        })
    }

    /// Returns the refusal text when the turn must not reach the backend
    fn moderate(&self, turn: &Turn) -> Option<String> {
        let verdict = self.moderation.check(&turn.user_text);
        if verdict.allowed {
            tracing::debug!(state = TurnState::Moderated.as_str(), "Turn passed moderation");
            return None;
        }

        let category = verdict.category.map(|c| c.as_str()).unwrap_or("unknown");
        metrics::record_moderation_block(category);
        tracing::info!(
            state = TurnState::Blocked.as_str(),
            category,
            fingerprint = %fingerprint(&turn.user_text),
            "Turn blocked by moderation"
        );
        Some(
            verdict
                .reason
                .unwrap_or_else(|| crate::config::constants::REFUSAL_MESSAGE.to_string()),
        )
    }

    fn prepare(&self, request: &ChatRequest, turn: &Turn) -> Result<ProviderRequest, ChatError> {
        let messages = self.prompt.build(&turn.subject, &request.messages)?;
        tracing::debug!(
            state = TurnState::Prompted.as_str(),
            messages = messages.len(),
            est_tokens = crate::prompt::estimate_tokens(&messages),
            "Prompt assembled"
        );

        Ok(ProviderRequest::new(messages)
            .with_max_tokens(request.max_tokens.unwrap_or(self.defaults.max_tokens))
            .with_temperature(request.temperature.unwrap_or(self.defaults.temperature))
            .with_subject(turn.subject.id.clone(), turn.subject.name.clone()))
    }
}
