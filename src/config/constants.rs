// Project-wide constants
//
// Centralised here so user-facing messages and magic values have one
// source of truth. Import via `use crate::config::constants::*;`.

/// Default bind address for the HTTP server (localhost only).
pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:8000";

/// Environment name reported by `/health` when none is configured.
pub const DEFAULT_ENV: &str = "local";

/// Default model name for OpenAI-compatible servers (LM Studio's default download).
pub const DEFAULT_OPENAI_MODEL: &str = "llama-3.2-3b-instruct";

/// Default model for the hosted Anthropic backend.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-6";

/// Default maximum tokens for a single assistant reply.
pub const DEFAULT_MAX_TOKENS: u32 = 512;

/// Largest `max_tokens` a client may ask for. Anything above is rejected
/// before it can reach the backend as a bad request.
pub const MAX_TOKENS_LIMIT: u32 = 8_192;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.4;

/// Learner id used when a request carries none.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Model identifier reported for stub replies.
pub const STUB_MODEL_ID: &str = "stub";

/// Model identifier reported for moderation refusals (no model was called).
pub const MODERATION_MODEL_ID: &str = "moderation";

/// Fixed refusal for blocked turns.
pub const REFUSAL_MESSAGE: &str = "I can't help with that. Please ask a question related to your \
subject (e.g. math, physics, chemistry, history, or writing) and I'll be glad to explain or give practice.";

/// Graceful-degradation message when the backend stays unreachable.
///
/// Must read differently from both the refusal and the stub placeholder.
pub const DEGRADED_MESSAGE: &str = "The tutor is temporarily unavailable. Please send your \
question again in a moment.";

/// Shown when the backend rejects the call outright (bad key, bad model name).
pub const MISCONFIGURED_MESSAGE: &str = "The tutor backend is misconfigured. An operator has been \
notified; please try again later.";

/// Browser origins allowed by default (the Vite dev server ports).
pub const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://127.0.0.1:5173",
    "http://localhost:5174",
    "http://127.0.0.1:5174",
];
