// Configuration structs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::constants::{
    DEFAULT_ANTHROPIC_MODEL, DEFAULT_CORS_ORIGINS, DEFAULT_ENV, DEFAULT_HTTP_ADDR,
    DEFAULT_MAX_TOKENS, DEFAULT_OPENAI_MODEL, DEFAULT_TEMPERATURE,
};
use crate::prompt::PromptBudget;
use crate::providers::{GatewayConfig, RetryPolicy};
use crate::recommend::RecommendationPolicy;
use crate::skills::SkillTrack;
use crate::subjects::SubjectConfig;

/// Fully resolved process configuration.
///
/// Built once at startup by [`super::load_config`] and passed explicitly into
/// constructors; nothing reads it from global state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deployment label ("local", "staging", ...)
    pub env: String,

    /// Enable debug logging for troubleshooting
    pub debug_logging: bool,

    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub gateway: GatewaySettings,
    pub prompt: PromptBudget,
    pub recommendation: RecommendationPolicy,
    pub skills: SkillSettings,
    pub moderation: ModerationSettings,

    /// Extra or overriding subject definitions
    pub subjects: Vec<SubjectConfig>,

    /// Extra or overriding skill tracks
    pub tracks: Vec<SkillTrack>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8000")
    pub bind_address: String,
    /// Allowed browser origins
    pub cors_origins: Vec<String>,
    /// Maximum request body size in bytes
    pub body_limit_bytes: usize,
    /// Requests per second allowed per client IP
    pub rate_limit_per_second: u32,
    /// Burst allowance on top of the steady rate
    pub rate_limit_burst: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_HTTP_ADDR.to_string(),
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
            body_limit_bytes: 1024 * 1024,
            rate_limit_per_second: 5,
            rate_limit_burst: 20,
        }
    }
}

/// Which adapter the process runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Hosted Anthropic Messages API
    Hosted,
    /// OpenAI-compatible server (LM Studio, Ollama, vLLM, ...)
    Local,
    /// Deterministic placeholder
    Stub,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hosted => "hosted",
            Self::Local => "local",
            Self::Stub => "stub",
        }
    }
}

/// Raw backend settings as read from TOML and environment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Explicit choice; inferred from the other fields when absent
    pub kind: Option<BackendKind>,

    pub openai_base_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,

    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub anthropic_base_url: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: None,
            openai_base_url: None,
            openai_api_key: None,
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            anthropic_api_key: None,
            anthropic_model: DEFAULT_ANTHROPIC_MODEL.to_string(),
            anthropic_base_url: None,
        }
    }
}

/// The single adapter chosen for the process lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendSelection {
    Hosted {
        api_key: String,
        model: String,
        base_url: Option<String>,
    },
    Local {
        base_url: String,
        api_key: Option<String>,
        model: String,
    },
    Stub,
}

impl BackendSelection {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Hosted { .. } => BackendKind::Hosted,
            Self::Local { .. } => BackendKind::Local,
            Self::Stub => BackendKind::Stub,
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl BackendConfig {
    /// Resolve the active backend.
    ///
    /// An explicit `kind` wins. Otherwise a local base URL selects the
    /// OpenAI-compatible adapter, an Anthropic key selects the hosted one, and
    /// anything else falls back to the stub.
    pub fn selection(&self) -> anyhow::Result<BackendSelection> {
        let base_url = non_blank(&self.openai_base_url);
        let anthropic_key = non_blank(&self.anthropic_api_key);

        let kind = match self.kind {
            Some(kind) => kind,
            None if base_url.is_some() => BackendKind::Local,
            None if anthropic_key.is_some() => BackendKind::Hosted,
            None => BackendKind::Stub,
        };

        Ok(match kind {
            BackendKind::Local => BackendSelection::Local {
                base_url: base_url.ok_or_else(|| {
                    anyhow::anyhow!("backend kind \"local\" requires OPENAI_BASE_URL")
                })?,
                api_key: non_blank(&self.openai_api_key),
                model: self.openai_model.clone(),
            },
            BackendKind::Hosted => BackendSelection::Hosted {
                api_key: anthropic_key.ok_or_else(|| {
                    anyhow::anyhow!("backend kind \"hosted\" requires ANTHROPIC_API_KEY")
                })?,
                model: self.anthropic_model.clone(),
                base_url: non_blank(&self.anthropic_base_url),
            },
            BackendKind::Stub => BackendSelection::Stub,
        })
    }
}

/// Gateway deadlines, retry policy and request defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub request_timeout_secs: u64,
    pub segment_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub retry: RetryPolicy,
    pub default_max_tokens: u32,
    pub default_temperature: f32,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
            segment_timeout_secs: 30,
            connect_timeout_secs: 10,
            retry: RetryPolicy::default(),
            default_max_tokens: DEFAULT_MAX_TOKENS,
            default_temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl GatewaySettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            segment_timeout: Duration::from_secs(self.segment_timeout_secs.max(1)),
            retry: self.retry.clone(),
            ..GatewayConfig::default()
        }
    }
}

/// Skill event persistence and recording
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillSettings {
    /// SQLite database file; in-memory log when absent
    pub db_path: Option<PathBuf>,
    /// Bounded queue between chat turns and the recorder task
    pub queue_capacity: usize,
    /// Events kept per (user, subject) by the in-memory log
    pub retention_per_user: usize,
    /// Distinct (user, subject) histories kept by the in-memory log
    pub max_histories: usize,
}

impl Default for SkillSettings {
    fn default() -> Self {
        Self {
            db_path: None,
            queue_capacity: 256,
            retention_per_user: 500,
            max_histories: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationSettings {
    /// Additional case-insensitive deny patterns (regex syntax)
    pub extra_patterns: Vec<String>,
}

impl Config {
    /// Check cross-field constraints after all sources are merged
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.bind_address.trim().is_empty() {
            anyhow::bail!("server.bind_address must not be empty");
        }
        if self.gateway.retry.max_attempts == 0 {
            anyhow::bail!("gateway.retry.max_attempts must be at least 1");
        }
        if self.skills.queue_capacity == 0 {
            anyhow::bail!("skills.queue_capacity must be at least 1");
        }
        if self.recommendation.window == 0 {
            anyhow::bail!("recommendation.window must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.recommendation.decay) || self.recommendation.decay == 0.0 {
            anyhow::bail!("recommendation.decay must be in (0, 1]");
        }
        self.backend.selection()?;
        Ok(())
    }

    /// Settings safe to show on the debug endpoint (no secrets)
    pub fn redacted(&self) -> RedactedSettings {
        let selection = self.backend.selection().unwrap_or(BackendSelection::Stub);
        let (base_url, model, api_key_set) = match &selection {
            BackendSelection::Hosted {
                model, base_url, ..
            } => (base_url.clone(), model.clone(), true),
            BackendSelection::Local {
                base_url,
                api_key,
                model,
            } => (
                Some(crate::providers::openai::normalize_base_url(base_url)),
                model.clone(),
                api_key.is_some(),
            ),
            BackendSelection::Stub => (None, crate::config::constants::STUB_MODEL_ID.to_string(), false),
        };
        RedactedSettings {
            env: self.env.clone(),
            backend: selection.kind().as_str().to_string(),
            base_url,
            model,
            api_key_set,
        }
    }

    pub fn env_name(&self) -> &str {
        if self.env.is_empty() {
            DEFAULT_ENV
        } else {
            &self.env
        }
    }
}

/// What `/api/debug/settings` reports
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RedactedSettings {
    pub env: String,
    pub backend: String,
    pub base_url: Option<String>,
    pub model: String,
    pub api_key_set: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selection_defaults_to_stub() {
        let backend = BackendConfig::default();
        assert_eq!(backend.selection().unwrap(), BackendSelection::Stub);
    }

    #[test]
    fn test_base_url_selects_local_over_hosted_key() {
        let backend = BackendConfig {
            openai_base_url: Some("http://localhost:1234/v1".into()),
            anthropic_api_key: Some("sk-ant-test".into()),
            ..BackendConfig::default()
        };
        assert_eq!(backend.selection().unwrap().kind(), BackendKind::Local);
    }

    #[test]
    fn test_anthropic_key_selects_hosted() {
        let backend = BackendConfig {
            anthropic_api_key: Some("sk-ant-test".into()),
            ..BackendConfig::default()
        };
        assert!(matches!(
            backend.selection().unwrap(),
            BackendSelection::Hosted { ref model, .. } if model == DEFAULT_ANTHROPIC_MODEL
        ));
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let backend = BackendConfig {
            openai_base_url: Some("   ".into()),
            ..BackendConfig::default()
        };
        assert_eq!(backend.selection().unwrap(), BackendSelection::Stub);
    }

    #[test]
    fn test_explicit_kind_requires_its_settings() {
        let backend = BackendConfig {
            kind: Some(BackendKind::Hosted),
            ..BackendConfig::default()
        };
        assert!(backend.selection().is_err());

        let backend = BackendConfig {
            kind: Some(BackendKind::Stub),
            openai_base_url: Some("http://localhost:1234".into()),
            ..BackendConfig::default()
        };
        assert_eq!(backend.selection().unwrap(), BackendSelection::Stub);
    }

    #[test]
    fn test_redacted_never_contains_key() {
        let config = Config {
            backend: BackendConfig {
                openai_base_url: Some("http://localhost:1234/v1".into()),
                openai_api_key: Some("super-secret".into()),
                ..BackendConfig::default()
            },
            ..Config::default()
        };
        let redacted = config.redacted();
        assert!(redacted.api_key_set);
        assert_eq!(redacted.backend, "local");
        let json = serde_json::to_string(&redacted).unwrap();
        assert!(!json.contains("super-secret"));
    }

    #[test]
    fn test_defaults_validate() {
        Config::default().validate().unwrap();
        assert_eq!(Config::default().env_name(), "local");
    }
}
