// HTTP server
//
// Wires the configured backend, skill tracking and recommendation engine into
// an axum router and serves it until Ctrl-C.

mod error;
mod handlers;
mod middleware;

pub use error::ApiError;
pub use handlers::{ChatResponse, HealthResponse, NextQuestionParams};
pub use middleware::RateLimiter;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Config, RedactedSettings, ServerConfig};
use crate::moderation::ModerationGate;
use crate::orchestrator::{GenerationDefaults, Orchestrator};
use crate::providers::{create_backend, ProviderGateway};
use crate::recommend::RecommendationEngine;
use crate::skills::{
    InMemorySkillEventLog, ProgressionTable, SkillEventLog, SkillExtractor, SkillRecorder,
    SqliteSkillEventLog,
};
use crate::subjects::StaticSubjectCatalog;

/// Shared handler state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub recommendations: Arc<RecommendationEngine>,
    pub settings: Arc<RedactedSettings>,
    pub limiter: RateLimiter,
}

/// Build the full router: `/health`, `/metrics` and the rate-limited `/api` tree
pub fn create_router(state: AppState, server: &ServerConfig) -> Router {
    let api = Router::new()
        .route("/subjects", get(handlers::list_subjects))
        .route("/chat", post(handlers::chat))
        .route("/chat/stream", post(handlers::chat_stream))
        .route("/recommendation/next-question", get(handlers::next_question))
        .route("/debug/settings", get(handlers::debug_settings))
        .route_layer(axum::middleware::from_fn_with_state(
            state.limiter.clone(),
            middleware::rate_limit,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics_endpoint))
        .nest("/api", api)
        .with_state(state)
        .layer(cors_layer(&server.cors_origins))
        .layer(DefaultBodyLimit::max(server.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
}

/// The assembled service, ready to serve
pub struct SubjectChatServer {
    state: AppState,
    server: ServerConfig,
    recorder_task: JoinHandle<()>,
}

impl SubjectChatServer {
    /// Build every component from configuration. Must run inside a tokio
    /// runtime (the skill recorder worker is spawned here).
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let selection = config.backend.selection()?;
        let backend = create_backend(&selection, config.gateway.connect_timeout())?;
        let gateway = ProviderGateway::new(backend, config.gateway.gateway_config());

        let subjects = Arc::new(StaticSubjectCatalog::with_overrides(&config.subjects));
        let tracks = Arc::new(ProgressionTable::with_overrides(&config.tracks));

        let log: Arc<dyn SkillEventLog> = match &config.skills.db_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "Using SQLite skill event log");
                Arc::new(SqliteSkillEventLog::open(path).context("Failed to open skill event log")?)
            }
            None => Arc::new(
                InMemorySkillEventLog::new(config.skills.retention_per_user)
                    .with_max_histories(config.skills.max_histories),
            ),
        };
        let (recorder, recorder_task) = SkillRecorder::spawn(Arc::clone(&log), config.skills.queue_capacity);

        let moderation = ModerationGate::with_extra_patterns(&config.moderation.extra_patterns)?;
        tracing::debug!(rules = moderation.rule_count(), "Moderation gate ready");

        let orchestrator = Orchestrator::new(gateway, subjects)
            .with_moderation(moderation)
            .with_prompt_budget(config.prompt)
            .with_skill_recording(SkillExtractor::new(Arc::clone(&tracks)), recorder)
            .with_defaults(GenerationDefaults {
                max_tokens: config.gateway.default_max_tokens,
                temperature: config.gateway.default_temperature,
            });

        let recommendations = RecommendationEngine::new(log, tracks, config.recommendation.clone());
        let limiter = RateLimiter::new(
            f64::from(config.server.rate_limit_per_second),
            f64::from(config.server.rate_limit_burst),
        );

        Ok(Self {
            state: AppState {
                orchestrator,
                recommendations: Arc::new(recommendations),
                settings: Arc::new(config.redacted()),
                limiter,
            },
            server: config.server.clone(),
            recorder_task,
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone(), &self.server)
    }

    /// Serve until Ctrl-C, then flush queued skill events
    pub async fn serve(self) -> Result<()> {
        let addr: SocketAddr = self
            .server
            .bind_address
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.server.bind_address))?;

        let app = self.router();
        let Self {
            state,
            recorder_task,
            ..
        } = self;

        let limiter = state.limiter.clone();
        let purge = tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(60));
            loop {
                tick.tick().await;
                limiter.purge_idle(Duration::from_secs(600));
            }
        });

        tracing::info!(
            addr = %addr,
            backend = state.orchestrator.gateway().backend_name(),
            model = state.orchestrator.gateway().model(),
            "Starting SubjectChat server"
        );
        if state.orchestrator.gateway().is_stub() {
            tracing::warn!("No model backend configured; replies are stub placeholders");
        }
        drop(state);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        purge.abort();

        // The router (and its recorder handles) is gone; the worker drains and exits
        match tokio::time::timeout(Duration::from_secs(5), recorder_task).await {
            Ok(_) => tracing::info!("Skill events flushed"),
            Err(_) => tracing::warn!("Timed out flushing skill events"),
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
