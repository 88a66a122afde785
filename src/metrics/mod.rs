// Metrics module
// Process-wide Prometheus counters and the `/metrics` text renderer

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

struct Metrics {
    registry: Registry,
    turns: IntCounterVec,
    moderation_blocks: IntCounterVec,
    backend_retries: IntCounterVec,
    backend_fatal: IntCounterVec,
    dropped_skill_events: IntCounter,
}

impl Metrics {
    fn build() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("subjectchat".to_string()), None)?;

        let turns = IntCounterVec::new(
            Opts::new("chat_turns_total", "Chat turns by mode and outcome"),
            &["mode", "outcome"],
        )?;
        let moderation_blocks = IntCounterVec::new(
            Opts::new("moderation_blocks_total", "User turns blocked by moderation"),
            &["category"],
        )?;
        let backend_retries = IntCounterVec::new(
            Opts::new("backend_retries_total", "Backend attempts retried after a transient failure"),
            &["category"],
        )?;
        let backend_fatal = IntCounterVec::new(
            Opts::new(
                "backend_fatal_total",
                "Non-retryable backend failures (likely misconfiguration)",
            ),
            &["category"],
        )?;
        let dropped_skill_events = IntCounter::with_opts(Opts::new(
            "skill_events_dropped_total",
            "Skill events dropped because the recorder queue was full",
        ))?;

        registry.register(Box::new(turns.clone()))?;
        registry.register(Box::new(moderation_blocks.clone()))?;
        registry.register(Box::new(backend_retries.clone()))?;
        registry.register(Box::new(backend_fatal.clone()))?;
        registry.register(Box::new(dropped_skill_events.clone()))?;

        Ok(Self {
            registry,
            turns,
            moderation_blocks,
            backend_retries,
            backend_fatal,
            dropped_skill_events,
        })
    }
}

static METRICS: Lazy<Option<Metrics>> = Lazy::new(|| match Metrics::build() {
    Ok(metrics) => Some(metrics),
    Err(e) => {
        tracing::error!("Failed to register metrics, recording disabled: {}", e);
        None
    }
});

/// Count a finished chat turn. `mode` is "complete" or "stream".
pub fn record_turn(mode: &str, outcome: &str) {
    if let Some(m) = METRICS.as_ref() {
        m.turns.with_label_values(&[mode, outcome]).inc();
    }
}

pub fn record_moderation_block(category: &str) {
    if let Some(m) = METRICS.as_ref() {
        m.moderation_blocks.with_label_values(&[category]).inc();
    }
}

pub fn record_backend_retry(category: &str) {
    if let Some(m) = METRICS.as_ref() {
        m.backend_retries.with_label_values(&[category]).inc();
    }
}

pub fn record_backend_fatal(category: &str) {
    if let Some(m) = METRICS.as_ref() {
        m.backend_fatal.with_label_values(&[category]).inc();
    }
}

pub fn record_dropped_skill_event() {
    if let Some(m) = METRICS.as_ref() {
        m.dropped_skill_events.inc();
    }
}

/// Render all counters in the Prometheus text exposition format
pub fn render() -> String {
    let Some(m) = METRICS.as_ref() else {
        return String::new();
    };
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&m.registry.gather(), &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
