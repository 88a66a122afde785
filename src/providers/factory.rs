// Backend factory
//
// Builds the single adapter the process runs with from the resolved
// backend selection.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use super::anthropic::AnthropicBackend;
use super::openai::OpenAiCompatBackend;
use super::stub::StubBackend;
use super::ChatBackend;
use crate::config::BackendSelection;

/// Create the `ChatBackend` for a resolved [`BackendSelection`]
pub fn create_backend(
    selection: &BackendSelection,
    connect_timeout: Duration,
) -> Result<Arc<dyn ChatBackend>> {
    let backend: Arc<dyn ChatBackend> = match selection {
        BackendSelection::Hosted {
            api_key,
            model,
            base_url,
        } => {
            let mut backend = AnthropicBackend::new(api_key.clone(), model.clone(), connect_timeout)
                .context("Failed to create Anthropic backend")?;
            if let Some(url) = base_url {
                backend = backend.with_base_url(url.clone());
            }
            Arc::new(backend)
        }

        BackendSelection::Local {
            base_url,
            api_key,
            model,
        } => Arc::new(
            OpenAiCompatBackend::new(base_url, api_key.clone(), model.clone(), connect_timeout)
                .context("Failed to create OpenAI-compatible backend")?,
        ),

        BackendSelection::Stub => {
            tracing::warn!("No model backend configured; replies will be stub placeholders");
            Arc::new(StubBackend::new())
        }
    };

    tracing::info!(
        backend = backend.name(),
        model = backend.model(),
        "Model backend selected"
    );
    Ok(backend)
}
