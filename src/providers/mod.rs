// Model backend support
//
// This module provides an abstraction layer over the model backends
// (hosted Anthropic API, a local OpenAI-compatible server, or the
// deterministic stub) behind a single gateway.

use async_trait::async_trait;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;

pub mod types;

mod error;
mod retry;
pub mod sse;

// Backend implementations
pub mod anthropic;
pub mod openai;
pub mod stub;

pub mod factory;
pub mod gateway;

pub use anthropic::AnthropicBackend;
pub use error::{GatewayError, ProviderError};
pub use factory::create_backend;
pub use gateway::{GatewayConfig, ProviderGateway, SegmentStream};
pub use openai::OpenAiCompatBackend;
pub use retry::{with_retry, RetryPolicy};
pub use stub::StubBackend;
pub use types::{
    BackendReply, ChatMessage, ChatRequest, ChatResult, ErrorKind, ProviderRequest, ReplySource,
    Role, StreamError, StreamSegment,
};

/// Stream of text deltas produced by a backend adapter
pub type DeltaReceiver = Receiver<Result<String, ProviderError>>;

/// Trait for model backends
///
/// Each implementation performs exactly one attempt per call; retries,
/// deadlines and segment framing belong to [`ProviderGateway`]. Implementations
/// are shared across all in-flight turns and must not serialize them.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send the context and wait for the full reply
    async fn complete(&self, request: &ProviderRequest) -> Result<BackendReply, ProviderError>;

    /// Open a streaming call.
    ///
    /// Returns a channel of non-empty text deltas; the channel closes when the
    /// backend finishes. The producing task must stop, and abort the in-flight
    /// backend call, once `cancel` fires or the receiver is dropped.
    async fn stream(
        &self,
        request: &ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<DeltaReceiver, ProviderError>;

    /// Backend name (e.g., "anthropic", "openai-compatible", "stub")
    fn name(&self) -> &str;

    /// Model identifier reported in results
    fn model(&self) -> &str;

    /// True for the placeholder backend
    fn is_stub(&self) -> bool {
        false
    }
}
