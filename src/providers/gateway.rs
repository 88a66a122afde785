// Provider gateway: one backend, two calling conventions
//
// `complete` buffers the whole reply; `stream` runs a cancellable producer
// task that forwards backend deltas as `StreamSegment`s. Retries and
// deadlines live here so every adapter gets them identically.

use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::{CancellationToken, DropGuard};

use super::error::{GatewayError, ProviderError};
use super::retry::{decide, with_retry, RetryDecision, RetryPolicy};
use super::types::{ChatResult, ErrorKind, ProviderRequest, StreamError, StreamSegment};
use super::ChatBackend;

/// Deadlines and retry policy applied to every backend call
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bound on a buffered call, and on opening a stream
    pub request_timeout: Duration,
    /// Bound on each wait for the next streamed delta
    pub segment_timeout: Duration,
    pub retry: RetryPolicy,
    /// Segments buffered between the producer task and the consumer
    pub stream_buffer: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            segment_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            stream_buffer: 32,
        }
    }
}

/// Uniform access to the single configured backend.
///
/// Cheap to clone; every clone shares the same adapter (and its HTTP pool).
#[derive(Clone)]
pub struct ProviderGateway {
    backend: Arc<dyn ChatBackend>,
    config: GatewayConfig,
}

impl ProviderGateway {
    pub fn new(backend: Arc<dyn ChatBackend>, config: GatewayConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn model(&self) -> &str {
        self.backend.model()
    }

    pub fn is_stub(&self) -> bool {
        self.backend.is_stub()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Buffered call with per-attempt deadline and bounded retries
    pub async fn complete(&self, request: &ProviderRequest) -> Result<ChatResult, GatewayError> {
        let backend = &self.backend;
        let deadline = self.config.request_timeout;

        let reply = with_retry(&self.config.retry, |attempt| async move {
            tracing::debug!(attempt, backend = backend.name(), "Dispatching buffered call");
            match timeout(deadline, backend.complete(request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout),
            }
        })
        .await?;

        Ok(ChatResult::from_backend(reply, self.backend.is_stub()))
    }

    /// Start a streaming call.
    ///
    /// The returned stream owns the producer task: dropping it, or calling
    /// [`SegmentStream::cancel`], stops the task and aborts the backend call.
    pub fn stream(&self, request: ProviderRequest) -> SegmentStream {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(self.config.stream_buffer.max(1));

        tokio::spawn(pump(
            Arc::clone(&self.backend),
            request,
            self.config.clone(),
            cancel.clone(),
            tx,
        ));

        SegmentStream {
            rx,
            cancel: cancel.clone(),
            _guard: cancel.drop_guard(),
            model: self.backend.model().to_string(),
            is_stub: self.backend.is_stub(),
            finished: false,
        }
    }
}

enum AttemptOutcome {
    Finished,
    Cancelled,
    Failed(ProviderError),
}

/// Producer task: retries only until the first delta reaches the consumer
async fn pump(
    backend: Arc<dyn ChatBackend>,
    request: ProviderRequest,
    config: GatewayConfig,
    cancel: CancellationToken,
    tx: mpsc::Sender<StreamSegment>,
) {
    let mut attempt = 0;
    let mut delivered = false;

    loop {
        attempt += 1;

        // Each attempt gets its own token so a failed attempt's adapter task is
        // torn down before the next one starts.
        let attempt_token = cancel.child_token();
        let _attempt_guard = attempt_token.clone().drop_guard();

        let outcome = run_attempt(
            backend.as_ref(),
            &request,
            &config,
            &attempt_token,
            &tx,
            &mut delivered,
        )
        .await;

        let error = match outcome {
            AttemptOutcome::Finished => {
                send_or_cancel(&tx, &cancel, StreamSegment::End).await;
                return;
            }
            AttemptOutcome::Cancelled => {
                tracing::debug!(attempt, "Stream cancelled by consumer");
                return;
            }
            AttemptOutcome::Failed(error) => error,
        };

        let failure = if delivered {
            // Replaying would duplicate text the consumer already has
            tracing::warn!(
                attempt,
                category = error.category(),
                "Stream failed after delivering content: {}",
                error
            );
            if error.is_retryable() {
                GatewayError::UpstreamUnavailable {
                    attempts: attempt,
                    source: error,
                }
            } else {
                crate::metrics::record_backend_fatal(error.category());
                tracing::error!(
                    alert = "backend_misconfigured",
                    category = error.category(),
                    "Backend rejected an in-progress stream"
                );
                GatewayError::Fatal(error)
            }
        } else {
            match decide(&config.retry, attempt, error) {
                RetryDecision::Retry(delay) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = sleep(delay) => continue,
                    }
                }
                RetryDecision::GiveUp(GatewayError::Cancelled) => return,
                RetryDecision::GiveUp(err) => err,
            }
        };

        send_or_cancel(&tx, &cancel, StreamSegment::Error(StreamError::from(&failure))).await;
        return;
    }
}

/// Forward a segment unless the consumer cancels first. A full channel must
/// not keep the producer alive past `cancel()`. Returns whether it was sent.
async fn send_or_cancel(
    tx: &mpsc::Sender<StreamSegment>,
    token: &CancellationToken,
    segment: StreamSegment,
) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        sent = tx.send(segment) => sent.is_ok(),
    }
}

async fn run_attempt(
    backend: &dyn ChatBackend,
    request: &ProviderRequest,
    config: &GatewayConfig,
    token: &CancellationToken,
    tx: &mpsc::Sender<StreamSegment>,
    delivered: &mut bool,
) -> AttemptOutcome {
    let opened = tokio::select! {
        _ = token.cancelled() => return AttemptOutcome::Cancelled,
        opened = timeout(config.request_timeout, backend.stream(request, token.clone())) => opened,
    };

    let mut deltas = match opened {
        Ok(Ok(rx)) => rx,
        Ok(Err(e)) => return AttemptOutcome::Failed(e),
        Err(_) => return AttemptOutcome::Failed(ProviderError::Timeout),
    };

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => return AttemptOutcome::Cancelled,
            next = timeout(config.segment_timeout, deltas.recv()) => next,
        };

        match next {
            Err(_) => return AttemptOutcome::Failed(ProviderError::Timeout),
            Ok(None) => return AttemptOutcome::Finished,
            Ok(Some(Err(e))) => return AttemptOutcome::Failed(e),
            Ok(Some(Ok(text))) => {
                if text.is_empty() {
                    continue;
                }
                if !send_or_cancel(tx, token, StreamSegment::Delta(text)).await {
                    return AttemptOutcome::Cancelled;
                }
                *delivered = true;
            }
        }
    }
}

/// Consumer side of a streaming call.
///
/// Yields `Delta`s followed by exactly one `End` or `Error`, then `None`.
/// Nothing is yielded once [`cancel`](Self::cancel) has been called.
pub struct SegmentStream {
    rx: mpsc::Receiver<StreamSegment>,
    cancel: CancellationToken,
    _guard: DropGuard,
    model: String,
    is_stub: bool,
    finished: bool,
}

impl SegmentStream {
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_stub(&self) -> bool {
        self.is_stub
    }

    /// Stop the producer and abort the backend call
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A token that fires when this stream is cancelled or dropped
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drain the stream into the full reply text
    pub async fn collect_text(mut self) -> Result<String, StreamError> {
        use futures::StreamExt;

        let mut text = String::new();
        while let Some(segment) = self.next().await {
            match segment {
                StreamSegment::Delta(delta) => text.push_str(&delta),
                StreamSegment::End => return Ok(text),
                StreamSegment::Error(e) => return Err(e),
            }
        }
        Err(StreamError {
            kind: ErrorKind::Internal,
            message: "stream cancelled".to_string(),
        })
    }
}

impl Stream for SegmentStream {
    type Item = StreamSegment;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished || this.cancel.is_cancelled() {
            return Poll::Ready(None);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(segment)) => {
                if this.cancel.is_cancelled() {
                    this.finished = true;
                    return Poll::Ready(None);
                }
                if segment.is_terminal() {
                    this.finished = true;
                }
                Poll::Ready(Some(segment))
            }
            Poll::Ready(None) => {
                this.finished = true;
                if this.cancel.is_cancelled() {
                    Poll::Ready(None)
                } else {
                    // Producer vanished without a terminal segment (panicked)
                    Poll::Ready(Some(StreamSegment::Error(StreamError {
                        kind: ErrorKind::Internal,
                        message: "stream ended without a terminal segment".to_string(),
                    })))
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
