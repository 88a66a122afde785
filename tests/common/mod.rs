// Shared test fixtures: a scripted backend with call counters

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use subjectchat::providers::{
    BackendReply, ChatBackend, DeltaReceiver, GatewayConfig, ProviderError, ProviderRequest,
    RetryPolicy,
};

/// What the fake does on one call
#[derive(Debug, Clone)]
pub enum Step {
    /// Succeed; streaming splits the text on spaces (kept attached)
    Reply(String),
    /// Fail before producing anything
    Fail(ProviderError),
    /// Never answer
    Hang,
    /// Stream these deltas, then fail
    PartialThenFail(Vec<String>, ProviderError),
    /// Stream these deltas, then wait until cancelled
    PartialThenHang(Vec<String>),
    /// Keep producing a delta every millisecond until the receiver goes away
    Endless,
}

pub fn reply(text: &str) -> Step {
    Step::Reply(text.to_string())
}

/// Backend that plays a script. Once the script runs out every call replies "ok".
pub struct FakeBackend {
    script: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    aborted: Arc<AtomicBool>,
    last_request: Mutex<Option<ProviderRequest>>,
}

impl FakeBackend {
    pub fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            aborted: Arc::new(AtomicBool::new(false)),
            last_request: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// True once a streaming producer observed cancellation
    pub fn aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.last_request.lock().unwrap().clone()
    }

    fn next_step(&self, request: &ProviderRequest) -> Step {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| reply("ok"))
    }
}

fn words(text: &str) -> Vec<String> {
    text.split_inclusive(' ').map(str::to_string).collect()
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn complete(&self, request: &ProviderRequest) -> Result<BackendReply, ProviderError> {
        match self.next_step(request) {
            Step::Reply(content) => Ok(BackendReply {
                content,
                model: "fake-model".to_string(),
            }),
            Step::Fail(e) | Step::PartialThenFail(_, e) => Err(e),
            Step::Hang | Step::PartialThenHang(_) | Step::Endless => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn stream(
        &self,
        request: &ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<DeltaReceiver, ProviderError> {
        let step = self.next_step(request);
        let (tx, rx) = mpsc::channel(16);
        let aborted = Arc::clone(&self.aborted);

        let (deltas, tail) = match step {
            Step::Fail(e) => return Err(e),
            Step::Endless => {
                // Plain sends, like an HTTP adapter: only a closed receiver stops it
                tokio::spawn(async move {
                    loop {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        if tx.send(Ok("tick ".to_string())).await.is_err() {
                            break;
                        }
                    }
                    aborted.store(true, Ordering::SeqCst);
                });
                return Ok(rx);
            }
            Step::Reply(text) => (words(&text), None),
            Step::Hang => (Vec::new(), Some(None)),
            Step::PartialThenFail(deltas, e) => (deltas, Some(Some(e))),
            Step::PartialThenHang(deltas) => (deltas, Some(None)),
        };

        tokio::spawn(async move {
            for delta in deltas {
                if tx.send(Ok(delta)).await.is_err() {
                    return;
                }
            }
            match tail {
                None => {}
                Some(Some(e)) => {
                    let _ = tx.send(Err(e)).await;
                }
                Some(None) => {
                    cancel.cancelled().await;
                    aborted.store(true, Ordering::SeqCst);
                }
            }
        });
        Ok(rx)
    }

    fn name(&self) -> &str {
        "fake"
    }

    fn model(&self) -> &str {
        "fake-model"
    }
}

/// Gateway settings with short deadlines so paused-clock tests stay readable
pub fn fast_gateway_config() -> GatewayConfig {
    GatewayConfig {
        request_timeout: Duration::from_secs(5),
        segment_timeout: Duration::from_secs(2),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        },
        stream_buffer: 8,
    }
}

/// Poll `check` on the (possibly paused) clock until it holds
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
