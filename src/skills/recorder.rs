// Background skill event recorder
//
// Chat turns hand their events to a bounded queue and move on. A single
// worker task drains the queue into the log. When the queue is full the
// event is dropped and counted; the turn never waits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use super::event::SkillEvent;
use super::log::SkillEventLog;
use crate::metrics;

#[derive(Clone)]
pub struct SkillRecorder {
    tx: mpsc::Sender<SkillEvent>,
    dropped: Arc<AtomicU64>,
}

impl SkillRecorder {
    /// Start the worker. It exits once every `SkillRecorder` clone is dropped
    /// and the queue is drained; await the handle to flush on shutdown.
    pub fn spawn(log: Arc<dyn SkillEventLog>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<SkillEvent>(capacity.max(1));

        let worker = tokio::spawn(async move {
            let mut written = 0u64;
            while let Some(event) = rx.recv().await {
                match log.append(event).await {
                    Ok(()) => written += 1,
                    Err(e) => tracing::warn!("Failed to append skill event: {:#}", e),
                }
            }
            tracing::debug!(written, "Skill recorder stopped");
        });

        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            worker,
        )
    }

    /// Queue events without waiting
    pub fn record(&self, events: Vec<SkillEvent>) {
        for event in events {
            match self.tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    metrics::record_dropped_skill_event();
                    tracing::warn!(
                        subject = %event.subject_id,
                        tag = %event.skill_tag,
                        "Skill recorder queue full, dropping event"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!("Skill recorder stopped, dropping event");
                }
            }
        }
    }

    /// Events dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
