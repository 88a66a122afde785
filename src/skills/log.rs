// Skill event log: trait and in-memory implementation

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use super::event::SkillEvent;

/// Ordered per-(user, subject) store of skill events
#[async_trait]
pub trait SkillEventLog: Send + Sync {
    async fn append(&self, event: SkillEvent) -> Result<()>;

    /// Up to `limit` most recent events, newest first. Events with equal
    /// timestamps come back in reverse append order.
    async fn recent_window(
        &self,
        user_id: &str,
        subject_id: &str,
        limit: usize,
    ) -> Result<Vec<SkillEvent>>;
}

type Key = (String, String);

/// Process-local log with bounded retention per (user, subject).
///
/// The number of histories is bounded too: once `max_histories` is reached,
/// the history written least recently is evicted to make room.
pub struct InMemorySkillEventLog {
    state: RwLock<LogState>,
    retention: usize,
    max_histories: usize,
}

#[derive(Default)]
struct LogState {
    histories: HashMap<Key, History>,
    clock: u64,
}

#[derive(Default)]
struct History {
    events: VecDeque<SkillEvent>,
    last_write: u64,
}

impl InMemorySkillEventLog {
    pub fn new(retention: usize) -> Self {
        Self {
            state: RwLock::new(LogState::default()),
            retention: retention.max(1),
            max_histories: 10_000,
        }
    }

    pub fn with_max_histories(mut self, max_histories: usize) -> Self {
        self.max_histories = max_histories.max(1);
        self
    }

    pub async fn len(&self) -> usize {
        self.state
            .read()
            .await
            .histories
            .values()
            .map(|h| h.events.len())
            .sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn history_count(&self) -> usize {
        self.state.read().await.histories.len()
    }
}

impl Default for InMemorySkillEventLog {
    fn default() -> Self {
        Self::new(500)
    }
}

#[async_trait]
impl SkillEventLog for InMemorySkillEventLog {
    async fn append(&self, event: SkillEvent) -> Result<()> {
        let key = (event.user_id.clone(), event.subject_id.clone());
        let mut state = self.state.write().await;
        state.clock += 1;
        let now = state.clock;

        if !state.histories.contains_key(&key) && state.histories.len() >= self.max_histories {
            let stalest = state
                .histories
                .iter()
                .min_by_key(|(_, h)| h.last_write)
                .map(|(k, _)| k.clone());
            if let Some(stalest) = stalest {
                state.histories.remove(&stalest);
            }
        }

        let history = state.histories.entry(key).or_default();
        history.last_write = now;
        let queue = &mut history.events;

        // Keep the queue sorted by time; late arrivals slot in after equal stamps
        let pos = queue
            .iter()
            .rposition(|e| e.occurred_at <= event.occurred_at)
            .map_or(0, |i| i + 1);
        queue.insert(pos, event);

        while queue.len() > self.retention {
            queue.pop_front();
        }
        Ok(())
    }

    async fn recent_window(
        &self,
        user_id: &str,
        subject_id: &str,
        limit: usize,
    ) -> Result<Vec<SkillEvent>> {
        let state = self.state.read().await;
        let key = (user_id.to_string(), subject_id.to_string());
        Ok(state
            .histories
            .get(&key)
            .map(|h| h.events.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
