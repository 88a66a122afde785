// SQLite-backed skill event log
//
// One connection behind an async mutex, WAL mode so readers don't block the
// recorder's appends.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::event::{SkillEvent, SkillEventType};
use super::log::SkillEventLog;

pub struct SqliteSkillEventLog {
    db: Arc<Mutex<Connection>>,
}

impl SqliteSkillEventLog {
    /// Open (or create) the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // Enable WAL mode for concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        Self::init(conn).map(|log| {
            tracing::info!("Skill event log initialized: {}", path.display());
            log
        })
    }

    /// Private in-memory database (tests, ephemeral runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        let schema = include_str!("schema.sql");
        conn.execute_batch(schema)
            .context("Failed to apply skill event schema")?;
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl SkillEventLog for SqliteSkillEventLog {
    async fn append(&self, event: SkillEvent) -> Result<()> {
        let conn = self.db.lock().await;
        conn.execute(
            "INSERT INTO skill_events (user_id, subject_id, skill_tag, event_type, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &event.user_id,
                &event.subject_id,
                &event.skill_tag,
                event.event_type.as_str(),
                event.occurred_at.timestamp_millis(),
            ],
        )
        .context("Failed to insert skill event")?;
        Ok(())
    }

    async fn recent_window(
        &self,
        user_id: &str,
        subject_id: &str,
        limit: usize,
    ) -> Result<Vec<SkillEvent>> {
        let rows: Vec<(String, String, i64)> = {
            let conn = self.db.lock().await;
            let mut stmt = conn.prepare(
                "SELECT skill_tag, event_type, occurred_at FROM skill_events
                 WHERE user_id = ?1 AND subject_id = ?2
                 ORDER BY occurred_at DESC, id DESC
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(params![user_id, subject_id, limit as i64], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter()
            .map(|(skill_tag, event_type, millis)| {
                let occurred_at = DateTime::from_timestamp_millis(millis)
                    .with_context(|| format!("Invalid timestamp in skill log: {}", millis))?;
                Ok(SkillEvent {
                    user_id: user_id.to_string(),
                    subject_id: subject_id.to_string(),
                    skill_tag,
                    event_type: event_type.parse::<SkillEventType>()?,
                    occurred_at,
                })
            })
            .collect()
    }
}
