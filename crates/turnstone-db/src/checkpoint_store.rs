use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use turnstone_common::{ConversationState, Error, Result, TurnPhase};

/// A durable snapshot of conversation state at a step boundary.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub thread_id: String,
    pub step: i64,
    pub phase: TurnPhase,
    pub state: ConversationState,
    pub created_at: DateTime<Utc>,
}

/// Step listing for audit, without the full state payload.
#[derive(Debug, Clone)]
pub struct CheckpointSummary {
    pub step: i64,
    pub phase: TurnPhase,
    pub created_at: DateTime<Utc>,
}

/// Durable record of conversation-turn state, keyed by thread id.
///
/// `save` appends a new snapshot with a monotonically increasing step;
/// checkpoints are never mutated in place. `load` returns the latest
/// snapshot so a turn can resume after a restart. Both must be safe to
/// retry.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Persist a snapshot, creating the thread on first write. Returns the
    /// assigned step number.
    async fn save(
        &self,
        thread_id: &str,
        phase: TurnPhase,
        state: &ConversationState,
    ) -> Result<i64>;

    /// Delete a thread and all of its checkpoints. Returns whether the
    /// thread existed.
    async fn delete_thread(&self, thread_id: &str) -> Result<bool>;

    /// List checkpoint steps for a thread in ascending order.
    async fn history(&self, thread_id: &str) -> Result<Vec<CheckpointSummary>>;
}

/// SQLite-backed checkpoint store.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening checkpoint store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS threads (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS checkpoints (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                step INTEGER NOT NULL,
                phase TEXT NOT NULL,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(thread_id, step)
            );

            CREATE INDEX IF NOT EXISTS idx_checkpoints_thread
                ON checkpoints(thread_id, step);",
        )
        .map_err(|e| Error::Database(format!("migration failed: {e}")))
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT step, phase, state, created_at
                 FROM checkpoints
                 WHERE thread_id = ?1
                 ORDER BY step DESC
                 LIMIT 1",
            )
            .map_err(|e| Error::Database(format!("failed to prepare load query: {e}")))?;

        let row = stmt
            .query_row(params![thread_id], |row| {
                let step: i64 = row.get(0)?;
                let phase_raw: String = row.get(1)?;
                let state_raw: String = row.get(2)?;
                let created_raw: String = row.get(3)?;
                Ok((step, phase_raw, state_raw, created_raw))
            })
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(Error::Database(format!("failed to load checkpoint: {other}"))),
            })?;

        let Some((step, phase_raw, state_raw, created_raw)) = row else {
            return Ok(None);
        };

        let phase = parse_phase(&phase_raw)?;
        let state: ConversationState = serde_json::from_str(&state_raw)
            .map_err(|e| Error::Database(format!("corrupt checkpoint state: {e}")))?;

        debug!(thread_id, step, "loaded checkpoint");
        Ok(Some(Checkpoint {
            thread_id: thread_id.to_string(),
            step,
            phase,
            state,
            created_at: parse_timestamp(&created_raw),
        }))
    }

    async fn save(
        &self,
        thread_id: &str,
        phase: TurnPhase,
        state: &ConversationState,
    ) -> Result<i64> {
        let state_json = serde_json::to_string(state)
            .map_err(|e| Error::Database(format!("failed to serialize state: {e}")))?;

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO threads (id) VALUES (?1)",
            params![thread_id],
        )
        .map_err(|e| Error::Database(format!("failed to upsert thread: {e}")))?;

        let checkpoint_id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO checkpoints (id, thread_id, step, phase, state)
             SELECT ?1, ?2, COALESCE(MAX(step) + 1, 0), ?3, ?4
             FROM checkpoints WHERE thread_id = ?2",
            params![checkpoint_id, thread_id, phase_name(phase), state_json],
        )
        .map_err(|e| Error::Database(format!("failed to append checkpoint: {e}")))?;

        let step: i64 = conn
            .query_row(
                "SELECT step FROM checkpoints WHERE id = ?1",
                params![checkpoint_id],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(format!("failed to read back step: {e}")))?;

        debug!(thread_id, step, phase = phase_name(phase), "saved checkpoint");
        Ok(step)
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let rows = conn
            .execute("DELETE FROM threads WHERE id = ?1", params![thread_id])
            .map_err(|e| Error::Database(format!("failed to delete thread: {e}")))?;
        Ok(rows > 0)
    }

    async fn history(&self, thread_id: &str) -> Result<Vec<CheckpointSummary>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT step, phase, created_at
                 FROM checkpoints
                 WHERE thread_id = ?1
                 ORDER BY step ASC",
            )
            .map_err(|e| Error::Database(format!("failed to prepare history query: {e}")))?;

        let rows = stmt
            .query_map(params![thread_id], |row| {
                let step: i64 = row.get(0)?;
                let phase_raw: String = row.get(1)?;
                let created_raw: String = row.get(2)?;
                Ok((step, phase_raw, created_raw))
            })
            .map_err(|e| Error::Database(format!("failed to load history: {e}")))?;

        let mut summaries = Vec::new();
        for row in rows {
            let (step, phase_raw, created_raw) =
                row.map_err(|e| Error::Database(format!("failed to read history row: {e}")))?;
            summaries.push(CheckpointSummary {
                step,
                phase: parse_phase(&phase_raw)?,
                created_at: parse_timestamp(&created_raw),
            });
        }
        Ok(summaries)
    }
}

fn phase_name(phase: TurnPhase) -> &'static str {
    match phase {
        TurnPhase::AwaitingModel => "awaiting_model",
        TurnPhase::AwaitingTool => "awaiting_tool",
        TurnPhase::Done => "done",
    }
}

fn parse_phase(raw: &str) -> Result<TurnPhase> {
    match raw {
        "awaiting_model" => Ok(TurnPhase::AwaitingModel),
        "awaiting_tool" => Ok(TurnPhase::AwaitingTool),
        "done" => Ok(TurnPhase::Done),
        other => Err(Error::Database(format!("unknown checkpoint phase '{other}'"))),
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    // SQLite datetime('now') emits "YYYY-MM-DD HH:MM:SS" in UTC.
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("failed to parse timestamp '{value}': {e}, falling back to now");
            Utc::now()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnstone_common::Message;

    fn sample_state(messages: &[&str]) -> ConversationState {
        let mut state = ConversationState::default();
        for (i, text) in messages.iter().enumerate() {
            if i % 2 == 0 {
                state.push(Message::user(*text));
            } else {
                state.push(Message::assistant(*text));
            }
        }
        state
    }

    #[tokio::test]
    async fn load_missing_thread_returns_none() {
        let store = SqliteCheckpointStore::in_memory().unwrap();
        assert!(store.load("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_returns_latest_snapshot() {
        let store = SqliteCheckpointStore::in_memory().unwrap();

        let first = sample_state(&["hi"]);
        let step0 = store
            .save("thread-1", TurnPhase::AwaitingModel, &first)
            .await
            .unwrap();
        assert_eq!(step0, 0);

        let second = sample_state(&["hi", "hello"]);
        let step1 = store.save("thread-1", TurnPhase::Done, &second).await.unwrap();
        assert_eq!(step1, 1);

        let loaded = store.load("thread-1").await.unwrap().unwrap();
        assert_eq!(loaded.step, 1);
        assert_eq!(loaded.phase, TurnPhase::Done);
        assert_eq!(loaded.state.messages.len(), 2);
        assert_eq!(loaded.state.messages[1].content, "hello");
    }

    #[tokio::test]
    async fn steps_are_monotonic_per_thread() {
        let store = SqliteCheckpointStore::in_memory().unwrap();
        let state = sample_state(&["hi"]);

        for expected in 0..4 {
            let step = store
                .save("thread-a", TurnPhase::AwaitingModel, &state)
                .await
                .unwrap();
            assert_eq!(step, expected);
        }
        // Another thread gets its own sequence.
        let step = store
            .save("thread-b", TurnPhase::AwaitingModel, &state)
            .await
            .unwrap();
        assert_eq!(step, 0);
    }

    #[tokio::test]
    async fn history_lists_phases_in_order() {
        let store = SqliteCheckpointStore::in_memory().unwrap();
        let state = sample_state(&["hi"]);

        store.save("t", TurnPhase::AwaitingModel, &state).await.unwrap();
        store.save("t", TurnPhase::AwaitingTool, &state).await.unwrap();
        store.save("t", TurnPhase::Done, &state).await.unwrap();

        let history = store.history("t").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].phase, TurnPhase::AwaitingModel);
        assert_eq!(history[1].phase, TurnPhase::AwaitingTool);
        assert_eq!(history[2].phase, TurnPhase::Done);
    }

    #[tokio::test]
    async fn delete_thread_cascades_to_checkpoints() {
        let store = SqliteCheckpointStore::in_memory().unwrap();
        let state = sample_state(&["hi"]);
        store.save("t", TurnPhase::Done, &state).await.unwrap();

        assert!(store.delete_thread("t").await.unwrap());
        assert!(store.load("t").await.unwrap().is_none());
        assert!(store.history("t").await.unwrap().is_empty());
        // Second delete reports the thread as gone.
        assert!(!store.delete_thread("t").await.unwrap());
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.db");

        {
            let store = SqliteCheckpointStore::open(&path).unwrap();
            let state = sample_state(&["remember me"]);
            store.save("t", TurnPhase::Done, &state).await.unwrap();
        }

        let store = SqliteCheckpointStore::open(&path).unwrap();
        let loaded = store.load("t").await.unwrap().unwrap();
        assert_eq!(loaded.state.messages[0].content, "remember me");
    }
}
