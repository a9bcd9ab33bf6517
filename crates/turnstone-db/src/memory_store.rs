use std::path::Path;

use async_trait::async_trait;
use rusqlite::{Connection, params};
use tokio::sync::Mutex;
use tracing::info;
use turnstone_common::{Error, Result};

/// Best-effort long-term memory lookup.
///
/// Callers treat failure as non-fatal and substitute an empty snippet, so
/// implementations are free to be approximate.
#[async_trait]
pub trait MemoryRecall: Send + Sync {
    /// Return a context snippet relevant to `text`, or an empty string.
    async fn query(&self, text: &str) -> Result<String>;
}

/// SQLite keyword-match memory store.
///
/// Stands in for a vector-backed memory service: `remember` stores free
/// text, `query` returns recent entries sharing a keyword with the query.
pub struct KeywordMemoryStore {
    conn: Mutex<Connection>,
}

impl KeywordMemoryStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening memory store at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open memory database: {e}")))?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .map_err(|e| Error::Database(format!("memory migration failed: {e}")))
    }

    pub async fn remember(&self, content: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO memories (id, content) VALUES (?1, ?2)",
            params![uuid::Uuid::new_v4().to_string(), content],
        )
        .map_err(|e| Error::Database(format!("failed to store memory: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl MemoryRecall for KeywordMemoryStore {
    async fn query(&self, text: &str) -> Result<String> {
        // Keywords of 4+ chars; short words match too much.
        let keywords: Vec<String> = text
            .split_whitespace()
            .filter(|w| w.chars().count() >= 4)
            .map(|w| {
                format!(
                    "%{}%",
                    w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase()
                )
            })
            .filter(|p| p.len() > 2)
            .take(8)
            .collect();

        if keywords.is_empty() {
            return Ok(String::new());
        }

        let clauses = vec!["lower(content) LIKE ?"; keywords.len()].join(" OR ");
        let sql = format!(
            "SELECT content FROM memories WHERE {clauses} ORDER BY rowid DESC LIMIT 5"
        );

        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Error::Database(format!("failed to prepare memory query: {e}")))?;

        let rows = stmt
            .query_map(rusqlite::params_from_iter(keywords.iter()), |row| {
                row.get::<_, String>(0)
            })
            .map_err(|e| Error::Database(format!("failed to query memories: {e}")))?;

        let mut snippets = Vec::new();
        for row in rows {
            snippets
                .push(row.map_err(|e| Error::Database(format!("failed to read memory row: {e}")))?);
        }
        Ok(snippets.join("\n- "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recall_matches_stored_keywords() {
        let store = KeywordMemoryStore::in_memory().unwrap();
        store.remember("User prefers Rust over Python").await.unwrap();
        store.remember("User lives in Lisbon").await.unwrap();

        let snippet = store.query("tell me something about Rust").await.unwrap();
        assert!(snippet.contains("prefers Rust"));
        assert!(!snippet.contains("Lisbon"));
    }

    #[tokio::test]
    async fn recall_with_no_match_is_empty() {
        let store = KeywordMemoryStore::in_memory().unwrap();
        store.remember("User prefers Rust").await.unwrap();
        assert_eq!(store.query("weather tomorrow").await.unwrap(), "");
    }

    #[tokio::test]
    async fn short_words_are_ignored() {
        let store = KeywordMemoryStore::in_memory().unwrap();
        store.remember("a b c d").await.unwrap();
        assert_eq!(store.query("a b c").await.unwrap(), "");
    }
}
