use crate::error::Result;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Local SQLite store for executed queries and generated prompts.
#[derive(Clone)]
pub struct LocalDb {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryHistoryEntry {
    pub id: i64,
    pub session_id: String,
    pub sql: String,
    pub execution_time_ms: i64,
    pub row_count: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PromptSuggestion {
    pub prompt: String,
    pub generated_sql: String,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS query_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        sql TEXT NOT NULL,
        execution_time_ms INTEGER,
        row_count INTEGER,
        success BOOLEAN NOT NULL DEFAULT 1,
        error_message TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS ai_prompts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        prompt TEXT NOT NULL UNIQUE,
        generated_sql TEXT NOT NULL DEFAULT '',
        use_count INTEGER NOT NULL DEFAULT 1,
        last_used TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE INDEX IF NOT EXISTS idx_history_created ON query_history(created_at DESC);
    CREATE INDEX IF NOT EXISTS idx_ai_prompts_use ON ai_prompts(use_count DESC);
";

impl LocalDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        info!("Opened local history at {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn add_history(
        &self,
        session_id: &str,
        sql: &str,
        execution_time_ms: i64,
        row_count: i64,
        success: bool,
        error_message: Option<&str>,
    ) -> Result<()> {
        let db = self.conn.lock().await;
        db.execute(
            "INSERT INTO query_history (session_id, sql, execution_time_ms, row_count, success, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![session_id, sql, execution_time_ms, row_count, success, error_message],
        )?;
        Ok(())
    }

    /// Most recent entries first.
    pub async fn get_history(&self, limit: i64) -> Result<Vec<QueryHistoryEntry>> {
        let db = self.conn.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, session_id, sql, execution_time_ms, row_count, success, error_message, created_at
             FROM query_history
             ORDER BY id DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![limit], |row| {
            Ok(QueryHistoryEntry {
                id: row.get(0)?,
                session_id: row.get(1)?,
                sql: row.get(2)?,
                execution_time_ms: row.get(3)?,
                row_count: row.get(4)?,
                success: row.get(5)?,
                error_message: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub async fn save_ai_prompt(&self, prompt: &str, generated_sql: &str) -> Result<()> {
        let db = self.conn.lock().await;
        db.execute(
            "INSERT INTO ai_prompts (prompt, generated_sql) VALUES (?1, ?2)
             ON CONFLICT(prompt) DO UPDATE SET use_count = use_count + 1, last_used = datetime('now'), generated_sql = ?2",
            rusqlite::params![prompt, generated_sql],
        )?;
        Ok(())
    }

    pub async fn search_ai_prompts(&self, query: &str, limit: i64) -> Result<Vec<PromptSuggestion>> {
        let db = self.conn.lock().await;
        let pattern = format!("%{}%", query);
        let mut stmt = db.prepare(
            "SELECT prompt, generated_sql FROM ai_prompts
             WHERE prompt LIKE ?1
             ORDER BY use_count DESC, last_used DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![pattern, limit], |row| {
            Ok(PromptSuggestion {
                prompt: row.get(0)?,
                generated_sql: row.get(1)?,
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn history_is_returned_newest_first() {
        let db = LocalDb::open_in_memory().unwrap();
        db.add_history("s1", "SELECT 1;", 3, 1, true, None).await.unwrap();
        db.add_history("s1", "SELECT * FROM nope;", 0, 0, false, Some("42P01: missing"))
            .await
            .unwrap();

        let history = db.get_history(10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].sql, "SELECT * FROM nope;");
        assert!(!history[0].success);
        assert_eq!(history[0].error_message.as_deref(), Some("42P01: missing"));
        assert_eq!(history[1].row_count, 1);

        assert_eq!(db.get_history(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn prompts_are_upserted_and_ranked_by_use() {
        let db = LocalDb::open_in_memory().unwrap();
        db.save_ai_prompt("employees in sales", "SELECT 1;").await.unwrap();
        db.save_ai_prompt("employees by salary", "SELECT 2;").await.unwrap();
        db.save_ai_prompt("employees by salary", "SELECT 3;").await.unwrap();

        let found = db.search_ai_prompts("employees", 10).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(
            found[0],
            PromptSuggestion {
                prompt: "employees by salary".into(),
                generated_sql: "SELECT 3;".into(),
            }
        );
        assert!(db.search_ai_prompts("invoices", 10).await.unwrap().is_empty());
    }
}
