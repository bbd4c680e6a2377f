//! SQLite-backed long-term fact store.
//!
//! One table, `facts`, keyed by an autoincrement id so insertion order is
//! recoverable. Facts survive restarts and are injected into the system
//! prompt by the orchestrator.

use async_trait::async_trait;
use parley_core::error::MemoryError;
use parley_core::memory::{FactStore, MAX_FACTS_PER_CHAT};
use parley_core::message::ChatId;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

pub struct SqliteFactStore {
    pool: SqlitePool,
}

impl SqliteFactStore {
    /// Open (or create) the database at `path`.
    ///
    /// Accepts a plain file path or a `sqlite:` URL.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite://{path}")
        };
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!(path, "SQLite fact store initialized");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS facts (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id     TEXT NOT NULL,
                fact        TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("facts table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_facts_chat ON facts(chat_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::MigrationFailed(format!("chat index: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl FactStore for SqliteFactStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn add(&self, chat_id: &ChatId, fact: &str) -> Result<bool, MemoryError> {
        let fact = fact.trim();
        if fact.is_empty() {
            return Ok(false);
        }

        // Count and insert in one transaction so concurrent adds can't
        // overshoot the cap.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("begin: {e}")))?;

        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM facts WHERE chat_id = ?")
            .bind(chat_id.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("count: {e}")))?
            .get("n");

        if count as usize >= MAX_FACTS_PER_CHAT {
            debug!(chat_id = %chat_id, "Fact limit reached");
            return Ok(false);
        }

        sqlx::query("INSERT INTO facts (chat_id, fact) VALUES (?, ?)")
            .bind(chat_id.as_str())
            .bind(fact)
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("insert: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("commit: {e}")))?;

        Ok(true)
    }

    async fn list(&self, chat_id: &ChatId) -> Result<Vec<String>, MemoryError> {
        let rows = sqlx::query("SELECT fact FROM facts WHERE chat_id = ? ORDER BY id")
            .bind(chat_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("list: {e}")))?;

        Ok(rows.iter().map(|row| row.get::<String, _>("fact")).collect())
    }

    async fn count(&self, chat_id: &ChatId) -> Result<usize, MemoryError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM facts WHERE chat_id = ?")
            .bind(chat_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("count: {e}")))?
            .get("n");
        Ok(count as usize)
    }

    async fn clear(&self, chat_id: &ChatId) -> Result<(), MemoryError> {
        sqlx::query("DELETE FROM facts WHERE chat_id = ?")
            .bind(chat_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("clear: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (SqliteFactStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("facts.db");
        let store = SqliteFactStore::new(path.to_str().unwrap()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn add_and_list() {
        let (store, _dir) = test_store().await;
        let chat = ChatId::from(100_i64);
        assert!(store.add(&chat, "User's name is David").await.unwrap());
        assert!(store.add(&chat, "  Prefers metric units  ").await.unwrap());

        let facts = store.list(&chat).await.unwrap();
        assert_eq!(facts, vec!["User's name is David", "Prefers metric units"]);
        assert_eq!(store.count(&chat).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn blank_fact_rejected() {
        let (store, _dir) = test_store().await;
        let chat = ChatId::from(1_i64);
        assert!(!store.add(&chat, " \n ").await.unwrap());
        assert_eq!(store.count(&chat).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cap_enforced() {
        let (store, _dir) = test_store().await;
        let chat = ChatId::from(1_i64);
        for i in 0..MAX_FACTS_PER_CHAT {
            assert!(store.add(&chat, &format!("fact {i}")).await.unwrap());
        }
        assert!(!store.add(&chat, "overflow").await.unwrap());
        assert_eq!(store.count(&chat).await.unwrap(), MAX_FACTS_PER_CHAT);
    }

    #[tokio::test]
    async fn clear_is_per_chat() {
        let (store, _dir) = test_store().await;
        let a = ChatId::from(1_i64);
        let b = ChatId::from(2_i64);
        store.add(&a, "a").await.unwrap();
        store.add(&b, "b").await.unwrap();

        store.clear(&a).await.unwrap();
        assert!(store.list(&a).await.unwrap().is_empty());
        assert_eq!(store.list(&b).await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn facts_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("facts.db");
        let path = path.to_str().unwrap();
        let chat = ChatId::from(5_i64);

        {
            let store = SqliteFactStore::new(path).await.unwrap();
            store.add(&chat, "Bot is called Jarvis").await.unwrap();
            store.pool.close().await;
        }

        let store = SqliteFactStore::new(path).await.unwrap();
        assert_eq!(store.list(&chat).await.unwrap(), vec!["Bot is called Jarvis"]);
    }
}
