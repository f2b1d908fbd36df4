use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::StoreError;

// ============================================================================
// Database
// ============================================================================

/// Shared SQLite handle backing both the dedup-record store and the queues.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// `path` may be `:memory:` for an in-process database shared by every
    /// connection in the pool.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Busy` if the file is locked by another writer,
    /// `StoreError::Migration` if the schema could not be created, and
    /// `StoreError::Database` for other connection failures.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks to release before returning SQLITE_BUSY.
        // Using pragma() ensures all connections in the pool inherit this setting.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StoreError::from_sqlx)?
            .pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;
        let db = Self { pool };
        db.migrate()
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        tracing::debug!(path = %path, "Database opened");
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All migrations use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Dedup records: one row per (source, item id) already dispatched
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS seen_items (
                source TEXT NOT NULL,
                id TEXT NOT NULL,
                recorded_at INTEGER NOT NULL,
                PRIMARY KEY (source, id)
            ) WITHOUT ROWID
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Queue messages, addressed by queue_url
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue_messages (
                seq INTEGER PRIMARY KEY,
                queue_url TEXT NOT NULL,
                body TEXT NOT NULL,
                visible_at INTEGER NOT NULL,
                receive_count INTEGER NOT NULL DEFAULT 0,
                receipt_handle TEXT UNIQUE
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Covers receive_batch: WHERE queue_url = ? AND visible_at <= ? ORDER BY seq
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_queue_visible ON queue_messages(queue_url, visible_at, seq)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
