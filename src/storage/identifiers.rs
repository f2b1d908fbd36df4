use super::schema::Database;
use super::types::{IdPage, StoreError, DELETE_BATCH_LIMIT};

/// Rows returned per `query_ids` page.
pub const QUERY_PAGE_SIZE: usize = 100;

/// Durable `(source, id)` dedup records.
///
/// This engine reads and deletes records; the completion worker inserts them
/// once an item has been delivered downstream.
#[allow(async_fn_in_trait)]
pub trait IdentifierStore: Send + Sync {
    /// One page of the ids recorded for `source`, in ascending id order,
    /// starting strictly after `start_after`.
    async fn query_ids(&self, source: &str, start_after: Option<&str>)
        -> Result<IdPage, StoreError>;

    /// Deletes up to [`DELETE_BATCH_LIMIT`] ids for `source`.
    ///
    /// Returns the ids the store did not process. A non-empty result is
    /// transient and the caller may retry exactly those ids.
    async fn batch_delete(&self, source: &str, ids: &[String]) -> Result<Vec<String>, StoreError>;

    /// Records `id` as observed for `source`. Recording an existing pair is a no-op.
    async fn put_id(&self, source: &str, id: &str) -> Result<(), StoreError>;
}

impl IdentifierStore for Database {
    async fn query_ids(
        &self,
        source: &str,
        start_after: Option<&str>,
    ) -> Result<IdPage, StoreError> {
        // Fetch one extra row to learn whether another page follows.
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT id FROM seen_items
            WHERE source = ?1 AND (?2 IS NULL OR id > ?2)
            ORDER BY id
            LIMIT ?3
            "#,
        )
        .bind(source)
        .bind(start_after)
        .bind((QUERY_PAGE_SIZE + 1) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        let mut ids: Vec<String> = rows.into_iter().map(|(id,)| id).collect();
        let next = if ids.len() > QUERY_PAGE_SIZE {
            ids.truncate(QUERY_PAGE_SIZE);
            ids.last().cloned()
        } else {
            None
        };

        Ok(IdPage { ids, next })
    }

    async fn batch_delete(&self, source: &str, ids: &[String]) -> Result<Vec<String>, StoreError> {
        if ids.len() > DELETE_BATCH_LIMIT {
            return Err(StoreError::BatchTooLarge {
                len: ids.len(),
                limit: DELETE_BATCH_LIMIT,
            });
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        match delete_all(self, source, ids).await {
            Ok(()) => Ok(Vec::new()),
            // Lock contention leaves the whole batch for the caller to retry
            Err(StoreError::Busy) => {
                tracing::debug!(source = %source, count = ids.len(), "Delete batch throttled");
                Ok(ids.to_vec())
            }
            Err(e) => Err(e),
        }
    }

    async fn put_id(&self, source: &str, id: &str) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT OR IGNORE INTO seen_items (source, id, recorded_at) VALUES (?, ?, ?)")
            .bind(source)
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(())
    }
}

async fn delete_all(db: &Database, source: &str, ids: &[String]) -> Result<(), StoreError> {
    let mut tx = db.pool.begin().await.map_err(StoreError::from_sqlx)?;
    for id in ids {
        sqlx::query("DELETE FROM seen_items WHERE source = ? AND id = ?")
            .bind(source)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from_sqlx)?;
    }
    tx.commit().await.map_err(StoreError::from_sqlx)
}
