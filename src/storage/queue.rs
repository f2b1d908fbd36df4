use std::time::Duration;

use super::schema::Database;
use super::types::{
    FailedEntry, OutboundEntry, QueueError, ReceivedMessage, SendBatchOutcome, MAX_DELAY_SECONDS,
    SEND_BATCH_LIMIT,
};

/// Outbound message queues, addressed by URL.
#[allow(async_fn_in_trait)]
pub trait QueueClient: Send + Sync {
    /// Enqueues up to [`SEND_BATCH_LIMIT`] entries.
    ///
    /// The call can succeed while individual entries are rejected; those are
    /// listed in [`SendBatchOutcome::failed`].
    async fn send_batch(
        &self,
        queue_url: &str,
        entries: &[OutboundEntry],
    ) -> Result<SendBatchOutcome, QueueError>;

    /// Removes a received message for good.
    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError>;
}

/// A message still held by a queue, as seen by [`Database::peek_messages`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub message_id: String,
    pub body: String,
    /// Unix milliseconds at which the message becomes receivable
    pub visible_at: i64,
}

impl QueueClient for Database {
    async fn send_batch(
        &self,
        queue_url: &str,
        entries: &[OutboundEntry],
    ) -> Result<SendBatchOutcome, QueueError> {
        if entries.len() > SEND_BATCH_LIMIT {
            return Err(QueueError::BatchTooLarge {
                len: entries.len(),
                limit: SEND_BATCH_LIMIT,
            });
        }

        let now = chrono::Utc::now().timestamp_millis();
        let mut failed = Vec::new();
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            if entry.delay_seconds > MAX_DELAY_SECONDS {
                failed.push(FailedEntry {
                    id: entry.id.clone(),
                    code: "InvalidParameterValue".to_string(),
                    sender_fault: true,
                    message: Some(format!(
                        "DelaySeconds must be between 0 and {}",
                        MAX_DELAY_SECONDS
                    )),
                });
                continue;
            }

            let visible_at = now + i64::from(entry.delay_seconds) * 1000;
            sqlx::query("INSERT INTO queue_messages (queue_url, body, visible_at) VALUES (?, ?, ?)")
                .bind(queue_url)
                .bind(&entry.body)
                .bind(visible_at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(SendBatchOutcome { failed })
    }

    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError> {
        let result =
            sqlx::query("DELETE FROM queue_messages WHERE queue_url = ? AND receipt_handle = ?")
                .bind(queue_url)
                .bind(receipt_handle)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(QueueError::UnknownReceipt(receipt_handle.to_string()));
        }
        Ok(())
    }
}

impl Database {
    // ========================================================================
    // Queue Consumer Operations
    // ========================================================================

    /// Receives up to `max` visible messages from `queue_url`, oldest first.
    ///
    /// Each received message gets a fresh receipt handle and stays hidden for
    /// `visibility`; unless deleted in that window it is delivered again.
    pub async fn receive_batch(
        &self,
        queue_url: &str,
        max: usize,
        visibility: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let now = chrono::Utc::now().timestamp_millis();
        let hidden_until = now.saturating_add(visibility.as_millis() as i64);
        let mut tx = self.pool.begin().await?;

        let rows: Vec<(i64, String, i64)> = sqlx::query_as(
            r#"
            SELECT seq, body, receive_count FROM queue_messages
            WHERE queue_url = ? AND visible_at <= ?
            ORDER BY seq
            LIMIT ?
            "#,
        )
        .bind(queue_url)
        .bind(now)
        .bind(max as i64)
        .fetch_all(&mut *tx)
        .await?;

        let mut received = Vec::with_capacity(rows.len());
        for (seq, body, receive_count) in rows {
            let receipt_handle = format!("{}-{}", seq, receive_count + 1);
            sqlx::query(
                "UPDATE queue_messages SET visible_at = ?, receive_count = receive_count + 1, receipt_handle = ? WHERE seq = ?",
            )
            .bind(hidden_until)
            .bind(&receipt_handle)
            .bind(seq)
            .execute(&mut *tx)
            .await?;

            received.push(ReceivedMessage {
                message_id: seq.to_string(),
                receipt_handle,
                body,
            });
        }

        tx.commit().await?;

        Ok(received)
    }

    /// Every message held by `queue_url`, visible or not, oldest first.
    pub async fn peek_messages(&self, queue_url: &str) -> Result<Vec<QueuedMessage>, QueueError> {
        let rows: Vec<(i64, String, i64)> = sqlx::query_as(
            "SELECT seq, body, visible_at FROM queue_messages WHERE queue_url = ? ORDER BY seq",
        )
        .bind(queue_url)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(seq, body, visible_at)| QueuedMessage {
                message_id: seq.to_string(),
                body,
                visible_at,
            })
            .collect())
    }
}
