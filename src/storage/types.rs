use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum entries in one dedup-record delete batch.
pub const DELETE_BATCH_LIMIT: usize = 10;

/// Maximum entries in one queue send batch.
pub const SEND_BATCH_LIMIT: usize = 10;

/// Longest delivery delay a queue accepts, in seconds.
pub const MAX_DELAY_SECONDS: u32 = 900;

// ============================================================================
// Error Types
// ============================================================================

/// Errors from the dedup-record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is throttling or locked; the request may succeed later
    #[error("Store is busy, retry later")]
    Busy,

    /// More entries than a single batch may carry
    #[error("Batch of {len} entries exceeds the limit of {limit}")]
    BatchTooLarge { len: usize, limit: usize },

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Classify a sqlx error, mapping lock contention to [`StoreError::Busy`].
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
        {
            return StoreError::Busy;
        }

        StoreError::Database(err)
    }

    /// True when retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Busy)
    }
}

/// Errors from a queue call as a whole. Per-entry rejections are reported
/// through [`SendBatchOutcome::failed`] instead.
#[derive(Debug, Error)]
pub enum QueueError {
    /// More entries than a single batch may carry
    #[error("Batch of {len} entries exceeds the limit of {limit}")]
    BatchTooLarge { len: usize, limit: usize },

    /// No in-flight message has this receipt handle
    #[error("Unknown receipt handle: {0}")]
    UnknownReceipt(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

// ============================================================================
// Store Records
// ============================================================================

/// One page of a paginated identifier query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdPage {
    pub ids: Vec<String>,
    /// Continuation key; `None` once the range is exhausted.
    pub next: Option<String>,
}

// ============================================================================
// Queue Records
// ============================================================================

/// A message to enqueue as part of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEntry {
    /// Unique within its batch; failures are reported against it.
    pub id: String,
    pub body: String,
    pub delay_seconds: u32,
}

/// A batch entry the queue refused, in the broker's reporting shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FailedEntry {
    pub id: String,
    pub code: String,
    pub sender_fault: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of a batch send that reached the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendBatchOutcome {
    pub failed: Vec<FailedEntry>,
}

/// A message handed to a consumer, pending deletion by receipt handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_entry_wire_shape() {
        let entry = FailedEntry {
            id: "mock-failed-id".into(),
            code: "NEEDS_MORE_COWBELL".into(),
            sender_fault: true,
            message: Some("Oopsie".into()),
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            serde_json::json!({
                "Id": "mock-failed-id",
                "Code": "NEEDS_MORE_COWBELL",
                "SenderFault": true,
                "Message": "Oopsie"
            })
        );
    }

    #[test]
    fn test_only_busy_is_transient() {
        assert!(StoreError::Busy.is_transient());
        assert!(!StoreError::Migration("x".into()).is_transient());
        assert!(!StoreError::BatchTooLarge { len: 11, limit: 10 }.is_transient());
    }
}
