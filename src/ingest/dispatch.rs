use serde::{Deserialize, Serialize};

use super::orchestrator::IngestSettings;
use crate::feed::{FeedFormat, FeedItem, FeedMetadata, FeedSource};
use crate::storage::{FailedEntry, OutboundEntry, QueueClient, MAX_DELAY_SECONDS, SEND_BATCH_LIMIT};

/// Recovery message tag for entries the item queue rejected.
pub const ITEM_SEND_FAILURE: &str = "ITEM_QUEUE_SEND_FAILURE";

/// Body of one outbound item message, as read by the completion worker.
#[derive(Debug, Serialize)]
pub struct ItemMessage<'a> {
    pub source: &'a str,
    #[serde(rename = "type")]
    pub format: FeedFormat,
    pub item: &'a FeedItem,
    pub feed: &'a FeedMetadata,
}

/// Body of a recovery-path message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: FailedEntry,
}

impl RecoveryMessage {
    pub fn item_send_failure(data: FailedEntry) -> Self {
        Self {
            kind: ITEM_SEND_FAILURE.to_string(),
            data,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Messages the item queue accepted
    pub sent: usize,
    /// Entries that did not reach the item queue
    pub failed: Vec<FailedEntry>,
    /// Failed entries whose recovery message was not accepted either
    pub unrecovered: usize,
}

/// Delivery delay for the item at `position` within send batch `batch`.
///
/// `min(900, batch * unit + (position + 1) * unit)` seconds.
pub fn dispatch_delay(batch: usize, position: usize, unit: u32) -> u32 {
    let units = (batch as u64)
        .saturating_add(position as u64)
        .saturating_add(1);
    units
        .saturating_mul(u64::from(unit))
        .min(u64::from(MAX_DELAY_SECONDS)) as u32
}

/// Sends one message per new item to the item queue.
///
/// Items go out in feed order, [`SEND_BATCH_LIMIT`] per batch. Anything
/// the queue rejects, per entry or as a whole batch, is logged and
/// forwarded to the dead-letter queue. Never fails the caller.
pub async fn dispatch_new_items<Q: QueueClient>(
    queue: &Q,
    settings: &IngestSettings,
    source: &FeedSource,
    feed: &FeedMetadata,
    items: &[&FeedItem],
) -> DispatchReport {
    let mut report = DispatchReport::default();

    for (batch_index, batch) in items.chunks(SEND_BATCH_LIMIT).enumerate() {
        let mut entries = Vec::with_capacity(batch.len());
        let mut failed = Vec::new();

        for (position, item) in batch.iter().enumerate() {
            let id = format!("{}-{}", batch_index, position);
            let message = ItemMessage {
                source: &source.url,
                format: source.format,
                item,
                feed,
            };
            match serde_json::to_string(&message) {
                Ok(body) => entries.push(OutboundEntry {
                    id,
                    body,
                    delay_seconds: dispatch_delay(batch_index, position, settings.item_delay_seconds),
                }),
                Err(e) => failed.push(FailedEntry {
                    id,
                    code: "SerializationError".to_string(),
                    sender_fault: true,
                    message: Some(e.to_string()),
                }),
            }
        }

        if !entries.is_empty() {
            match queue.send_batch(&settings.item_queue_url, &entries).await {
                Ok(outcome) => {
                    report.sent += entries.len().saturating_sub(outcome.failed.len());
                    failed.extend(outcome.failed);
                }
                Err(e) => {
                    tracing::error!(source = %source.url, error = %e, count = entries.len(), "Item batch send failed");
                    failed.extend(entries.iter().map(|entry| FailedEntry {
                        id: entry.id.clone(),
                        code: "SendBatchError".to_string(),
                        sender_fault: false,
                        message: Some(e.to_string()),
                    }));
                }
            }
        }

        if failed.is_empty() {
            continue;
        }

        for entry in &failed {
            tracing::error!(
                source = %source.url,
                entry = %serde_json::to_string(entry).unwrap_or_default(),
                "Failed to send item message"
            );
        }
        report.unrecovered += forward_to_recovery(queue, settings, &failed).await;
        report.failed.extend(failed);
    }

    report
}

/// Sends one recovery message per failed entry. Returns how many were not accepted.
async fn forward_to_recovery<Q: QueueClient>(
    queue: &Q,
    settings: &IngestSettings,
    failed: &[FailedEntry],
) -> usize {
    let mut unrecovered = 0;

    for chunk in failed.chunks(SEND_BATCH_LIMIT) {
        let mut entries = Vec::with_capacity(chunk.len());
        for (index, entry) in chunk.iter().enumerate() {
            match serde_json::to_string(&RecoveryMessage::item_send_failure(entry.clone())) {
                Ok(body) => entries.push(OutboundEntry {
                    id: index.to_string(),
                    body,
                    delay_seconds: 0,
                }),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to encode recovery message");
                    unrecovered += 1;
                }
            }
        }

        match queue
            .send_batch(&settings.dead_letter_queue_url, &entries)
            .await
        {
            Ok(outcome) => {
                for rejected in &outcome.failed {
                    tracing::error!(
                        entry = %serde_json::to_string(rejected).unwrap_or_default(),
                        "Recovery message rejected"
                    );
                }
                unrecovered += outcome.failed.len();
            }
            Err(e) => {
                tracing::error!(error = %e, count = entries.len(), "Recovery batch send failed");
                unrecovered += entries.len();
            }
        }
    }

    unrecovered
}
