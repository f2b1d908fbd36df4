//! In-memory collaborators and fixtures for pipeline tests.
//!
//! Every fake is a cheap clone over shared state, so a test keeps one
//! handle for assertions while the `Ingestor` owns another.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::feed::{FeedFetcher, FeedItem, FetchError};
use crate::ingest::{IngestSettings, Sleeper};
use crate::storage::{
    FailedEntry, IdPage, IdentifierStore, OutboundEntry, QueueClient, QueueError,
    ReceivedMessage, SendBatchOutcome, StoreError,
};

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn test_settings() -> IngestSettings {
    IngestSettings {
        feed_queue_url: "feed-queue".to_string(),
        item_queue_url: "item-queue".to_string(),
        dead_letter_queue_url: "dead-letter-queue".to_string(),
        item_delay_seconds: 1,
        deadline: None,
    }
}

pub fn item_with_guid(guid: &str) -> FeedItem {
    FeedItem {
        guid: Some(guid.to_string()),
        ..Default::default()
    }
}

pub fn item_with_id(id: &str) -> FeedItem {
    FeedItem {
        id: Some(id.to_string()),
        ..Default::default()
    }
}

pub fn envelope(receipt: &str, body: &str) -> ReceivedMessage {
    ReceivedMessage {
        message_id: format!("msg-{}", receipt),
        receipt_handle: receipt.to_string(),
        body: body.to_string(),
    }
}

/// An RSS 2.0 document with one item per guid.
pub fn rss_document(guids: &[&str]) -> String {
    let items: String = guids
        .iter()
        .map(|guid| format!("<item><title>Item {guid}</title><guid>{guid}</guid></item>"))
        .collect();
    format!(
        r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Test</title>{}</channel></rss>"#,
        items
    )
}

// ============================================================================
// Fetcher
// ============================================================================

#[derive(Default)]
struct FetcherState {
    responses: HashMap<String, String>,
    requests: Vec<(String, HashMap<String, String>)>,
    latency: Option<Duration>,
}

/// Serves canned bodies by URL; unknown URLs answer 404.
#[derive(Clone, Default)]
pub struct FakeFetcher {
    state: Arc<Mutex<FetcherState>>,
}

impl FakeFetcher {
    pub fn respond(&self, url: &str, body: &str) {
        lock(&self.state)
            .responses
            .insert(url.to_string(), body.to_string());
    }

    /// Every fetch sleeps this long on the tokio timer first.
    pub fn set_latency(&self, latency: Duration) {
        lock(&self.state).latency = Some(latency);
    }

    pub fn requests(&self) -> Vec<(String, HashMap<String, String>)> {
        lock(&self.state).requests.clone()
    }
}

impl FeedFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, headers: &HashMap<String, String>) -> Result<String, FetchError> {
        let latency = {
            let mut state = lock(&self.state);
            state.requests.push((url.to_string(), headers.clone()));
            state.latency
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        lock(&self.state)
            .responses
            .get(url)
            .cloned()
            .ok_or(FetchError::HttpStatus(404))
    }
}

// ============================================================================
// Identifier store
// ============================================================================

#[derive(Default)]
struct StoreState {
    ids: Vec<String>,
    pages: VecDeque<IdPage>,
    query_cursors: Vec<Option<String>>,
    delete_calls: Vec<Vec<String>>,
    unprocessed: VecDeque<Vec<String>>,
    stuck: HashSet<String>,
    fail_queries: bool,
    fail_deletes: bool,
}

/// Dedup records for a single source, with scriptable failures.
#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<StoreState>>,
}

impl FakeStore {
    pub fn with_ids(ids: &[&str]) -> Self {
        let store = Self::default();
        lock(&store.state).ids = ids.iter().map(|id| id.to_string()).collect();
        store
    }

    /// Queued pages are returned by `query_ids` ahead of the stored ids.
    pub fn push_page(&self, page: IdPage) {
        lock(&self.state).pages.push_back(page);
    }

    /// The next `batch_delete` reports these ids as unprocessed.
    pub fn push_unprocessed(&self, ids: Vec<String>) {
        lock(&self.state).unprocessed.push_back(ids);
    }

    /// These ids are reported unprocessed on every delete.
    pub fn set_stuck(&self, ids: &[&str]) {
        lock(&self.state).stuck = ids.iter().map(|id| id.to_string()).collect();
    }

    pub fn fail_queries(&self) {
        lock(&self.state).fail_queries = true;
    }

    pub fn fail_deletes(&self) {
        lock(&self.state).fail_deletes = true;
    }

    pub fn query_cursors(&self) -> Vec<Option<String>> {
        lock(&self.state).query_cursors.clone()
    }

    pub fn delete_calls(&self) -> Vec<Vec<String>> {
        lock(&self.state).delete_calls.clone()
    }

    pub fn ids(&self) -> Vec<String> {
        lock(&self.state).ids.clone()
    }
}

impl IdentifierStore for FakeStore {
    async fn query_ids(
        &self,
        _source: &str,
        start_after: Option<&str>,
    ) -> Result<IdPage, StoreError> {
        let mut state = lock(&self.state);
        state.query_cursors.push(start_after.map(str::to_string));
        if state.fail_queries {
            return Err(StoreError::Busy);
        }
        if let Some(page) = state.pages.pop_front() {
            return Ok(page);
        }
        Ok(IdPage {
            ids: state.ids.clone(),
            next: None,
        })
    }

    async fn batch_delete(&self, _source: &str, ids: &[String]) -> Result<Vec<String>, StoreError> {
        let mut state = lock(&self.state);
        state.delete_calls.push(ids.to_vec());
        if state.fail_deletes {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        let mut unprocessed = state.unprocessed.pop_front().unwrap_or_default();
        for id in ids {
            if state.stuck.contains(id) && !unprocessed.contains(id) {
                unprocessed.push(id.clone());
            }
        }
        state
            .ids
            .retain(|id| !ids.contains(id) || unprocessed.contains(id));
        Ok(unprocessed)
    }

    async fn put_id(&self, _source: &str, id: &str) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        if !state.ids.iter().any(|existing| existing == id) {
            state.ids.push(id.to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Queue
// ============================================================================

#[derive(Default)]
struct QueueState {
    batches: Vec<(String, Vec<OutboundEntry>)>,
    deleted: Vec<(String, String)>,
    reject_marker: Option<String>,
    failing_queues: HashSet<String>,
    fail_deletes: bool,
}

/// Records every call. Batches that "fail" are still recorded.
#[derive(Clone, Default)]
pub struct FakeQueue {
    state: Arc<Mutex<QueueState>>,
}

impl FakeQueue {
    /// Entries whose body contains `marker` are reported failed.
    pub fn reject_bodies_containing(&self, marker: &str) {
        lock(&self.state).reject_marker = Some(marker.to_string());
    }

    /// Every `send_batch` to `queue_url` errors as a whole.
    pub fn fail_sends_to(&self, queue_url: &str) {
        lock(&self.state)
            .failing_queues
            .insert(queue_url.to_string());
    }

    pub fn fail_deletes(&self) {
        lock(&self.state).fail_deletes = true;
    }

    pub fn all_batches(&self) -> Vec<(String, Vec<OutboundEntry>)> {
        lock(&self.state).batches.clone()
    }

    pub fn batches_to(&self, queue_url: &str) -> Vec<Vec<OutboundEntry>> {
        lock(&self.state)
            .batches
            .iter()
            .filter(|(url, _)| url == queue_url)
            .map(|(_, entries)| entries.clone())
            .collect()
    }

    /// Entries sent to `queue_url` that the queue accepted.
    pub fn sent_to(&self, queue_url: &str) -> Vec<OutboundEntry> {
        let state = lock(&self.state);
        if state.failing_queues.contains(queue_url) {
            return Vec::new();
        }
        state
            .batches
            .iter()
            .filter(|(url, _)| url == queue_url)
            .flat_map(|(_, entries)| entries.iter())
            .filter(|entry| !is_rejected(&state, entry))
            .cloned()
            .collect()
    }

    pub fn deleted(&self) -> Vec<(String, String)> {
        lock(&self.state).deleted.clone()
    }
}

fn is_rejected(state: &QueueState, entry: &OutboundEntry) -> bool {
    state
        .reject_marker
        .as_ref()
        .is_some_and(|marker| entry.body.contains(marker.as_str()))
}

impl QueueClient for FakeQueue {
    async fn send_batch(
        &self,
        queue_url: &str,
        entries: &[OutboundEntry],
    ) -> Result<SendBatchOutcome, QueueError> {
        let mut state = lock(&self.state);
        state
            .batches
            .push((queue_url.to_string(), entries.to_vec()));
        if state.failing_queues.contains(queue_url) {
            return Err(QueueError::Database(sqlx::Error::PoolTimedOut));
        }

        let failed = entries
            .iter()
            .filter(|entry| is_rejected(&state, entry))
            .map(|entry| FailedEntry {
                id: entry.id.clone(),
                code: "NEEDS_MORE_COWBELL".to_string(),
                sender_fault: true,
                message: Some("Oopsie".to_string()),
            })
            .collect();
        Ok(SendBatchOutcome { failed })
    }

    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<(), QueueError> {
        let mut state = lock(&self.state);
        if state.fail_deletes {
            return Err(QueueError::UnknownReceipt(receipt_handle.to_string()));
        }
        state
            .deleted
            .push((queue_url.to_string(), receipt_handle.to_string()));
        Ok(())
    }
}

// ============================================================================
// Sleeper
// ============================================================================

/// Records requested waits without sleeping.
#[derive(Clone, Default)]
pub struct RecordingSleeper {
    waits: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<Duration> {
        lock(&self.waits).clone()
    }
}

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.waits).push(duration);
    }
}
