use std::time::Duration;
use thiserror::Error;

use super::diff::{diff_items, load_persisted_ids};
use super::dispatch::{dispatch_new_items, DispatchReport};
use super::reconcile::{purge_stale_ids, ReconcileReport, Sleeper, TokioSleeper};
use super::task::FeedTask;
use crate::config::Config;
use crate::feed::{parse_feed, FeedFetcher, FetchError, FormatError};
use crate::storage::{IdentifierStore, QueueClient, QueueError, ReceivedMessage, StoreError};

// ============================================================================
// Settings
// ============================================================================

/// Deployment values the pipeline needs at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    pub feed_queue_url: String,
    pub item_queue_url: String,
    pub dead_letter_queue_url: String,
    /// Unit of the per-item dispatch delay, in seconds
    pub item_delay_seconds: u32,
    /// Wall-clock budget for one `process_batch` call
    pub deadline: Option<Duration>,
}

impl From<&Config> for IngestSettings {
    fn from(config: &Config) -> Self {
        Self {
            feed_queue_url: config.feed_queue_url.clone(),
            item_queue_url: config.item_queue_url.clone(),
            dead_letter_queue_url: config.dead_letter_queue_url.clone(),
            item_delay_seconds: config.item_delay_seconds,
            deadline: (config.invocation_timeout_secs > 0)
                .then(|| Duration::from_secs(config.invocation_timeout_secs)),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Why a task was left on its inbound queue.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Invalid task body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Failed to fetch feed: {0}")]
    Fetch(#[from] FetchError),

    /// The dedup records could not be read, so no diff is possible
    #[error("Failed to load dedup records: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to retire task: {0}")]
    Retire(#[source] QueueError),
}

/// The single failure signal of an invocation.
///
/// Raised after every task was attempted. Retired tasks are gone from the
/// inbound queue; the rest are redelivered.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("{failed} of {total} tasks failed to process")]
    TasksFailed { failed: usize, total: usize },

    #[error("Invocation deadline exceeded after retiring {retired} of {total} tasks")]
    DeadlineExceeded { retired: usize, total: usize },
}

// ============================================================================
// Ingestor
// ============================================================================

/// Summary of one retired task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub message_id: String,
    pub source: String,
    pub new_items: usize,
    pub stale_ids: usize,
    pub reconcile: ReconcileReport,
    pub dispatch: DispatchReport,
}

/// Runs ingestion tasks against injected collaborators.
///
/// Tasks of one batch run one after another, each to completion, so no two
/// pipelines ever touch the same source's dedup records at once.
pub struct Ingestor<F, S, Q, Z = TokioSleeper> {
    fetcher: F,
    store: S,
    queue: Q,
    sleeper: Z,
    settings: IngestSettings,
}

impl<F, S, Q> Ingestor<F, S, Q, TokioSleeper> {
    pub fn new(fetcher: F, store: S, queue: Q, settings: IngestSettings) -> Self {
        Self {
            fetcher,
            store,
            queue,
            sleeper: TokioSleeper,
            settings,
        }
    }
}

impl<F, S, Q, Z> Ingestor<F, S, Q, Z> {
    /// Replaces the timer used between delete retries.
    pub fn with_sleeper<Z2>(self, sleeper: Z2) -> Ingestor<F, S, Q, Z2> {
        Ingestor {
            fetcher: self.fetcher,
            store: self.store,
            queue: self.queue,
            sleeper,
            settings: self.settings,
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }
}

impl<F, S, Q, Z> Ingestor<F, S, Q, Z>
where
    F: FeedFetcher,
    S: IdentifierStore,
    Q: QueueClient,
    Z: Sleeper,
{
    /// Attempts every task, then reports one outcome for the batch.
    ///
    /// # Errors
    ///
    /// `BatchError::TasksFailed` if any task failed, after the others were
    /// still processed. `BatchError::DeadlineExceeded` if the configured
    /// deadline ran out first; tasks not yet retired are abandoned.
    pub async fn process_batch(
        &self,
        tasks: &[ReceivedMessage],
    ) -> Result<Vec<TaskReport>, BatchError> {
        let total = tasks.len();
        let mut reports = Vec::with_capacity(total);

        let failed = match self.settings.deadline {
            Some(deadline) => {
                let outcome =
                    tokio::time::timeout(deadline, self.run_tasks(tasks, &mut reports)).await;
                match outcome {
                    Ok(failed) => failed,
                    Err(_) => {
                        tracing::error!(
                            retired = reports.len(),
                            total,
                            "Invocation deadline exceeded"
                        );
                        return Err(BatchError::DeadlineExceeded {
                            retired: reports.len(),
                            total,
                        });
                    }
                }
            }
            None => self.run_tasks(tasks, &mut reports).await,
        };

        if failed > 0 {
            return Err(BatchError::TasksFailed { failed, total });
        }
        Ok(reports)
    }

    async fn run_tasks(&self, tasks: &[ReceivedMessage], reports: &mut Vec<TaskReport>) -> usize {
        let mut failed = 0;
        for task in tasks {
            match self.process_task(task).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(message_id = %task.message_id, error = %e, "Task failed");
                    failed += 1;
                }
            }
        }
        failed
    }

    /// Runs one task through fetch, normalize, diff, reconcile and dispatch,
    /// then retires it from the feed queue.
    ///
    /// Only the body, the type tag, the fetch, the parse, the dedup-record
    /// read and the retirement itself can fail a task. Cleanup and dispatch
    /// problems are absorbed and show up in the report.
    pub async fn process_task(&self, task: &ReceivedMessage) -> Result<TaskReport, TaskError> {
        let source = FeedTask::from_body(&task.body)?.into_source()?;

        let xml = self.fetcher.fetch(&source.url, &source.headers).await?;
        let (feed, items) = parse_feed(source.format, &xml)?;
        tracing::debug!(source = %source.url, items = items.len(), "Feed normalized");

        let persisted = load_persisted_ids(&self.store, &source.url).await?;
        let diff = diff_items(&items, &persisted);

        let reconcile =
            purge_stale_ids(&self.store, &self.sleeper, &source.url, &diff.old_ids).await;
        let dispatch =
            dispatch_new_items(&self.queue, &self.settings, &source, &feed, &diff.new_items).await;

        self.queue
            .delete_message(&self.settings.feed_queue_url, &task.receipt_handle)
            .await
            .map_err(TaskError::Retire)?;

        tracing::info!(
            source = %source.url,
            new_items = diff.new_items.len(),
            stale_ids = diff.old_ids.len(),
            "Task retired"
        );

        Ok(TaskReport {
            message_id: task.message_id.clone(),
            source: source.url,
            new_items: diff.new_items.len(),
            stale_ids: diff.old_ids.len(),
            reconcile,
            dispatch,
        })
    }
}
