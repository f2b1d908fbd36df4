use std::time::Duration;

use crate::storage::{IdentifierStore, DELETE_BATCH_LIMIT};

/// Wait before the first retry of a partially processed delete batch.
pub const BACKOFF_INITIAL: Duration = Duration::from_millis(50);
/// Cumulative wait a batch may spend in retries.
pub const BACKOFF_CEILING: Duration = Duration::from_millis(1000);

/// Suspends the current task. Injected so retry timing is testable.
#[allow(async_fn_in_trait)]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Bounded exponential backoff.
///
/// Each wait doubles the previous one. A wait is granted only while the
/// cumulative wait stays below [`BACKOFF_CEILING`], which allows waits of
/// 50, 100, 200 and 400ms: five attempts in total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    next: Duration,
    waited: Duration,
    retries: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            next: BACKOFF_INITIAL,
            waited: Duration::ZERO,
            retries: 0,
        }
    }

    /// The wait before the next retry, or `None` once the budget is spent.
    pub fn next_wait(&mut self) -> Option<Duration> {
        if self.waited + self.next >= BACKOFF_CEILING {
            return None;
        }
        let wait = self.next;
        self.waited += wait;
        self.next = wait * 2;
        self.retries += 1;
        Some(wait)
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn waited(&self) -> Duration {
        self.waited
    }
}

/// What a purge achieved. Abandoned ids stay recorded and are picked up
/// again on the source's next run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub deleted: usize,
    pub batches: usize,
    pub abandoned: Vec<String>,
}

/// Deletes the stale dedup records of `source`.
///
/// Ids go to the store in batches of [`DELETE_BATCH_LIMIT`]. Entries a
/// batch leaves unprocessed are retried as-is under a fresh [`Backoff`].
/// Nothing here fails the caller: exhausted retries and store errors are
/// logged and reported as abandoned ids.
pub async fn purge_stale_ids<S, Z>(
    store: &S,
    sleeper: &Z,
    source: &str,
    stale_ids: &[String],
) -> ReconcileReport
where
    S: IdentifierStore,
    Z: Sleeper,
{
    let mut report = ReconcileReport::default();

    for batch in stale_ids.chunks(DELETE_BATCH_LIMIT) {
        report.batches += 1;
        let mut pending = batch.to_vec();
        let mut backoff = Backoff::new();

        loop {
            let unprocessed = match store.batch_delete(source, &pending).await {
                Ok(unprocessed) => unprocessed,
                Err(e) => {
                    tracing::error!(source = %source, error = %e, count = pending.len(), "Failed to delete stale ids");
                    report.abandoned.append(&mut pending);
                    break;
                }
            };

            report.deleted += pending.len().saturating_sub(unprocessed.len());
            if unprocessed.is_empty() {
                break;
            }
            pending = unprocessed;

            match backoff.next_wait() {
                Some(wait) => sleeper.sleep(wait).await,
                None => {
                    tracing::warn!(
                        source = %source,
                        remaining = pending.len(),
                        retries = backoff.retries(),
                        "Giving up on unprocessed stale id deletes"
                    );
                    report.abandoned.append(&mut pending);
                    break;
                }
            }
        }
    }

    report
}
