//! The ingestion pipeline.
//!
//! One inbound task names one feed source. [`Ingestor::process_batch`] takes
//! each task through:
//!
//! 1. [`task`] - decode the body and validate the type tag
//! 2. fetch and normalize (see [`crate::feed`])
//! 3. [`diff`] - split live items against the source's dedup records
//! 4. [`reconcile`] - delete stale records with bounded retries
//! 5. [`dispatch`] - queue one delayed message per new item
//! 6. retire the task from the feed queue
//!
//! Steps 4 and 5 never fail a task. A batch reports at most one
//! [`BatchError`], raised after every task was attempted.

pub mod diff;
pub mod dispatch;
pub mod orchestrator;
pub mod reconcile;
pub mod task;

pub use diff::{diff_items, load_persisted_ids, Diff};
pub use dispatch::{
    dispatch_delay, dispatch_new_items, DispatchReport, ItemMessage, RecoveryMessage,
    ITEM_SEND_FAILURE,
};
pub use orchestrator::{BatchError, IngestSettings, Ingestor, TaskError, TaskReport};
pub use reconcile::{purge_stale_ids, Backoff, ReconcileReport, Sleeper, TokioSleeper};
pub use task::FeedTask;
