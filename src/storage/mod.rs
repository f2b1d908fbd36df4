//! SQLite-backed persistence: dedup records and message queues.
//!
//! Both collaborator traits are implemented directly on [`Database`], so one
//! pool serves the identifier store and every queue URL.

mod identifiers;
mod queue;
mod schema;
mod types;

pub use identifiers::{IdentifierStore, QUERY_PAGE_SIZE};
pub use queue::{QueueClient, QueuedMessage};
pub use schema::Database;
pub use types::{
    FailedEntry, IdPage, OutboundEntry, QueueError, ReceivedMessage, SendBatchOutcome, StoreError,
    DELETE_BATCH_LIMIT, MAX_DELAY_SECONDS, SEND_BATCH_LIMIT,
};
