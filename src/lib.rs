//! Incremental RSS/Atom ingestion.
//!
//! `feedrelay` fetches a feed, normalizes either XML dialect into one item
//! model, diffs the items against the dedup records kept for the source,
//! deletes records whose items left the feed and queues one delayed
//! message per new item for a downstream completion worker.
//!
//! ```ignore
//! use feedrelay::{config::Config, feed::HttpFetcher, ingest::{IngestSettings, Ingestor}, storage::Database};
//!
//! let mut config = Config::load(path)?;
//! config.apply_env()?;
//! let db = Database::open(&config.database_path).await?;
//! let fetcher = HttpFetcher::from_config(reqwest::Client::new(), &config);
//! let ingestor = Ingestor::new(fetcher, db.clone(), db.clone(), IngestSettings::from(&config));
//!
//! let tasks = db.receive_batch(&config.feed_queue_url, 10, Duration::from_secs(300)).await?;
//! ingestor.process_batch(&tasks).await?;
//! ```
//!
//! The crate never installs a `tracing` subscriber; embedders choose one.

pub mod config;
pub mod feed;
pub mod ingest;
pub mod storage;

#[cfg(test)]
mod test_utils;
