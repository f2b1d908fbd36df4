//! Feed retrieval and normalization.
//!
//! This module turns a feed URL into the canonical item model:
//!
//! - **Fetching**: a single HTTP GET behind the [`FeedFetcher`] trait
//! - **Normalizing**: RSS 2.0 and Atom documents into [`FeedMetadata`] and
//!   [`FeedItem`] records
//!
//! # Architecture
//!
//! - [`model`] - Canonical feed/item records shared by both dialects
//! - `xml_tree` - XML to object-tree conversion with declared array paths
//! - `rss`, `atom` - Per-dialect field tables and normalizers
//! - `markup` - HTML minification for rich text constructs
//! - [`parser`] - `parse_feed` entry point and [`FormatError`]
//! - [`fetcher`] - HTTP retrieval
//!
//! # Example
//!
//! ```ignore
//! use feedrelay::feed::{parse_feed, FeedFetcher, FeedFormat, HttpFetcher};
//!
//! let fetcher = HttpFetcher::new(reqwest::Client::new());
//! let xml = fetcher.fetch("https://example.com/rss", &Default::default()).await?;
//! let (metadata, items) = parse_feed(FeedFormat::Rss, &xml)?;
//! ```

mod atom;
pub mod fetcher;
mod markup;
pub mod model;
pub mod parser;
mod rss;
mod xml_tree;

pub use fetcher::{FeedFetcher, FetchError, HttpFetcher};
pub use model::{
    Category, Cloud, Content, Enclosure, FeedFormat, FeedGenerator, FeedItem, FeedMetadata,
    FeedSource, Generator, Image, ItemSource, Link, Person, TextInput,
};
pub use parser::{parse_feed, FormatError};
