use thiserror::Error;

use super::model::{FeedFormat, FeedItem, FeedMetadata};
use super::{atom, rss};

/// Errors that make a feed document unusable.
///
/// Any of these is fatal for the ingestion task that hit it; the task is
/// left un-retired so the upstream queue redelivers it.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The task named a feed type other than `RSS` or `ATOM`
    #[error("Unrecognized feed type '{0}'")]
    UnrecognizedType(String),
    /// Markup could not be read as XML
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),
    /// The document ended with this element still open
    #[error("Unexpected end of document inside <{0}>")]
    Unclosed(String),
    /// The dialect's mandatory root element is absent
    #[error("Missing mandatory element '{0}'")]
    MissingRoot(&'static str),
}

/// Parses a feed document in the given dialect.
///
/// Returns the feed-level metadata and the items in document order.
/// Parsing is deterministic: the same document always yields structurally
/// identical output.
pub fn parse_feed(
    format: FeedFormat,
    xml: &str,
) -> Result<(FeedMetadata, Vec<FeedItem>), FormatError> {
    match format {
        FeedFormat::Rss => rss::normalize(xml),
        FeedFormat::Atom => atom::normalize(xml),
    }
}
