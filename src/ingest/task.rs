use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::feed::{FeedFormat, FeedSource, FormatError};

/// Body of an inbound ingestion task: "ingest this feed source now".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedTask {
    pub source: String,
    /// Feed dialect tag as sent by the scheduler; validated on conversion
    #[serde(rename = "type")]
    pub feed_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

impl FeedTask {
    pub fn from_body(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    /// Validates the type tag and produces the source to ingest.
    pub fn into_source(self) -> Result<FeedSource, FormatError> {
        let format: FeedFormat = self.feed_type.parse()?;
        Ok(FeedSource {
            url: self.source,
            format,
            headers: self.headers.unwrap_or_default(),
        })
    }
}
