use futures::StreamExt;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::config::Config;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default cap on the feed body.
pub const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while retrieving a feed document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, invalid header, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Body is not UTF-8 text
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
}

/// Retrieves the raw text of a feed.
#[allow(async_fn_in_trait)]
pub trait FeedFetcher: Send + Sync {
    /// Performs a single GET of `url` with the caller-supplied headers.
    async fn fetch(&self, url: &str, headers: &HashMap<String, String>) -> Result<String, FetchError>;
}

/// [`FeedFetcher`] backed by `reqwest`.
///
/// One request per call: no retries, and no redirect or auth handling
/// beyond what the supplied headers carry.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
            max_bytes: DEFAULT_MAX_FEED_SIZE,
        }
    }

    /// Fetcher with the timeout and size cap from `config`.
    pub fn from_config(client: reqwest::Client, config: &Config) -> Self {
        Self::new(client)
            .with_timeout(Duration::from_secs(config.fetch_timeout_secs))
            .with_max_bytes(config.max_feed_bytes)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, headers: &HashMap<String, String>) -> Result<String, FetchError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        if !response.status().is_success() {
            tracing::debug!(feed = %url, status = %response.status(), "Feed request rejected");
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let bytes = tokio::time::timeout(self.timeout, read_limited_bytes(response, self.max_bytes))
            .await
            .map_err(|_| FetchError::Timeout)??;

        String::from_utf8(bytes).map_err(|_| FetchError::InvalidUtf8)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Capture Content-Length for completeness check
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><guid>1</guid><title>Test</title></item>
</channel></rss>"#;

    #[tokio::test]
    async fn test_fetch_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/xml"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(reqwest::Client::new());
        let body = fetcher
            .fetch(&format!("{}/feed", mock_server.uri()), &HashMap::new())
            .await
            .unwrap();
        assert_eq!(body, VALID_RSS);
    }

    #[tokio::test]
    async fn test_fetch_sends_custom_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("X-Custom-Header", "CustomHeaderValue"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(1)
            .mount(&mock_server)
            .await;

        let headers = HashMap::from([(
            "X-Custom-Header".to_string(),
            "CustomHeaderValue".to_string(),
        )]);
        let fetcher = HttpFetcher::new(reqwest::Client::new());
        let result = fetcher.fetch(&mock_server.uri(), &headers).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_404_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(reqwest::Client::new());
        match fetcher.fetch(&mock_server.uri(), &HashMap::new()).await {
            Err(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_500_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(reqwest::Client::new());
        let result = fetcher.fetch(&mock_server.uri(), &HashMap::new()).await;
        assert!(matches!(result, Err(FetchError::HttpStatus(500))));
    }

    #[tokio::test]
    async fn test_fetch_too_large() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(64)))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(reqwest::Client::new()).with_max_bytes(16);
        let result = fetcher.fetch(&mock_server.uri(), &HashMap::new()).await;
        assert!(matches!(result, Err(FetchError::ResponseTooLarge)));
    }

    #[tokio::test]
    async fn test_fetch_invalid_utf8() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xfe, 0xfd]))
            .mount(&mock_server)
            .await;

        let fetcher = HttpFetcher::new(reqwest::Client::new());
        let result = fetcher.fetch(&mock_server.uri(), &HashMap::new()).await;
        assert!(matches!(result, Err(FetchError::InvalidUtf8)));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let fetcher =
            HttpFetcher::new(reqwest::Client::new()).with_timeout(Duration::from_millis(50));
        let result = fetcher.fetch(&mock_server.uri(), &HashMap::new()).await;
        assert!(matches!(result, Err(FetchError::Timeout)));
    }
}
