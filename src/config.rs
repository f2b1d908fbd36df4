//! Configuration file parser for the ingestion engine.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
//! Deployment environment variables take precedence over the file.
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// An environment override could not be parsed for its key.
    #[error("Invalid value '{value}' for {key}")]
    InvalidOverride { key: &'static str, value: String },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level engine configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file holding dedup records and queues (`:memory:` allowed).
    pub database_path: String,

    /// Inbound queue carrying one ingestion task per feed source.
    pub feed_queue_url: String,

    /// Outbound queue read by the completion worker.
    pub item_queue_url: String,

    /// Recovery path for entries the item queue rejected.
    pub dead_letter_queue_url: String,

    /// Unit of the per-item dispatch delay, in seconds.
    pub item_delay_seconds: u32,

    /// Per-request timeout for feed retrieval.
    pub fetch_timeout_secs: u64,

    /// Largest feed body accepted, in bytes.
    pub max_feed_bytes: usize,

    /// Wall-clock budget for one invocation. 0 = unbounded.
    pub invocation_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: "feedrelay.db".to_string(),
            feed_queue_url: "feed-queue".to_string(),
            item_queue_url: "item-queue".to_string(),
            dead_letter_queue_url: "dead-letter-queue".to_string(),
            item_delay_seconds: 1,
            fetch_timeout_secs: 30,
            max_feed_bytes: 10 * 1024 * 1024,
            invocation_timeout_secs: 0,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 8] = [
        "database_path",
        "feed_queue_url",
        "item_queue_url",
        "dead_letter_queue_url",
        "item_delay_seconds",
        "fetch_timeout_secs",
        "max_feed_bytes",
        "invocation_timeout_secs",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check file size before reading to avoid pulling a huge file into memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse the TOML content first as a raw table to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            item_queue = %config.item_queue_url,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies deployment overrides read through `lookup`.
    ///
    /// Recognized variables: `ITEM_DELAY`, `FEED_QUEUE_URL`, `ITEM_QUEUE_URL`,
    /// `STANDARD_DEAD_LETTER_QUEUE_URL`, `FEEDRELAY_DATABASE`. Unset variables
    /// leave the current value alone.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("ITEM_DELAY") {
            self.item_delay_seconds =
                value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidOverride {
                        key: "ITEM_DELAY",
                        value: value.clone(),
                    })?;
        }
        if let Some(value) = lookup("FEED_QUEUE_URL") {
            self.feed_queue_url = value;
        }
        if let Some(value) = lookup("ITEM_QUEUE_URL") {
            self.item_queue_url = value;
        }
        if let Some(value) = lookup("STANDARD_DEAD_LETTER_QUEUE_URL") {
            self.dead_letter_queue_url = value;
        }
        if let Some(value) = lookup("FEEDRELAY_DATABASE") {
            self.database_path = value;
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
