//! Configuration for a [`FeedManager`](crate::FeedManager), loadable from TOML.
//!
//! Every key is optional; a missing or empty file yields `FeedConfig::default()`.
//! Unknown keys are ignored, though we log a warning since they are usually typos.
use serde::{Deserialize, Serialize};
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

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Tunables for storage, networking, callbacks and logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// SQLite file holding read state and favorites. `":memory:"` keeps them
    /// for the process lifetime only.
    pub database_path: String,

    /// SQLite file holding cached response bodies.
    pub cache_path: String,

    /// How long a cached response satisfies a request that doesn't skip the
    /// cache. Also sent as `Cache-Control: max-age`.
    pub cache_max_age_secs: u64,

    /// Upper bound on the total size of cached response bodies. The oldest
    /// entries are evicted once a new response pushes the cache past it.
    pub cache_max_bytes: u64,

    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,

    /// Response bodies larger than this are rejected.
    pub max_feed_bytes: usize,

    /// Retries for 429/5xx and truncated bodies, with exponential backoff
    /// starting at `retry_base_delay_ms`.
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,

    /// Default callback failure mode for requests that don't choose one.
    pub safe_callbacks: bool,

    /// Reject feed URLs that resolve to localhost or private address ranges.
    pub block_private_hosts: bool,

    pub user_agent: String,

    /// Install a tracing subscriber in [`logging::init`](crate::logging::init).
    pub logging_enabled: bool,

    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            database_path: "feedpipe.db".to_string(),
            cache_path: "feedpipe-cache.db".to_string(),
            cache_max_age_secs: 2 * 60 * 60,
            cache_max_bytes: 1024 * 1024,
            connect_timeout_secs: 15,
            read_timeout_secs: 45,
            max_feed_bytes: 10 * 1024 * 1024,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            safe_callbacks: true,
            block_private_hosts: false,
            user_agent: concat!("feedpipe/", env!("CARGO_PKG_VERSION")).to_string(),
            logging_enabled: false,
            log_filter: "feedpipe=info".to_string(),
        }
    }
}

impl FeedConfig {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 14] = [
        "database_path",
        "cache_path",
        "cache_max_age_secs",
        "cache_max_bytes",
        "connect_timeout_secs",
        "read_timeout_secs",
        "max_feed_bytes",
        "max_retries",
        "retry_base_delay_ms",
        "safe_callbacks",
        "block_private_hosts",
        "user_agent",
        "logging_enabled",
        "log_filter",
    ];

    /// Configuration with both databases in memory. Handy for tests and
    /// short-lived tools.
    pub fn in_memory() -> Self {
        Self {
            database_path: ":memory:".to_string(),
            cache_path: ":memory:".to_string(),
            ..Self::default()
        }
    }

    /// Reads `path` as TOML.
    ///
    /// A missing, empty or whitespace-only file yields the defaults. Keys we
    /// don't know are logged and ignored; a malformed file or a mistyped value
    /// is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let Some(content) = read_limited(path)? else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        };

        let table: toml::Table = content.parse()?;
        table
            .keys()
            .filter(|key| !Self::KNOWN_KEYS.contains(&key.as_str()))
            .for_each(|key| tracing::warn!(key = %key, "Unknown config key ignored"));

        let config: FeedConfig = toml::Value::Table(table).try_into()?;
        tracing::info!(path = %path.display(), database = %config.database_path, "Loaded configuration");
        Ok(config)
    }
}

/// Contents of `path`, or `None` when it is absent or blank.
///
/// SEC-014: files over [`FeedConfig::MAX_FILE_SIZE`] are refused unread.
fn read_limited(path: &Path) -> Result<Option<String>, ConfigError> {
    let not_found = |e: &std::io::Error| e.kind() == std::io::ErrorKind::NotFound;

    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(e) if not_found(&e) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if size > FeedConfig::MAX_FILE_SIZE {
        return Err(ConfigError::TooLarge(format!(
            "{} is {size} bytes, limit is {}",
            path.display(),
            FeedConfig::MAX_FILE_SIZE
        )));
    }

    match std::fs::read_to_string(path) {
        Ok(content) if content.trim().is_empty() => Ok(None),
        Ok(content) => Ok(Some(content)),
        // Removed between the two calls
        Err(e) if not_found(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Tests
// ============================================================================
