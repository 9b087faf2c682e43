//! Explicit client configuration threaded through every constructor.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default GitHub REST API base URL.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Largest page size accepted by the search API.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Default delay between search pages.
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(3);

/// Default interval between polls of the same watched resource.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Extra wait added on top of a throttle reset time.
pub const DEFAULT_THROTTLE_GRACE: Duration = Duration::from_secs(10);

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors raised before any work is dispatched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("cannot prepare output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open log file {}: {source}", path.display())]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot build HTTP client: {0}")]
    HttpClient(String),
}

impl ConfigError {
    #[inline]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Settings shared by the search client, the clone pipeline and the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Optional credential sent as `Authorization: token <value>`.
    pub token: Option<String>,
    pub api_url: String,
    pub user_agent: String,
    /// Results per search page (1..=100).
    pub page_size: u32,
    pub page_delay: Duration,
    pub poll_interval: Duration,
    pub throttle_grace: Duration,
    pub request_timeout: Duration,
    /// Proactive shared request budget. `None` disables pacing.
    pub requests_per_second: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: DEFAULT_API_URL.to_string(),
            user_agent: concat!("harvester/", env!("CARGO_PKG_VERSION")).to_string(),
            page_size: MAX_PAGE_SIZE,
            page_delay: DEFAULT_PAGE_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            throttle_grace: DEFAULT_THROTTLE_GRACE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            requests_per_second: None,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the credential. Empty strings are treated as absent.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_requests_per_second(mut self, rps: Option<u32>) -> Self {
        self.requests_per_second = rps;
        self
    }

    /// API base URL without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(ConfigError::invalid(
                "page_size",
                format!("{} is outside 1..={MAX_PAGE_SIZE}", self.page_size),
            ));
        }
        let base = self.api_base();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigError::invalid(
                "api_url",
                format!("'{}' is not an http(s) URL", self.api_url),
            ));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::invalid("user_agent", "must not be empty"));
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::invalid("poll_interval", "must be positive"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid("request_timeout", "must be positive"));
        }
        if self.requests_per_second == Some(0) {
            return Err(ConfigError::invalid(
                "requests_per_second",
                "must be positive when set",
            ));
        }
        Ok(())
    }
}
