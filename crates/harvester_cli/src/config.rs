//! Configuration file support for harvester.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `HARVESTER_`, sections split by `__`,
//!    e.g., `HARVESTER_GITHUB__TOKEN` or `HARVESTER_WATCH__MAX_IN_FLIGHT`)
//! 3. Config file (~/.config/harvester/config.toml or ./harvester.toml)
//! 4. Built-in defaults
//!
//! Example config file:
//! ```toml
//! [github]
//! token = "ghp_..."  # or use GITHUB_TOKEN / HARVESTER_GITHUB__TOKEN
//! api_url = "https://api.github.com"
//!
//! [clone]
//! concurrency = 5
//! csv_file = "cloned_repositories_log.csv"
//! depth = 1
//!
//! [watch]
//! poll_interval_secs = 60
//! max_in_flight = 8
//! log_file = "repository_changes.csv"
//!
//! [rate_limit]
//! requests_per_second = 5
//! disabled = false
//! ```

use std::path::PathBuf;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use harvester::ClientConfig;
use harvester::clone::DEFAULT_CLONE_CONCURRENCY;
use harvester::config::{DEFAULT_API_URL, DEFAULT_POLL_INTERVAL};
use harvester::watch::DEFAULT_MAX_IN_FLIGHT;
use serde::Deserialize;

/// Default clone log, relative to the working directory.
pub const DEFAULT_CLONE_LOG: &str = "cloned_repositories_log.csv";

/// Default change log, relative to the working directory.
pub const DEFAULT_WATCH_LOG: &str = "repository_changes.csv";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GitHub API configuration.
    pub github: GitHubConfig,
    /// Defaults for `harvester clone`.
    pub clone: CloneConfig,
    /// Defaults for `harvester watch`.
    pub watch: WatchConfig,
    /// Proactive request pacing.
    pub rate_limit: RateLimitConfig,
}

/// GitHub configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token.
    /// Can also be set via HARVESTER_GITHUB__TOKEN, or GITHUB_TOKEN for the `--token` flag.
    pub token: Option<String>,
    /// API base URL (GitHub Enterprise installs use `https://host/api/v3`).
    pub api_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: DEFAULT_API_URL.to_string(),
        }
    }
}

/// Default clone options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CloneConfig {
    /// Number of concurrent clone workers.
    pub concurrency: usize,
    /// Append-only log of clone attempts.
    pub csv_file: PathBuf,
    /// Shallow clone depth; full history when unset.
    pub depth: Option<u32>,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CLONE_CONCURRENCY,
            csv_file: PathBuf::from(DEFAULT_CLONE_LOG),
            depth: None,
        }
    }
}

/// Default watch options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Seconds between the end of one poll and the start of the next.
    pub poll_interval_secs: u64,
    /// Maximum polls in flight at once.
    pub max_in_flight: usize,
    /// Change log; `.json`/`.jsonl`/`.ndjson` select NDJSON, anything else CSV.
    pub log_file: PathBuf,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            log_file: PathBuf::from(DEFAULT_WATCH_LOG),
        }
    }
}

/// Proactive rate limiting.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Token bucket refill rate shared by every request.
    pub requests_per_second: u32,
    /// Rely on reactive throttle handling alone.
    pub disabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5,
            disabled: false,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/harvester/config.toml)
    /// 3. Local config file (./harvester.toml)
    /// 4. Environment variables with HARVESTER_ prefix
    ///
    /// A malformed file is a configuration error, reported before any work starts.
    pub fn load() -> Result<Self, config::ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("harvester.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./harvester.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // HARVESTER_GITHUB__TOKEN -> github.token, HARVESTER_CLONE__CSV_FILE -> clone.csv_file
        builder = builder.add_source(
            Environment::with_prefix("HARVESTER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize::<Config>()
    }

    /// Get the GitHub token.
    pub fn github_token(&self) -> Option<String> {
        self.github.token.clone()
    }

    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.watch.poll_interval_secs)
    }

    /// Requests per second for the shared limiter, `None` when disabled.
    pub fn requests_per_second(&self) -> Option<u32> {
        (!self.rate_limit.disabled).then_some(self.rate_limit.requests_per_second)
    }

    /// Build the library client configuration; `token` overrides the file value.
    pub fn client_config(&self, token: Option<String>) -> ClientConfig {
        ClientConfig::new()
            .with_token(token.or_else(|| self.github_token()))
            .with_api_url(self.github.api_url.clone())
            .with_poll_interval(self.poll_interval())
            .with_requests_per_second(self.requests_per_second())
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "harvester").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
