//! Harvester - repository discovery, bulk cloning and change watching.
//!
//! This library queries the GitHub search API page by page, clones every hit
//! through a bounded worker pool, and watches a filtered set of repositories
//! for counter changes, appending every clone attempt and every change to an
//! append-only log.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use harvester::{ClientConfig, FilterCriteria, RateLimitedClient, SearchPager, SearchQuery};
//! use harvester::clone::{ClonePipeline, CloneJob, CloneOptions, GitCloner};
//!
//! let client = RateLimitedClient::new(ClientConfig::new().with_token(token))?;
//! let criteria = FilterCriteria { language: Some("rust".into()), ..Default::default() };
//! let found = SearchPager::new(client, SearchQuery::for_today(&criteria))
//!     .discover_all(None)
//!     .await?;
//!
//! let options = CloneOptions { output_dir: "repos".into(), ..Default::default() };
//! let jobs = found.into_iter().map(|d| CloneJob::new(d, &options)).collect();
//! let run = ClonePipeline::new(Arc::new(GitCloner::new()), 5).run(jobs).await;
//! println!("{} failed", run.summary.failed);
//! ```

pub mod clone;
pub mod config;
pub mod discovery;
pub mod github;
pub mod http;
pub mod log_sink;
pub mod progress;
pub mod resource;
pub mod watch;

pub use config::{ClientConfig, ConfigError};
pub use discovery::{FilterCriteria, SearchPager, SearchQuery};
pub use github::{ApiError, ApiRateLimiter, RateLimitedClient};
pub use log_sink::{LogEncoding, LogSink, LogSinkError, read_records};
pub use progress::{HarvestProgress, ProgressCallback, emit};
pub use resource::{OwnerKind, ResourceDescriptor, Snapshot};
