//! Clone jobs, outcomes and the clone log record.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::github::ApiError;
use crate::resource::ResourceDescriptor;

/// Errors raised while cloning one repository.
#[derive(Debug, Error)]
pub enum CloneError {
    #[error("local I/O error at {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("git clone failed ({status}): {stderr}")]
    Git { status: String, stderr: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl CloneError {
    pub fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LocalIo {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::LocalIo { .. } => "local_io",
            Self::Git { .. } => "git",
            Self::Api(e) => e.kind(),
        }
    }
}

/// Settings shared by every job of a bulk run.
#[derive(Clone, Default)]
pub struct CloneOptions {
    pub output_dir: PathBuf,
    pub auth_token: Option<String>,
    /// Shallow clone depth.
    pub depth: Option<u32>,
    /// Clone only this branch.
    pub branch: Option<String>,
    /// Remove an existing destination instead of skipping it.
    pub overwrite: bool,
}

impl fmt::Debug for CloneOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloneOptions")
            .field("output_dir", &self.output_dir)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("depth", &self.depth)
            .field("branch", &self.branch)
            .field("overwrite", &self.overwrite)
            .finish()
    }
}

/// One repository to clone.
#[derive(Clone)]
pub struct CloneJob {
    pub descriptor: ResourceDescriptor,
    pub destination: PathBuf,
    pub auth_token: Option<String>,
    pub depth: Option<u32>,
    pub branch: Option<String>,
    pub overwrite: bool,
}

impl CloneJob {
    /// Build a job writing to `output_dir/sanitize(name)`.
    pub fn new(descriptor: ResourceDescriptor, options: &CloneOptions) -> Self {
        let dir_name = match sanitize_name(&descriptor.name) {
            name if name.is_empty() => fallback_name(Utc::now()),
            name => name,
        };
        Self {
            destination: options.output_dir.join(dir_name),
            descriptor,
            auth_token: options.auth_token.clone(),
            depth: options.depth,
            branch: options.branch.clone(),
            overwrite: options.overwrite,
        }
    }

    pub fn repo(&self) -> &str {
        &self.descriptor.full_name
    }

    /// Final path component of the destination.
    pub fn dir_name(&self) -> String {
        self.destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl fmt::Debug for CloneJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloneJob")
            .field("repo", &self.descriptor.full_name)
            .field("destination", &self.destination)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("depth", &self.depth)
            .field("branch", &self.branch)
            .field("overwrite", &self.overwrite)
            .finish()
    }
}

/// Directory name for a repository name.
///
/// Path separators become `_`; anything outside `[A-Za-z0-9._-]` is dropped.
/// Names made only of dots are rejected (empty result).
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter_map(|c| match c {
            '/' | '\\' => Some('_'),
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') => Some(c),
            _ => None,
        })
        .collect();
    if cleaned.chars().all(|c| c == '.') {
        String::new()
    } else {
        cleaned
    }
}

/// Timestamp-derived directory name used when sanitizing leaves nothing.
pub fn fallback_name(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d%H%M%S%6f").to_string()
}

/// Outcome of one clone attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CloneOutcome {
    Cloned,
    SkippedExists,
    Failed(String),
}

impl CloneOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl fmt::Display for CloneOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cloned => f.write_str("cloned"),
            Self::SkippedExists => f.write_str("skipped_exists"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Exactly one per job.
#[derive(Debug, Clone)]
pub struct CloneResult {
    pub job: CloneJob,
    pub outcome: CloneOutcome,
    pub timestamp: DateTime<Utc>,
}

impl CloneResult {
    pub fn new(job: CloneJob, outcome: CloneOutcome) -> Self {
        Self {
            job,
            outcome,
            timestamp: Utc::now(),
        }
    }

    pub fn to_record(&self) -> CloneRecord {
        CloneRecord {
            repo_name: self.job.dir_name(),
            repo_url: self.job.descriptor.clone_url.clone(),
            utc_timestamp: self.timestamp,
            outcome: self.outcome.to_string(),
        }
    }
}

/// Row written to the clone log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneRecord {
    pub repo_name: String,
    pub repo_url: String,
    #[serde(with = "utc_seconds")]
    pub utc_timestamp: DateTime<Utc>,
    pub outcome: String,
}

/// `%Y-%m-%d %H:%M:%S` in UTC.
mod utc_seconds {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

pub(crate) async fn destination_exists(path: &Path) -> Result<bool, CloneError> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| CloneError::local_io(path, e))
}
