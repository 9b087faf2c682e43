//! A single poll of one watched resource.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::github::{RateLimitedClient, Result, convert};
use crate::resource::ResourceDescriptor;

/// Appended whenever a poll sees the counters or `updated_at` move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub timestamp: DateTime<Utc>,
    pub full_name: String,
    /// Kilobytes.
    pub size: u64,
    pub stars: u64,
    pub watchers: u64,
    pub forks: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ChangeRecord {
    pub fn from_descriptor(repo: &ResourceDescriptor, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            full_name: repo.full_name.clone(),
            size: repo.snapshot.size_kb,
            stars: repo.snapshot.stars,
            watchers: repo.snapshot.watchers,
            forks: repo.snapshot.forks,
            updated_at: repo.snapshot.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Changed(ChangeRecord),
    Unchanged,
}

/// Fetch the current state and replace the snapshot if it moved.
pub async fn poll_resource(
    client: &RateLimitedClient,
    repo: &mut ResourceDescriptor,
) -> Result<PollOutcome> {
    let payload = client.get_repo(&repo.full_name).await?;
    let current = convert::to_snapshot(&payload);
    if repo.observe(current) {
        Ok(PollOutcome::Changed(ChangeRecord::from_descriptor(
            repo,
            Utc::now(),
        )))
    } else {
        Ok(PollOutcome::Unchanged)
    }
}
