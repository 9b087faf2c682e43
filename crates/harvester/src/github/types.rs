//! GitHub REST payloads used by search and repo polling.
//!
//! Only the fields harvester reads are modelled; everything else in the
//! upstream JSON is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `GET /search/repositories` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default)]
    pub items: Vec<RepoPayload>,
}

/// Repository owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerPayload {
    pub login: String,
    /// `User` or `Organization`.
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// A repository as returned by search and by `GET /repos/{full_name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoPayload {
    pub full_name: String,
    pub name: String,
    #[serde(default)]
    pub clone_url: Option<String>,
    pub owner: OwnerPayload,
    #[serde(default)]
    pub stargazers_count: u64,
    /// Kilobytes.
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub watchers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub has_issues: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Error body returned by the API (`{"message": "..."}`).
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,
}
