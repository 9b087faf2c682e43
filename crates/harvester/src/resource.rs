//! Discovered repositories and their mutable counters.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account type of a repository owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    User,
    Organization,
}

impl OwnerKind {
    /// Map the upstream `owner.type` field. Anything not an organization is
    /// treated as a user account.
    pub fn from_api(kind: &str) -> Self {
        if kind.eq_ignore_ascii_case("organization") {
            Self::Organization
        } else {
            Self::User
        }
    }
}

/// The mutable state compared between watch polls.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub size_kb: u64,
    pub stars: u64,
    pub watchers: u64,
    pub forks: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A repository found by discovery or fetched for watching.
///
/// `full_name` is the identity. Cloning never mutates a descriptor; watching
/// only replaces [`ResourceDescriptor::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub full_name: String,
    pub name: String,
    pub clone_url: String,
    pub owner_login: String,
    pub owner_kind: OwnerKind,
    pub stars: u64,
    pub size_kb: u64,
    pub watchers: u64,
    pub forks: u64,
    pub topics: BTreeSet<String>,
    pub has_issues: bool,
    pub updated_at: Option<DateTime<Utc>>,
    pub snapshot: Snapshot,
}

impl ResourceDescriptor {
    /// Replace the last-known snapshot, returning whether it differed.
    pub fn observe(&mut self, current: Snapshot) -> bool {
        if self.snapshot == current {
            return false;
        }
        self.stars = current.stars;
        self.size_kb = current.size_kb;
        self.watchers = current.watchers;
        self.forks = current.forks;
        self.updated_at = current.updated_at;
        self.snapshot = current;
        true
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A small descriptor with a consistent snapshot.
    pub fn descriptor(full_name: &str, stars: u64) -> ResourceDescriptor {
        let (owner, name) = full_name.split_once('/').unwrap_or(("octo", full_name));
        let snapshot = Snapshot {
            size_kb: 10,
            stars,
            watchers: stars,
            forks: 1,
            updated_at: None,
        };
        ResourceDescriptor {
            full_name: full_name.to_string(),
            name: name.to_string(),
            clone_url: format!("https://github.com/{full_name}.git"),
            owner_login: owner.to_string(),
            owner_kind: OwnerKind::User,
            stars,
            size_kb: snapshot.size_kb,
            watchers: snapshot.watchers,
            forks: snapshot.forks,
            topics: BTreeSet::new(),
            has_issues: true,
            updated_at: None,
            snapshot,
        }
    }
}
