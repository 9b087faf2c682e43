//! Conversion from GitHub payloads to harvester descriptors.

use crate::resource::{OwnerKind, ResourceDescriptor, Snapshot};

use super::types::RepoPayload;

/// The mutable counters of a payload.
pub fn to_snapshot(repo: &RepoPayload) -> Snapshot {
    Snapshot {
        size_kb: repo.size,
        stars: repo.stargazers_count,
        watchers: repo.watchers_count,
        forks: repo.forks_count,
        updated_at: repo.updated_at,
    }
}

/// Convert a payload into a descriptor.
///
/// Returns `None` when the payload carries no clone URL; such items cannot be
/// cloned and are skipped by callers.
pub fn to_descriptor(repo: RepoPayload) -> Option<ResourceDescriptor> {
    let snapshot = to_snapshot(&repo);
    let clone_url = repo.clone_url.filter(|u| !u.is_empty())?;

    Some(ResourceDescriptor {
        full_name: repo.full_name,
        name: repo.name,
        clone_url,
        owner_kind: OwnerKind::from_api(&repo.owner.kind),
        owner_login: repo.owner.login,
        stars: snapshot.stars,
        size_kb: snapshot.size_kb,
        watchers: snapshot.watchers,
        forks: snapshot.forks,
        topics: repo.topics.into_iter().collect(),
        has_issues: repo.has_issues,
        updated_at: snapshot.updated_at,
        snapshot,
    })
}
