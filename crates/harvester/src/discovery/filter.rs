//! Discovery and watch predicates.

use std::collections::BTreeSet;

use crate::resource::{OwnerKind, ResourceDescriptor};

/// Default age window for discovery, in years.
pub const DEFAULT_AGE_YEARS: u32 = 8;

/// Optional predicates; every absent predicate passes.
///
/// Search-side fields become qualifiers in the upstream query. The watch-side
/// fields (`names`, `specific`, `has_issues`, `topics`, `min_stars`, owner by
/// kind) are evaluated locally by [`FilterCriteria::matches_watch`] once, at
/// the start of a watch session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCriteria {
    /// Owner login (`user:` qualifier; user accounts when watching).
    pub owner: Option<String>,
    /// Organization login (`org:` qualifier).
    pub organization: Option<String>,
    pub language: Option<String>,
    /// Exact `owner/name` (`repo:` qualifier).
    pub name: Option<String>,
    /// Substring matched against repository names (`<term> in:name`).
    pub name_contains: Option<String>,
    /// Every listed topic must be present.
    pub topics: BTreeSet<String>,
    /// Explicit allow-list of `owner/name` (or bare names) to watch.
    pub names: Vec<String>,
    /// A single `owner/name` to watch.
    pub specific: Option<String>,
    pub min_stars: Option<u64>,
    pub max_size_mb: Option<u64>,
    /// Only repositories pushed within this many years.
    pub age_years: u32,
    pub code_percent: Option<u8>,
    /// Require the issue tracker to be enabled.
    pub has_issues: bool,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            owner: None,
            organization: None,
            language: None,
            name: None,
            name_contains: None,
            topics: BTreeSet::new(),
            names: Vec::new(),
            specific: None,
            min_stars: None,
            max_size_mb: None,
            age_years: DEFAULT_AGE_YEARS,
            code_percent: None,
            has_issues: false,
        }
    }
}

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full names fetched directly instead of searched for.
    pub fn direct_targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self.specific.iter().cloned().collect();
        for name in &self.names {
            if name.contains('/') && !targets.contains(name) {
                targets.push(name.clone());
            }
        }
        targets
    }

    /// Local watch-start predicate.
    pub fn matches_watch(&self, repo: &ResourceDescriptor) -> bool {
        if self.has_issues && !repo.has_issues {
            return false;
        }
        if let Some(specific) = &self.specific
            && !repo.full_name.eq_ignore_ascii_case(specific)
            && self.names.is_empty()
        {
            return false;
        }
        if let Some(owner) = &self.owner
            && !(repo.owner_kind == OwnerKind::User && repo.owner_login.eq_ignore_ascii_case(owner))
        {
            return false;
        }
        if let Some(org) = &self.organization
            && !(repo.owner_kind == OwnerKind::Organization
                && repo.owner_login.eq_ignore_ascii_case(org))
        {
            return false;
        }
        if !self.names.is_empty() && !self.is_named(repo) {
            return false;
        }
        if !self.topics.is_subset(&repo.topics) {
            return false;
        }
        if let Some(min) = self.min_stars
            && repo.stars < min
        {
            return false;
        }
        true
    }

    fn is_named(&self, repo: &ResourceDescriptor) -> bool {
        let listed = |n: &String| {
            n.eq_ignore_ascii_case(&repo.full_name) || n.eq_ignore_ascii_case(&repo.name)
        };
        self.names.iter().any(listed) || self.specific.iter().any(listed)
    }
}
