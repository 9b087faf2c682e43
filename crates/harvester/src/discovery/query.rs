//! Search query composition.

use chrono::{Days, NaiveDate, Utc};

use super::filter::FilterCriteria;

/// The `size:` qualifier counts kilobytes.
const KB_PER_MB: u64 = 1000;

/// A composed search query.
///
/// Terms keep the fixed field order of [`FilterCriteria`]; absent predicates
/// contribute nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    terms: Vec<String>,
}

impl SearchQuery {
    /// Compose the query relative to `today`.
    pub fn from_criteria(criteria: &FilterCriteria, today: NaiveDate) -> Self {
        let oldest = today
            .checked_sub_days(Days::new(u64::from(criteria.age_years) * 365))
            .unwrap_or(NaiveDate::MIN);

        let mut terms = vec![format!("pushed:>{}", oldest.format("%Y-%m-%d"))];

        if let Some(owner) = &criteria.owner {
            terms.push(format!("user:{owner}"));
        }
        if let Some(org) = &criteria.organization {
            terms.push(format!("org:{org}"));
        }
        if let Some(language) = &criteria.language {
            terms.push(format!("language:{language}"));
        }
        if let Some(name) = &criteria.name {
            terms.push(format!("repo:{name}"));
        }
        if let Some(stars) = criteria.min_stars {
            terms.push(format!("stars:>={stars}"));
        }
        if let Some(mb) = criteria.max_size_mb {
            terms.push(format!("size:<={}", mb.saturating_mul(KB_PER_MB)));
        }
        if let Some(pct) = criteria.code_percent {
            terms.push(format!("size:<={pct}%"));
        }
        if let Some(term) = &criteria.name_contains {
            terms.push(term.clone());
            terms.push("in:name".to_string());
        }
        for topic in &criteria.topics {
            terms.push(format!("topic:{topic}"));
        }

        Self { terms }
    }

    /// Compose the query relative to the current UTC date.
    pub fn for_today(criteria: &FilterCriteria) -> Self {
        Self::from_criteria(criteria, Utc::now().date_naive())
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Value of the `q` parameter: encoded terms joined by `+`.
    pub fn to_query_param(&self) -> String {
        self.terms
            .iter()
            .map(|t| urlencoding::encode(t).into_owned())
            .collect::<Vec<_>>()
            .join("+")
    }

    /// Readable form with spaces between terms.
    pub fn to_human(&self) -> String {
        self.terms.join(" ")
    }
}

impl std::fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_human())
    }
}
