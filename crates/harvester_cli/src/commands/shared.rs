use std::sync::Arc;

use harvester::{ClientConfig, ConfigError, FilterCriteria, ProgressCallback, RateLimitedClient};

use crate::FilterArgs;

/// Translate search flags into library predicates.
pub(crate) fn criteria_from(filters: &FilterArgs) -> FilterCriteria {
    FilterCriteria {
        owner: filters.owner.clone(),
        organization: filters.org.clone(),
        language: filters.language.clone(),
        name: filters.name.clone(),
        name_contains: filters.contains.clone(),
        topics: filters.topics.iter().cloned().collect(),
        min_stars: filters.min_stars,
        max_size_mb: filters.max_size,
        age_years: filters.age,
        code_percent: filters.code_percent,
        ..FilterCriteria::default()
    }
}

/// Fail on a zero worker count before any work starts.
pub(crate) fn require_positive(field: &'static str, value: usize) -> Result<usize, ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be at least 1"));
    }
    Ok(value)
}

/// Build the shared client, reporting throttle waits through `on_progress`.
pub(crate) fn build_client(
    config: ClientConfig,
    on_progress: &Arc<ProgressCallback>,
) -> Result<RateLimitedClient, ConfigError> {
    if config.token.is_none() {
        tracing::warn!("No GitHub token configured, unauthenticated rate limits apply");
    }
    Ok(RateLimitedClient::new(config)?.with_progress(Arc::clone(on_progress)))
}
