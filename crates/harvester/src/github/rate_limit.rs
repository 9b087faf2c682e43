use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::http::HttpResponse;

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Header carrying the quota reset time in epoch seconds.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// A shared proactive request budget.
///
/// Clones share one bucket, so every task using the same client draws from
/// the same quota.
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// Create a new rate limiter with the specified requests per second.
    ///
    /// A value of 0 is treated as 1.
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rps));

        Self {
            inner: Arc::new(rate_limiter),
        }
    }

    /// Wait until a request is allowed by the rate limiter.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

impl std::fmt::Debug for ApiRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRateLimiter").finish_non_exhaustive()
    }
}

/// Detect an exhausted-quota response.
///
/// Only 403 and 429 carrying a numeric reset header count; a bare 403 is an
/// ordinary upstream error.
pub fn throttle_reset(response: &HttpResponse) -> Option<DateTime<Utc>> {
    if response.status != 403 && response.status != 429 {
        return None;
    }
    let reset = response.header_u64(RATE_LIMIT_RESET_HEADER)?;
    DateTime::from_timestamp(i64::try_from(reset).ok()?, 0)
}

/// How long to block before retrying a throttled request.
///
/// `reset_at - now` rounded up to whole seconds (never negative) plus `grace`.
pub fn throttle_delay(reset_at: DateTime<Utc>, now: DateTime<Utc>, grace: Duration) -> Duration {
    let remaining_ms = (reset_at - now).num_milliseconds().max(0) as u64;
    let remaining_secs = remaining_ms.div_ceil(1000);
    Duration::from_secs(remaining_secs) + grace
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, reset: Option<&str>) -> HttpResponse {
        HttpResponse {
            status,
            headers: reset
                .map(|r| vec![("X-RateLimit-Reset".to_string(), r.to_string())])
                .unwrap_or_default(),
            body: Vec::new(),
        }
    }

    #[test]
    fn test_throttle_reset_requires_status_and_header() {
        let expected = DateTime::from_timestamp(1_700_000_000, 0);
        assert_eq!(
            throttle_reset(&response(403, Some("1700000000"))),
            expected
        );
        assert_eq!(
            throttle_reset(&response(429, Some("1700000000"))),
            expected
        );
        assert_eq!(throttle_reset(&response(403, None)), None);
        assert_eq!(throttle_reset(&response(403, Some("soon"))), None);
        assert_eq!(throttle_reset(&response(500, Some("1700000000"))), None);
    }

    #[test]
    fn test_throttle_delay_adds_grace_to_remaining_window() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let reset = now + chrono::Duration::seconds(5);
        assert_eq!(
            throttle_delay(reset, now, Duration::from_secs(10)),
            Duration::from_secs(15)
        );
    }

    #[test]
    fn test_throttle_delay_rounds_partial_seconds_up() {
        let now = DateTime::from_timestamp(1_700_000_000, 300_000_000).unwrap();
        let reset = DateTime::from_timestamp(1_700_000_005, 0).unwrap();
        assert_eq!(
            throttle_delay(reset, now, Duration::from_secs(10)),
            Duration::from_secs(15)
        );
    }

    #[test]
    fn test_throttle_delay_never_negative() {
        let now = DateTime::from_timestamp(1_700_000_100, 0).unwrap();
        let reset = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(
            throttle_delay(reset, now, Duration::from_secs(10)),
            Duration::from_secs(10)
        );
    }

    #[tokio::test]
    async fn test_limiter_clones_share_budget() {
        let limiter = ApiRateLimiter::new(1000);
        let clone = limiter.clone();
        assert!(Arc::ptr_eq(&limiter.inner, &clone.inner));
        limiter.wait().await;
        clone.wait().await;
    }

    #[test]
    fn test_zero_rps_does_not_panic() {
        let _ = ApiRateLimiter::new(0);
    }
}
