//! Repository discovery through the search API.
//!
//! [`FilterCriteria`] becomes a [`SearchQuery`]; a [`SearchPager`] walks the
//! result pages through the shared [`RateLimitedClient`](crate::github::RateLimitedClient).

mod filter;
mod pager;
mod query;

pub use filter::{DEFAULT_AGE_YEARS, FilterCriteria};
pub use pager::SearchPager;
pub use query::SearchQuery;
