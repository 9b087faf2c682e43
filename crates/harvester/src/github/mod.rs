//! GitHub REST access.
//!
//! # Module Structure
//!
//! - [`error`] - Error taxonomy for API calls
//! - [`types`] - Wire payloads
//! - [`client`] - [`RateLimitedClient`], the only component that talks HTTP
//! - [`rate_limit`] - Throttle detection and the proactive token bucket
//! - [`pagination`] - `Link` header parsing
//! - [`convert`] - Payload to descriptor conversion
//!
//! ```ignore
//! use harvester::{ClientConfig, github::RateLimitedClient};
//!
//! let client = RateLimitedClient::new(ClientConfig::new().with_token(token))?;
//! let repo = client.get_repo("rust-lang/rust").await?;
//! ```

mod client;
pub mod convert;
mod error;
pub mod pagination;
pub mod rate_limit;
pub mod types;

pub use client::{ACCEPT_HEADER, RateLimitedClient, decode_json};
pub use error::{ApiError, Result, short_error_message};
pub use pagination::{LinkPagination, parse_link_header};
pub use rate_limit::{ApiRateLimiter, throttle_delay, throttle_reset};
pub use types::{RepoPayload, SearchResponse};
