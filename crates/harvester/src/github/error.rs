//! GitHub API error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::HttpError;

/// Errors that can occur when talking to the GitHub REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Quota exhausted; retried once after the reset.
    #[error("Rate limit exceeded. Resets at {reset_at}")]
    TransientThrottle { reset_at: DateTime<Utc> },

    #[error("Network error: {message}")]
    Transport { message: String },

    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Failed to decode response: {message}")]
    Decode { message: String },
}

impl ApiError {
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    #[inline]
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    #[inline]
    pub fn is_throttle(&self) -> bool {
        matches!(self, Self::TransientThrottle { .. })
    }

    /// Stable short label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransientThrottle { .. } => "throttle",
            Self::Transport { .. } => "transport",
            Self::Upstream { .. } => "upstream",
            Self::Decode { .. } => "decode",
        }
    }

    /// HTTP status for upstream errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<HttpError> for ApiError {
    fn from(e: HttpError) -> Self {
        Self::transport(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::decode(e.to_string())
    }
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message, which keeps multi-line git
/// stderr or upstream bodies readable in progress output.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
