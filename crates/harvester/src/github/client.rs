//! Throttle-aware GitHub REST client.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;

use crate::config::{ClientConfig, ConfigError};
use crate::http::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::progress::{HarvestProgress, ProgressCallback, emit};

use super::error::{ApiError, Result};
use super::rate_limit::{ApiRateLimiter, throttle_delay, throttle_reset};
use super::types::{ApiErrorBody, RepoPayload};

/// Pinned media type for the v3 REST API.
pub const ACCEPT_HEADER: &str = "application/vnd.github.v3+json";

/// Longest upstream body kept in an error message.
const MAX_ERROR_BODY: usize = 200;

/// HTTP executor that waits out exhausted quota and retries exactly once.
///
/// Cheap to clone; clones share the transport, configuration and the
/// optional proactive bucket.
#[derive(Clone)]
pub struct RateLimitedClient {
    transport: Arc<dyn HttpTransport>,
    config: Arc<ClientConfig>,
    limiter: Option<ApiRateLimiter>,
    on_progress: Option<Arc<ProgressCallback>>,
}

impl RateLimitedClient {
    /// Build a client backed by reqwest.
    pub fn new(config: ClientConfig) -> std::result::Result<Self, ConfigError> {
        let transport = ReqwestTransport::with_timeout(config.request_timeout)
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build a client over an arbitrary transport.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let limiter = config.requests_per_second.map(ApiRateLimiter::new);
        Ok(Self {
            transport,
            config: Arc::new(config),
            limiter,
            on_progress: None,
        })
    }

    /// Report throttle waits through a progress callback.
    pub fn with_progress(mut self, on_progress: Arc<ProgressCallback>) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Absolute URL for an API path such as `/search/repositories`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base(), path.trim_start_matches('/'))
    }

    /// A GET request carrying the pinned headers and the credential.
    pub fn request(&self, url: impl Into<String>) -> HttpRequest {
        let request = HttpRequest::get(url)
            .with_header("Accept", ACCEPT_HEADER)
            .with_header("User-Agent", self.config.user_agent.as_str());
        match &self.config.token {
            Some(token) => request.with_header("Authorization", format!("token {token}")),
            None => request,
        }
    }

    /// Execute a request.
    ///
    /// A throttled response blocks the caller until the reported reset plus
    /// the grace period, then the request is sent once more. The second
    /// outcome is returned as-is, including a second throttle.
    pub async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        match self.send_once(request.clone()).await {
            Err(ApiError::TransientThrottle { reset_at }) => {
                let delay = throttle_delay(reset_at, Utc::now(), self.config.throttle_grace);
                tracing::warn!(
                    url = %request.url,
                    reset_at = %reset_at,
                    wait_secs = delay.as_secs(),
                    "Rate limited, waiting for quota reset"
                );
                emit(
                    self.on_progress.as_deref(),
                    HarvestProgress::Throttled {
                        wait_secs: delay.as_secs(),
                    },
                );
                tokio::time::sleep(delay).await;
                self.send_once(request).await
            }
            other => other,
        }
    }

    async fn send_once(&self, request: HttpRequest) -> Result<HttpResponse> {
        if let Some(limiter) = &self.limiter {
            limiter.wait().await;
        }

        tracing::debug!(url = %request.url, "GET");
        let response = self.transport.send(request).await?;

        if response.is_success() {
            return Ok(response);
        }
        if let Some(reset_at) = throttle_reset(&response) {
            return Err(ApiError::TransientThrottle { reset_at });
        }
        Err(ApiError::upstream(
            response.status,
            upstream_message(&response),
        ))
    }

    /// GET an absolute URL.
    pub async fn get(&self, url: &str) -> Result<HttpResponse> {
        self.execute(self.request(url)).await
    }

    /// GET an absolute URL and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.get(url).await?;
        decode_json(&response)
    }

    /// Fetch one repository by `owner/name`.
    pub async fn get_repo(&self, full_name: &str) -> Result<RepoPayload> {
        let url = self.endpoint(&format!("repos/{full_name}"));
        self.get_json(&url).await
    }
}

/// Decode a JSON response body.
pub fn decode_json<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    Ok(serde_json::from_slice(&response.body)?)
}

/// Human-readable message for a failed response.
fn upstream_message(response: &HttpResponse) -> String {
    if let Ok(body) = serde_json::from_slice::<ApiErrorBody>(&response.body) {
        return body.message;
    }
    let text = response.text();
    let text = text.trim();
    if text.is_empty() {
        return format!("HTTP {}", response.status);
    }
    text.chars().take(MAX_ERROR_BODY).collect()
}
