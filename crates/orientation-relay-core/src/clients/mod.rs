//! HTTP clients for the external APIs.
//!
//! Each client implements one of the narrow upstream contracts defined by the
//! domain modules:
//! - [`ContentClient`] implements [`crate::guidelines::ContentApi`]
//! - [`EmailClient`] implements [`crate::dispatch::EmailApi`]
//! - [`AudienceClient`] implements [`crate::dispatch::AudienceApi`]
//!
//! All three share [`HttpApi`], which owns the `reqwest` client (with the
//! per-attempt timeout), builds URLs from path segments, attaches
//! credentials, and maps non-success statuses to [`UpstreamError::Status`].
//! None of them retry; retries happen one level up.

mod audience;
mod content;
mod email;

pub use audience::{audience_base_url_from_key, AudienceClient};
pub use content::{ContentClient, DEFAULT_CONTENT_API_URL};
pub use email::{EmailClient, DEFAULT_EMAIL_API_URL};

use crate::UpstreamError;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use url::Url;

/// Default per-attempt timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Default user agent for outbound calls
pub const DEFAULT_USER_AGENT: &str = concat!("orientation-relay/", env!("CARGO_PKG_VERSION"));

/// Settings shared by all upstream clients.
///
/// # Examples
///
/// ```
/// use orientation_relay_core::clients::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new("https://api.example.test/v2")
///     .with_timeout(Duration::from_secs(2));
/// assert_eq!(config.timeout, Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Set the per-attempt request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// How requests authenticate upstream
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    /// HTTP basic auth with the key as password
    BasicKey(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(<REDACTED>)"),
            Self::BasicKey(_) => f.write_str("BasicKey(<REDACTED>)"),
        }
    }
}

/// Shared request plumbing for one upstream service.
#[derive(Clone)]
pub struct HttpApi {
    service: &'static str,
    base_url: Url,
    credentials: Credentials,
    http_client: reqwest::Client,
}

impl HttpApi {
    /// Build the client for `service`.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Configuration`] when the base URL is invalid
    /// or the HTTP client cannot be created.
    pub fn new(
        service: &'static str,
        config: &ClientConfig,
        credentials: Credentials,
    ) -> Result<Self, UpstreamError> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            UpstreamError::Configuration {
                service: service.to_string(),
                message: format!("Invalid base URL '{}': {}", config.base_url, e),
            }
        })?;

        if base_url.cannot_be_a_base() {
            return Err(UpstreamError::Configuration {
                service: service.to_string(),
                message: format!("Base URL '{}' cannot carry a path", config.base_url),
            });
        }

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| UpstreamError::Configuration {
                service: service.to_string(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            service,
            base_url,
            credentials,
            http_client,
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Base URL with `segments` appended, each percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, UpstreamError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| UpstreamError::Configuration {
                service: self.service.to_string(),
                message: "Base URL cannot carry a path".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Start an authenticated request
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .http_client
            .request(method, url)
            .header("Accept", "application/json");

        match &self.credentials {
            Credentials::Bearer(token) => builder.bearer_auth(token),
            Credentials::BasicKey(key) => builder.basic_auth("orientation-relay", Some(key)),
        }
    }

    /// Send a request and decode a JSON body from a success response.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, UpstreamError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| UpstreamError::Decode {
                service: self.service.to_string(),
                message: e.to_string(),
            })
    }

    /// Send a request whose success response carries nothing we need.
    pub async fn execute(&self, request: RequestBuilder) -> Result<(), UpstreamError> {
        self.send(request).await.map(|_| ())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, UpstreamError> {
        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(self.service, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            return Err(UpstreamError::Status {
                service: self.service.to_string(),
                status: status.as_u16(),
                message: truncate(&message, 512),
            });
        }

        Ok(response)
    }
}

impl fmt::Debug for HttpApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpApi")
            .field("service", &self.service)
            .field("base_url", &self.base_url.as_str())
            .field("credentials", &self.credentials)
            .finish()
    }
}

fn truncate(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &message[..idx]),
        None => message.to_string(),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
