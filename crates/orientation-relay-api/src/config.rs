//! Configuration types for the HTTP service
//!
//! Every field carries a serde default so a partially configured (or entirely
//! unconfigured) environment still deserializes. Structural problems are
//! caught by [`ServiceConfig::validate`]; missing upstream credentials are not
//! structural and are reported per request instead.

use crate::errors::ConfigError;
use axum::http::HeaderName;
use orientation_relay_core::clients::{DEFAULT_CONTENT_API_URL, DEFAULT_EMAIL_API_URL};
use orientation_relay_core::guidelines::SERVICE_PRODUCT_TYPE_ID;
use orientation_relay_core::webhook::{DEFAULT_SIGNATURE_HEADER, DEFAULT_TIMESTAMP_HEADER};
use orientation_relay_core::{RetryPolicy, SignaturePolicy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Inbound webhook authentication
    pub webhook: WebhookConfig,

    /// Content API access and workshop classification
    pub relay: RelayConfig,

    /// Outbound notification backend
    pub notification: NotificationConfig,
}

impl ServiceConfig {
    /// Check structural validity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for values that can never work, such as
    /// a zero port or a header name that is not a valid HTTP header.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(invalid("server.port must be non-zero"));
        }

        if self.server.max_body_size == 0 {
            return Err(invalid("server.max_body_size must be non-zero"));
        }

        for (key, name) in [
            ("webhook.signature_header", &self.webhook.signature_header),
            ("webhook.timestamp_header", &self.webhook.timestamp_header),
        ] {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                return Err(invalid(&format!("{} '{}' is not a valid header name", key, name)));
            }
        }

        if self.relay.request_timeout_seconds == 0 {
            return Err(invalid("relay.request_timeout_seconds must be non-zero"));
        }

        if self.relay.retry.max_delay_ms < self.relay.retry.base_delay_ms {
            return Err(invalid(
                "relay.retry.max_delay_ms must not be smaller than relay.retry.base_delay_ms",
            ));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid {
        message: message.to_string(),
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Inbound webhook authentication settings
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebhookConfig {
    /// Header carrying the hex HMAC signature
    pub signature_header: String,

    /// Header carrying the signed timestamp
    pub timestamp_header: String,

    /// Shared signing secret
    pub secret: Option<String>,

    /// Reject every request when no secret is configured
    pub require_signature: bool,

    /// Reject timestamps older (or newer) than this many seconds
    pub max_timestamp_age_seconds: Option<u64>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            signature_header: DEFAULT_SIGNATURE_HEADER.to_string(),
            timestamp_header: DEFAULT_TIMESTAMP_HEADER.to_string(),
            secret: None,
            require_signature: true,
            max_timestamp_age_seconds: None,
        }
    }
}

impl WebhookConfig {
    /// Signature policy for the pipeline
    pub fn signature_policy(&self) -> SignaturePolicy {
        let policy = SignaturePolicy::new(self.secret.clone(), self.require_signature);
        match self.max_timestamp_age_seconds {
            Some(seconds) => policy.with_max_timestamp_age(Duration::from_secs(seconds)),
            None => policy,
        }
    }
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("signature_header", &self.signature_header)
            .field("timestamp_header", &self.timestamp_header)
            .field("secret", &redacted(&self.secret))
            .field("require_signature", &self.require_signature)
            .field("max_timestamp_age_seconds", &self.max_timestamp_age_seconds)
            .finish()
    }
}

/// Content API access and workshop classification
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// Storefront site the products belong to
    pub site_id: Option<String>,

    pub content_api_base_url: String,

    pub content_api_token: Option<String>,

    /// Collection holding workshop guideline records
    pub collection_id: Option<String>,

    /// Product type id that marks a workshop
    pub workshop_type_id: Option<String>,

    /// Category id that marks a workshop
    pub workshop_category_id: Option<String>,

    /// Per-attempt timeout for every upstream call
    pub request_timeout_seconds: u64,

    pub retry: RetryConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            site_id: None,
            content_api_base_url: DEFAULT_CONTENT_API_URL.to_string(),
            content_api_token: None,
            collection_id: None,
            workshop_type_id: Some(SERVICE_PRODUCT_TYPE_ID.to_string()),
            workshop_category_id: None,
            request_timeout_seconds: 5,
            retry: RetryConfig::default(),
        }
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("site_id", &self.site_id)
            .field("content_api_base_url", &self.content_api_base_url)
            .field("content_api_token", &redacted(&self.content_api_token))
            .field("collection_id", &self.collection_id)
            .field("workshop_type_id", &self.workshop_type_id)
            .field("workshop_category_id", &self.workshop_category_id)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Backoff settings for upstream calls
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
            max_jitter_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
        .with_max_jitter(Duration::from_millis(self.max_jitter_ms))
    }
}

/// Which dispatcher delivers the orientation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationBackend {
    #[default]
    Email,
    Audience,
}

/// Outbound notification settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct NotificationConfig {
    pub backend: NotificationBackend,
    pub email: EmailConfig,
    pub audience: AudienceConfig,
}

/// Transactional email provider settings
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmailConfig {
    pub api_base_url: String,
    pub api_key: Option<String>,
    pub from_address: Option<String>,
    /// Provider-side template; HTML is rendered locally when unset
    pub template_id: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_EMAIL_API_URL.to_string(),
            api_key: None,
            from_address: None,
            template_id: None,
        }
    }
}

impl fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &redacted(&self.api_key))
            .field("from_address", &self.from_address)
            .field("template_id", &self.template_id)
            .finish()
    }
}

/// Marketing audience settings
#[derive(Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AudienceConfig {
    /// Derived from the API key's datacenter suffix when unset
    pub api_base_url: Option<String>,
    pub api_key: Option<String>,
    pub audience_id: Option<String>,
    pub tag: Option<String>,
}

impl fmt::Debug for AudienceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudienceConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &redacted(&self.api_key))
            .field("audience_id", &self.audience_id)
            .field("tag", &self.tag)
            .finish()
    }
}

fn redacted(value: &Option<String>) -> Option<&'static str> {
    value.as_ref().map(|_| "<REDACTED>")
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
