//! # Orientation Relay Core
//!
//! Core business logic for the Orientation Relay webhook service.
//!
//! The relay receives order events from a headless storefront, resolves each
//! purchased workshop into its orientation guidelines through the content API,
//! and forwards a notification through the configured delivery backend.
//!
//! ## Architecture
//!
//! Business logic depends only on trait abstractions:
//! - [`guidelines::ContentApi`] for product and collection reads
//! - [`dispatch::NotificationDispatcher`] for outbound notifications
//! - [`idempotency::IdempotencyStore`] for duplicate suppression
//!
//! The HTTP implementations of the upstream contracts live in [`clients`] and
//! are injected at runtime by the service binary.
//!
//! ## Usage
//!
//! ```rust
//! use orientation_relay_core::signature::{sign, verify};
//!
//! let body = br#"{"orderId":"o1"}"#;
//! let signature = sign("secret", "1700000000", body);
//! assert!(verify(body, Some(&signature), Some("1700000000"), Some("secret")));
//! ```

use serde::{Deserialize, Serialize};

/// Standard result type for relay operations that can fail upstream
pub type RelayResult<T> = Result<T, UpstreamError>;

// ============================================================================
// Error Types
// ============================================================================

/// Error type for payload and configuration shape problems.
///
/// The display text of these variants is returned verbatim to the webhook
/// caller in the `error` field of a `success: false` response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Invalid or missing customer email")]
    InvalidCustomerEmail,

    #[error("No items in order")]
    NoLineItems,

    #[error("Missing order id")]
    MissingOrderId,

    #[error("Order payload must be a JSON object")]
    NotAnObject,

    #[error("Missing required configuration: {key}")]
    MissingConfiguration { key: String },

    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },
}

/// Failure talking to one of the external APIs (content, email, audience).
///
/// Classified by [`UpstreamError::is_retryable`]: rate limiting, server
/// errors and transport failures are retryable, everything else is not.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// The upstream answered with a non-success HTTP status.
    #[error("{service} returned HTTP {status}: {message}")]
    Status {
        service: String,
        status: u16,
        message: String,
    },

    /// The request never produced a response (connect, reset, timeout).
    #[error("{service} request failed: {message}")]
    Transport {
        service: String,
        message: String,
        retryable: bool,
    },

    /// The upstream answered but the body was not what we expected.
    #[error("{service} response could not be decoded: {message}")]
    Decode { service: String, message: String },

    /// The client could not be built or a request could not be formed.
    #[error("{service} client configuration error: {message}")]
    Configuration { service: String, message: String },
}

impl UpstreamError {
    /// Build an error from a `reqwest` failure, classifying transport faults.
    pub fn from_reqwest(service: &str, error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::Status {
                service: service.to_string(),
                status: status.as_u16(),
                message: error.to_string(),
            };
        }

        if error.is_decode() {
            return Self::Decode {
                service: service.to_string(),
                message: error.to_string(),
            };
        }

        if error.is_builder() {
            return Self::Configuration {
                service: service.to_string(),
                message: error.to_string(),
            };
        }

        let retryable = error.is_timeout() || error.is_connect() || error.is_request();
        Self::Transport {
            service: service.to_string(),
            message: error.to_string(),
            retryable,
        }
    }

    /// HTTP status code returned by the upstream, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if the failure is transient and the call may succeed on retry
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Transport { retryable, .. } => *retryable,
            Self::Decode { .. } => false,
            Self::Configuration { .. } => false,
        }
    }

    /// Check if the upstream reported that the record does not exist
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

// ============================================================================
// Module declarations
// ============================================================================

/// Backoff executor for transient upstream failures
pub mod retry;

/// Timestamp-bound HMAC webhook signature verification
pub mod signature;

/// Order payload normalization across historical envelope shapes
pub mod payload;

/// Workshop guideline resolution from product and collection records
pub mod guidelines;

/// Process-local idempotency cache
pub mod idempotency;

/// Notification dispatch (transactional email or marketing audience)
pub mod dispatch;

/// Sequential per-line-item processing
pub mod fanout;

/// End-to-end webhook pipeline used by the HTTP layer
pub mod webhook;

/// HTTP clients for the external APIs
pub mod clients;

pub use dispatch::{CustomerData, DispatchResult, NotificationDispatcher};
pub use fanout::{FanOutProcessor, ItemOutcome, ProcessingResult};
pub use guidelines::{ContentApi, GuidelineResolver, ResolvedGuidelines, WorkshopClassifier};
pub use idempotency::{IdempotencyKey, IdempotencyStore, MemoryIdempotencyCache};
pub use payload::{normalize, LineItem, NormalizedOrder};
pub use retry::{RetryPolicy, Retryable};
pub use webhook::{OrderResponse, OrderWebhookPipeline, SignaturePolicy, WebhookError};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
