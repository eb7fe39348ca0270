//! # Order Webhook Pipeline
//!
//! Everything that happens to an inbound order event between the HTTP layer
//! receiving its raw bytes and the JSON response going back:
//!
//! 1. Signature check against the raw body ([`SignaturePolicy`])
//! 2. JSON parse
//! 3. Configuration check (the relay may be running without its upstream
//!    credentials; requests are then answered with a validation failure)
//! 4. Payload normalization and order id check
//! 5. Fan-out over the line items
//!
//! The pipeline knows nothing about HTTP; [`WebhookError`] variants are mapped
//! to status codes by the API crate.

use crate::dispatch::CustomerData;
use crate::fanout::{FanOutProcessor, ProcessingResult};
use crate::payload::normalize;
use crate::signature::{timestamp_within_window, verify};
use crate::ValidationError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Default header carrying the hex HMAC signature
pub const DEFAULT_SIGNATURE_HEADER: &str = "x-webflow-signature";

/// Default header carrying the signed timestamp
pub const DEFAULT_TIMESTAMP_HEADER: &str = "x-webflow-timestamp";

// ============================================================================
// Errors and responses
// ============================================================================

/// Reasons a webhook request does not reach the fan-out processor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WebhookError {
    /// Signature missing, wrong, or outside the replay window
    #[error("Unauthorized")]
    Unauthorized,

    /// Body is not JSON
    #[error("Invalid JSON payload: {message}")]
    MalformedJson { message: String },

    /// Payload shape or relay configuration problem
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl WebhookError {
    /// Whether the failure is reported inside a normal 200 response body
    pub fn is_business_outcome(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// JSON body returned for `POST /order`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<ProcessingResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
}

impl OrderResponse {
    /// Response for an order whose line items were all processed
    pub fn processed(
        order_id: String,
        customer_email: String,
        results: Vec<ProcessingResult>,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: true,
            order_id: Some(order_id),
            customer_email: Some(customer_email),
            results: Some(results),
            error: None,
            timestamp: Utc::now(),
            processing_time_ms: Some(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    /// `success: false` response carrying an error message
    pub fn failure(error: impl fmt::Display) -> Self {
        Self {
            success: false,
            order_id: None,
            customer_email: None,
            results: None,
            error: Some(error.to_string()),
            timestamp: Utc::now(),
            processing_time_ms: None,
        }
    }
}

// ============================================================================
// Signature policy
// ============================================================================

/// Decides whether an inbound request is authentic.
///
/// - secret configured: every request must carry a valid signature
/// - no secret, `require_signature`: every request is rejected
/// - no secret, not required: verification is skipped
#[derive(Clone)]
pub struct SignaturePolicy {
    secret: Option<String>,
    require_signature: bool,
    max_timestamp_age: Option<Duration>,
}

impl SignaturePolicy {
    /// An empty secret counts as no secret.
    pub fn new(secret: Option<String>, require_signature: bool) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
            require_signature,
            max_timestamp_age: None,
        }
    }

    /// Reject timestamps further than `max_age` from now
    pub fn with_max_timestamp_age(mut self, max_age: Duration) -> Self {
        self.max_timestamp_age = Some(max_age);
        self
    }

    /// True when a secret is configured
    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// True when requests are accepted without verification
    pub fn is_skipped(&self) -> bool {
        self.secret.is_none() && !self.require_signature
    }

    /// Check a request against the policy using the current time
    pub fn check(
        &self,
        body: &[u8],
        signature: Option<&str>,
        timestamp: Option<&str>,
    ) -> Result<(), WebhookError> {
        self.check_at(body, signature, timestamp, Utc::now())
    }

    /// Check a request against the policy at a given instant
    pub fn check_at(
        &self,
        body: &[u8],
        signature: Option<&str>,
        timestamp: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), WebhookError> {
        let Some(secret) = self.secret.as_deref() else {
            if self.require_signature {
                warn!("Rejecting webhook: no signing secret configured");
                return Err(WebhookError::Unauthorized);
            }
            return Ok(());
        };

        if !verify(body, signature, timestamp, Some(secret)) {
            warn!(
                has_signature = signature.is_some(),
                has_timestamp = timestamp.is_some(),
                "Webhook signature verification failed"
            );
            return Err(WebhookError::Unauthorized);
        }

        if let (Some(max_age), Some(timestamp)) = (self.max_timestamp_age, timestamp) {
            if !timestamp_within_window(timestamp, now, max_age) {
                warn!(timestamp = %timestamp, "Webhook timestamp outside replay window");
                return Err(WebhookError::Unauthorized);
            }
        }

        Ok(())
    }
}

impl fmt::Debug for SignaturePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignaturePolicy")
            .field("secret", &self.secret.as_ref().map(|_| "<REDACTED>"))
            .field("require_signature", &self.require_signature)
            .field("max_timestamp_age", &self.max_timestamp_age)
            .finish()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Raw inbound request as captured by the HTTP layer
#[derive(Debug, Clone, Default)]
pub struct WebhookRequest {
    pub body: Bytes,
    pub signature: Option<String>,
    pub timestamp: Option<String>,
}

impl WebhookRequest {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            signature: None,
            timestamp: None,
        }
    }

    pub fn with_signature(
        mut self,
        signature: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        self.signature = Some(signature.into());
        self.timestamp = Some(timestamp.into());
        self
    }
}

/// Orchestrates one order webhook from raw bytes to response.
#[derive(Clone, Debug)]
pub struct OrderWebhookPipeline {
    signature: SignaturePolicy,
    processor: Result<Arc<FanOutProcessor>, ValidationError>,
}

impl OrderWebhookPipeline {
    /// Pipeline with a fully configured processor
    pub fn new(signature: SignaturePolicy, processor: FanOutProcessor) -> Self {
        Self {
            signature,
            processor: Ok(Arc::new(processor)),
        }
    }

    /// Pipeline that answers every authentic request with `error`
    pub fn misconfigured(signature: SignaturePolicy, error: ValidationError) -> Self {
        Self {
            signature,
            processor: Err(error),
        }
    }

    pub fn signature_policy(&self) -> &SignaturePolicy {
        &self.signature
    }

    /// The configuration problem, if the relay is not ready
    pub fn configuration_error(&self) -> Option<&ValidationError> {
        self.processor.as_ref().err()
    }

    /// Run one request through the pipeline.
    ///
    /// # Errors
    ///
    /// - [`WebhookError::Unauthorized`] when the signature policy rejects it
    /// - [`WebhookError::MalformedJson`] when the body does not parse
    /// - [`WebhookError::Validation`] for configuration or payload problems
    #[instrument(skip(self, request), fields(body_len = request.body.len()))]
    pub async fn handle(&self, request: &WebhookRequest) -> Result<OrderResponse, WebhookError> {
        let started = Instant::now();

        self.signature.check(
            &request.body,
            request.signature.as_deref(),
            request.timestamp.as_deref(),
        )?;

        let parsed: serde_json::Value =
            serde_json::from_slice(&request.body).map_err(|e| WebhookError::MalformedJson {
                message: e.to_string(),
            })?;

        let processor = self.processor.as_ref().map_err(|e| {
            warn!(error = %e, "Order received while relay is misconfigured");
            WebhookError::Validation(e.clone())
        })?;

        let order = normalize(&parsed)?;
        debug!(
            order_id = %order.order_id_for_logging(),
            items = order.line_items.len(),
            "Order normalized"
        );

        let order_id = order.order_id.clone().ok_or(ValidationError::MissingOrderId)?;

        let customer = CustomerData::new(order.customer_email.clone(), order_id.clone())
            .with_name(order.customer_name.clone());

        let results = processor.process(&customer, &order.line_items).await;

        info!(
            order_id = %order_id,
            items = results.len(),
            succeeded = results.iter().filter(|r| r.is_success()).count(),
            "Order processed"
        );

        Ok(OrderResponse::processed(
            order_id,
            order.customer_email,
            results,
            started.elapsed(),
        ))
    }
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;
