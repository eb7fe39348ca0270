//! # Fan-out Processor
//!
//! Processes the line items of one order strictly in sequence. Every item ends
//! in exactly one [`ProcessingResult`]; a failure on one item never stops the
//! items after it.
//!
//! Per item:
//! 1. Already recorded in the idempotency store: skipped
//! 2. Product fetched (with backoff); not a workshop: skipped
//! 3. Guidelines resolved (with backoff); nothing found: error
//! 4. Notification dispatched (with backoff)
//! 5. On success the key is recorded
//!
//! Upstream failures in steps 2-4 become an `error` result carrying the
//! failure's message.

use crate::dispatch::{CustomerData, DispatchResult, NotificationDispatcher};
use crate::guidelines::{GuidelineRequest, GuidelineResolver, WorkshopClassifier};
use crate::idempotency::{IdempotencyKey, IdempotencyStore};
use crate::payload::LineItem;
use crate::retry::RetryPolicy;
use crate::UpstreamError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Reason for an item whose key was already recorded
pub const ALREADY_PROCESSED: &str = "Already processed";

/// Reason for an item whose product is not a workshop
pub const NOT_A_WORKSHOP: &str = "Not a workshop product";

/// Error for a workshop with no guideline record
pub const NO_GUIDELINES: &str = "No guidelines found for workshop";

/// Error for a line item without a product id
pub const MISSING_PRODUCT_ID: &str = "Line item is missing productId";

// ============================================================================
// Results
// ============================================================================

/// Outcome of processing one line item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemOutcome {
    #[serde(rename_all = "camelCase")]
    Success {
        email_sent: bool,
        workshop_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contact_tagged: Option<bool>,
    },
    Skipped {
        reason: String,
    },
    Error {
        error: String,
    },
}

/// Per-line-item entry of the webhook response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    /// Empty when the line item carried no product id
    pub product_id: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

impl ProcessingResult {
    /// Item delivered through the given dispatch backend
    pub fn success(product_id: &str, workshop_name: &str, dispatched: &DispatchResult) -> Self {
        let contact_tagged = dispatched.contact_tagged().then_some(true);
        Self {
            product_id: product_id.to_string(),
            outcome: ItemOutcome::Success {
                email_sent: dispatched.email_sent(),
                workshop_name: workshop_name.to_string(),
                contact_tagged,
            },
        }
    }

    pub fn skipped(product_id: &str, reason: &str) -> Self {
        Self {
            product_id: product_id.to_string(),
            outcome: ItemOutcome::Skipped {
                reason: reason.to_string(),
            },
        }
    }

    pub fn error(product_id: &str, error: impl Into<String>) -> Self {
        Self {
            product_id: product_id.to_string(),
            outcome: ItemOutcome::Error {
                error: error.into(),
            },
        }
    }

    /// Status label as it appears on the wire
    pub fn status(&self) -> &'static str {
        match self.outcome {
            ItemOutcome::Success { .. } => "success",
            ItemOutcome::Skipped { .. } => "skipped",
            ItemOutcome::Error { .. } => "error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Success { .. })
    }
}

// ============================================================================
// Processor
// ============================================================================

/// Runs every line item of an order through fetch, resolve, and dispatch.
pub struct FanOutProcessor {
    resolver: GuidelineResolver,
    dispatcher: Arc<dyn NotificationDispatcher>,
    idempotency: Arc<dyn IdempotencyStore>,
    retry_policy: RetryPolicy,
    classifier: WorkshopClassifier,
}

impl FanOutProcessor {
    pub fn new(
        resolver: GuidelineResolver,
        dispatcher: Arc<dyn NotificationDispatcher>,
        idempotency: Arc<dyn IdempotencyStore>,
    ) -> Self {
        Self {
            resolver,
            dispatcher,
            idempotency,
            retry_policy: RetryPolicy::default(),
            classifier: WorkshopClassifier::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_classifier(mut self, classifier: WorkshopClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Process every line item in order, one at a time.
    ///
    /// The customer's order id and email form the idempotency key together
    /// with each item's product id.
    #[instrument(
        skip(self, customer, line_items),
        fields(order_id = %customer.order_id, items = line_items.len())
    )]
    pub async fn process(
        &self,
        customer: &CustomerData,
        line_items: &[LineItem],
    ) -> Vec<ProcessingResult> {
        let mut results = Vec::with_capacity(line_items.len());

        for item in line_items {
            let result = self.process_item(customer, item).await;
            debug!(
                product_id = %result.product_id,
                status = result.status(),
                "Line item processed"
            );
            results.push(result);
        }

        results
    }

    async fn process_item(&self, customer: &CustomerData, item: &LineItem) -> ProcessingResult {
        let Some(product_id) = item.product_id.as_deref() else {
            warn!("Line item without product id");
            return ProcessingResult::error("", MISSING_PRODUCT_ID);
        };

        let key = IdempotencyKey::derive(&customer.order_id, &customer.email, product_id);
        if self.idempotency.has(&key).await {
            info!(product_id = %product_id, "Duplicate line item; already processed");
            return ProcessingResult::skipped(product_id, ALREADY_PROCESSED);
        }

        match self.deliver(customer, item, product_id).await {
            Ok(result) => {
                if result.is_success() {
                    self.idempotency.record(key, result.clone()).await;
                }
                result
            }
            Err(e) => {
                warn!(
                    product_id = %product_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Line item failed"
                );
                ProcessingResult::error(product_id, e.to_string())
            }
        }
    }

    async fn deliver(
        &self,
        customer: &CustomerData,
        item: &LineItem,
        product_id: &str,
    ) -> Result<ProcessingResult, UpstreamError> {
        let product = self
            .retry_policy
            .run(|| self.resolver.fetch_product(product_id))
            .await?;

        if !self.classifier.is_workshop_product(&product) {
            return Ok(ProcessingResult::skipped(product_id, NOT_A_WORKSHOP));
        }

        let mut request = GuidelineRequest::new(product_id);
        request.cms_item_id = item.cms_item_id.clone();
        request.fallback_name = item.name.clone();

        let resolved = self
            .retry_policy
            .run(|| self.resolver.resolve_for_product(&product, &request))
            .await?;

        let Some(guidelines) = resolved else {
            return Ok(ProcessingResult::error(product_id, NO_GUIDELINES));
        };

        let dispatched = self
            .retry_policy
            .run(|| self.dispatcher.send(&customer.email, &guidelines, customer))
            .await?;

        info!(
            product_id = %product_id,
            workshop = %guidelines.name,
            backend = self.dispatcher.backend_name(),
            "Orientation dispatched"
        );
        Ok(ProcessingResult::success(product_id, &guidelines.name, &dispatched))
    }
}

impl std::fmt::Debug for FanOutProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOutProcessor")
            .field("resolver", &self.resolver)
            .field("backend", &self.dispatcher.backend_name())
            .field("retry_policy", &self.retry_policy)
            .field("classifier", &self.classifier)
            .finish()
    }
}

#[cfg(test)]
#[path = "fanout_tests.rs"]
mod tests;
