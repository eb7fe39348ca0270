//! Assembles an [`OrderWebhookPipeline`] from service configuration.
//!
//! Missing business settings (site id, API keys, sender address) do not stop
//! the service from starting. The pipeline is built in a misconfigured state
//! and answers each authentic request with the missing key instead.

use crate::config::{NotificationBackend, ServiceConfig};
use crate::errors::ConfigError;
use orientation_relay_core::clients::{
    audience_base_url_from_key, AudienceClient, ClientConfig, ContentClient, EmailClient,
};
use orientation_relay_core::dispatch::{AudienceDispatcher, EmailDispatcher, EmailSettings};
use orientation_relay_core::{
    FanOutProcessor, GuidelineResolver, IdempotencyStore, MemoryIdempotencyCache,
    NotificationDispatcher, OrderWebhookPipeline, ValidationError, WorkshopClassifier,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Build the pipeline with a fresh in-memory idempotency cache.
///
/// # Errors
///
/// Returns [`ConfigError::Client`] when an HTTP client cannot be constructed,
/// for example because a base URL does not parse.
pub fn build_pipeline(config: &ServiceConfig) -> Result<OrderWebhookPipeline, ConfigError> {
    build_pipeline_with_store(config, Arc::new(MemoryIdempotencyCache::new()))
}

/// Build the pipeline around an existing idempotency store.
pub fn build_pipeline_with_store(
    config: &ServiceConfig,
    idempotency: Arc<dyn IdempotencyStore>,
) -> Result<OrderWebhookPipeline, ConfigError> {
    let policy = config.webhook.signature_policy();
    if policy.is_skipped() {
        warn!("No webhook secret configured and signatures not required; verification is disabled");
    }

    let processor = match build_processor(config, idempotency)? {
        Ok(processor) => processor,
        Err(missing) => {
            warn!(error = %missing, "Relay is not fully configured; orders will be rejected");
            return Ok(OrderWebhookPipeline::misconfigured(policy, missing));
        }
    };

    info!(
        backend = ?config.notification.backend,
        signature_enabled = policy.is_enabled(),
        "Order pipeline ready"
    );

    Ok(OrderWebhookPipeline::new(policy, processor))
}

/// Outer error aborts startup; inner error marks the relay as misconfigured.
fn build_processor(
    config: &ServiceConfig,
    idempotency: Arc<dyn IdempotencyStore>,
) -> Result<Result<FanOutProcessor, ValidationError>, ConfigError> {
    let relay = &config.relay;
    let timeout = Duration::from_secs(relay.request_timeout_seconds);

    let site_id = match required(&relay.site_id, "relay.site_id") {
        Ok(value) => value,
        Err(e) => return Ok(Err(e)),
    };
    let token = match required(&relay.content_api_token, "relay.content_api_token") {
        Ok(value) => value,
        Err(e) => return Ok(Err(e)),
    };

    let dispatcher = match build_dispatcher(config, timeout)? {
        Ok(dispatcher) => dispatcher,
        Err(e) => return Ok(Err(e)),
    };

    let content = ContentClient::new(
        &ClientConfig::new(&relay.content_api_base_url).with_timeout(timeout),
        token,
    )
    .map_err(|source| ConfigError::Client {
        service: "content",
        source,
    })?;

    let resolver = GuidelineResolver::new(Arc::new(content), site_id, relay.collection_id.clone());
    let classifier = WorkshopClassifier::new(
        relay.workshop_type_id.clone(),
        relay.workshop_category_id.clone(),
    );

    Ok(Ok(FanOutProcessor::new(resolver, dispatcher, idempotency)
        .with_retry_policy(relay.retry.to_policy())
        .with_classifier(classifier)))
}

fn build_dispatcher(
    config: &ServiceConfig,
    timeout: Duration,
) -> Result<Result<Arc<dyn NotificationDispatcher>, ValidationError>, ConfigError> {
    let notification = &config.notification;

    match notification.backend {
        NotificationBackend::Email => {
            let email = &notification.email;
            let api_key = match required(&email.api_key, "notification.email.api_key") {
                Ok(value) => value,
                Err(e) => return Ok(Err(e)),
            };
            let from_address =
                match required(&email.from_address, "notification.email.from_address") {
                    Ok(value) => value,
                    Err(e) => return Ok(Err(e)),
                };

            let client = EmailClient::new(
                &ClientConfig::new(&email.api_base_url).with_timeout(timeout),
                api_key,
            )
            .map_err(|source| ConfigError::Client {
                service: "email",
                source,
            })?;

            let settings = EmailSettings {
                from_address,
                template_id: email.template_id.clone().filter(|id| !id.is_empty()),
            };
            Ok(Ok(Arc::new(EmailDispatcher::new(Arc::new(client), settings))))
        }
        NotificationBackend::Audience => {
            let audience = &notification.audience;
            let api_key = match required(&audience.api_key, "notification.audience.api_key") {
                Ok(value) => value,
                Err(e) => return Ok(Err(e)),
            };
            let audience_id =
                match required(&audience.audience_id, "notification.audience.audience_id") {
                    Ok(value) => value,
                    Err(e) => return Ok(Err(e)),
                };

            let base_url = match audience
                .api_base_url
                .clone()
                .filter(|url| !url.is_empty())
                .or_else(|| audience_base_url_from_key(&api_key))
            {
                Some(url) => url,
                None => return Ok(Err(missing("notification.audience.api_base_url"))),
            };

            let client = AudienceClient::new(
                &ClientConfig::new(base_url).with_timeout(timeout),
                api_key,
                audience_id,
            )
            .map_err(|source| ConfigError::Client {
                service: "audience",
                source,
            })?;

            Ok(Ok(Arc::new(AudienceDispatcher::new(
                Arc::new(client),
                audience.tag.clone(),
            ))))
        }
    }
}

fn required(value: &Option<String>, key: &str) -> Result<String, ValidationError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| missing(key))
}

fn missing(key: &str) -> ValidationError {
    ValidationError::MissingConfiguration {
        key: key.to_string(),
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
