//! Common test utilities for orientation-relay integration tests
//!
//! Upstream APIs are served by `wiremock`; the router is built from a
//! [`ServiceConfig`] exactly as the service binary does.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use orientation_relay_api::{build_pipeline, create_router, AppState, ServiceConfig};
use orientation_relay_core::guidelines::SERVICE_PRODUCT_TYPE_ID;
use orientation_relay_core::signature::sign;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SECRET: &str = "whsec_integration";
pub const TIMESTAMP: &str = "1700000000";
pub const SITE_ID: &str = "site-1";

// ============================================================================
// Upstream doubles
// ============================================================================

/// Mock servers standing in for the content and notification APIs
pub struct Upstreams {
    pub content: MockServer,
    pub notification: MockServer,
}

impl Upstreams {
    pub async fn start() -> Self {
        Self {
            content: MockServer::start().await,
            notification: MockServer::start().await,
        }
    }

    /// Serve a product record for `product_id`
    pub async fn product(&self, product_id: &str, field_data: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/sites/{}/products/{}", SITE_ID, product_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "product": { "id": product_id, "fieldData": field_data },
                "skus": []
            })))
            .mount(&self.content)
            .await;
    }

    /// Serve a workshop product with the given name and date
    pub async fn workshop(&self, product_id: &str, name: &str, date: &str) {
        self.product(
            product_id,
            json!({
                "name": name,
                "date": date,
                "location": "Studio A",
                "product-type": SERVICE_PRODUCT_TYPE_ID,
                "email-content": "<p>Wear old clothes.</p>"
            }),
        )
        .await;
    }

    /// Requests the notification server received, parsed as JSON
    pub async fn notification_bodies(&self) -> Vec<Value> {
        self.notification
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|request| serde_json::from_slice(&request.body).ok())
            .collect()
    }
}

// ============================================================================
// Configuration and app
// ============================================================================

/// Fully configured email relay pointing at the mock upstreams
pub fn email_config(upstreams: &Upstreams) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.webhook.secret = Some(SECRET.to_string());
    config.relay.site_id = Some(SITE_ID.to_string());
    config.relay.content_api_token = Some("content-token".to_string());
    config.relay.content_api_base_url = upstreams.content.uri();
    config.relay.retry.base_delay_ms = 1;
    config.relay.retry.max_delay_ms = 5;
    config.relay.retry.max_jitter_ms = 0;
    config.notification.email.api_base_url = upstreams.notification.uri();
    config.notification.email.api_key = Some("re_test".to_string());
    config.notification.email.from_address = Some("Workshops <hello@example.com>".to_string());
    config
}

pub fn app(config: ServiceConfig) -> Router {
    let pipeline = build_pipeline(&config).unwrap();
    create_router(AppState::new(config, pipeline))
}

// ============================================================================
// Requests
// ============================================================================

pub fn order_body(order_id: &str, email: &str, product_ids: &[&str]) -> Value {
    let line_items: Vec<Value> = product_ids
        .iter()
        .map(|id| json!({ "productId": id }))
        .collect();

    json!({
        "payload": {
            "orderId": order_id,
            "customer": { "email": email },
            "lineItems": line_items
        }
    })
}

pub fn signed_order(body: &Value) -> Request<Body> {
    let raw = serde_json::to_vec(body).unwrap();
    let signature = sign(SECRET, TIMESTAMP, &raw);

    Request::builder()
        .method("POST")
        .uri("/order")
        .header("content-type", "application/json")
        .header("x-webflow-signature", signature)
        .header("x-webflow-timestamp", TIMESTAMP)
        .body(Body::from(raw))
        .unwrap()
}

pub fn unsigned_order(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/order")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> (u16, Value, Response<Body>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status().as_u16();
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json, Response::from_parts(parts, Body::empty()))
}
