//! # Orientation Relay HTTP Service
//!
//! HTTP surface of the relay:
//! - `POST /order` receives storefront order webhooks and runs them through
//!   the [`OrderWebhookPipeline`]
//! - `GET /health` reports liveness and whether signatures are enforced
//!
//! Every response carries the security headers in [`SECURITY_HEADERS`]. A
//! panic inside a handler is caught and reported as a generic processing
//! error so the storefront does not retry the delivery.

pub mod config;
pub mod errors;
pub mod pipeline;
pub mod responses;

pub use config::{
    AudienceConfig, EmailConfig, LoggingConfig, NotificationBackend, NotificationConfig,
    RelayConfig, RetryConfig, ServerConfig, ServiceConfig, WebhookConfig,
};
pub use errors::{ConfigError, OrderHandlerError, ServiceError, INTERNAL_ERROR_MESSAGE};
pub use pipeline::{build_pipeline, build_pipeline_with_store};
pub use responses::HealthResponse;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use bytes::Bytes;
use orientation_relay_core::webhook::WebhookRequest;
use orientation_relay_core::{OrderResponse, OrderWebhookPipeline};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, instrument};

/// Headers attached to every response
pub const SECURITY_HEADERS: [(HeaderName, &str); 3] = [
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
];

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone, Debug)]
pub struct AppState {
    /// Configuration for the service
    pub config: Arc<ServiceConfig>,

    /// Order webhook pipeline
    pub pipeline: Arc<OrderWebhookPipeline>,
}

impl AppState {
    pub fn new(config: ServiceConfig, pipeline: OrderWebhookPipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let max_body_size = state.config.server.max_body_size;

    let [nosniff, frame_options, xss_protection] =
        SECURITY_HEADERS.map(|(name, value)| {
            SetResponseHeaderLayer::overriding(name, HeaderValue::from_static(value))
        });

    Router::new()
        .route("/order", post(handle_order))
        .route("/health", get(handle_health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(nosniff)
                .layer(frame_options)
                .layer(xss_protection)
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(DefaultBodyLimit::max(max_body_size))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server
pub async fn start_server(
    config: ServiceConfig,
    pipeline: OrderWebhookPipeline,
) -> Result<(), ServiceError> {
    let host = config.server.host.clone();
    let port = config.server.port;
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);

    let app = create_router(AppState::new(config, pipeline));

    let address = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!("Starting HTTP server on {}", address);

    let shutdown_signal = async move {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C signal handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM signal handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!(
                    "Received SIGINT (Ctrl+C), initiating graceful shutdown with {}s timeout",
                    shutdown_timeout.as_secs()
                );
            },
            _ = terminate => {
                info!(
                    "Received SIGTERM, initiating graceful shutdown with {}s timeout",
                    shutdown_timeout.as_secs()
                );
            },
        }
    };

    // In-flight requests finish; new connections are refused once the signal fires
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        })?;

    info!("HTTP server shutdown complete");
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Handle a storefront order webhook
///
/// The body is taken as raw bytes so the signature is checked against exactly
/// what was sent.
#[instrument(skip(state, headers, body), fields(body_len = body.len()))]
pub async fn handle_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<OrderResponse>, OrderHandlerError> {
    let webhook = &state.config.webhook;

    let request = WebhookRequest {
        body,
        signature: header_value(&headers, &webhook.signature_header),
        timestamp: header_value(&headers, &webhook.timestamp_header),
    };

    let response = state.pipeline.handle(&request).await?;

    Ok(Json(response))
}

/// Liveness check
#[instrument(skip(state))]
pub async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::new(
        state.pipeline.signature_policy().is_enabled(),
    ))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else {
        "unknown panic payload"
    };

    error!(panic = %detail, "Request handler panicked");

    (
        StatusCode::OK,
        Json(OrderResponse::failure(INTERNAL_ERROR_MESSAGE)),
    )
        .into_response()
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
