//! Error types for the HTTP service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use orientation_relay_core::{OrderResponse, UpstreamError, WebhookError};
use tracing::warn;

/// Message returned to callers for any unexpected failure
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal processing error";

/// Order handler errors with HTTP status code mapping
///
/// - `401 Unauthorized`: signature policy rejected the request; no detail
/// - `400 Bad Request`: body is not JSON
/// - `200 OK` with `success: false`: payload validation and relay
///   configuration. The storefront treats non-2xx responses as delivery
///   failures and retries them, which would not help here.
///
/// Handler panics never reach this type; the panic layer answers them with
/// [`INTERNAL_ERROR_MESSAGE`].
#[derive(Debug, thiserror::Error)]
pub enum OrderHandlerError {
    #[error(transparent)]
    Pipeline(#[from] WebhookError),
}

impl OrderHandlerError {
    /// HTTP status the error is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Pipeline(WebhookError::Unauthorized) => StatusCode::UNAUTHORIZED,
            Self::Pipeline(WebhookError::MalformedJson { .. }) => StatusCode::BAD_REQUEST,
            Self::Pipeline(WebhookError::Validation(_)) => StatusCode::OK,
        }
    }
}

impl IntoResponse for OrderHandlerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match self {
            Self::Pipeline(WebhookError::Unauthorized) => OrderResponse::failure("Unauthorized"),
            Self::Pipeline(WebhookError::MalformedJson { ref message }) => {
                warn!(error = %message, "Rejected order webhook with invalid JSON");
                OrderResponse::failure("Invalid JSON payload")
            }
            Self::Pipeline(WebhookError::Validation(ref e)) => {
                warn!(error = %e, "Order webhook failed validation");
                OrderResponse::failure(e)
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl ServiceError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BindFailed { .. } => 1,
            Self::ServerFailed { .. } => 2,
            Self::Configuration(_) => 3,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Failed to create {service} client: {source}")]
    Client {
        service: &'static str,
        #[source]
        source: UpstreamError,
    },
}
