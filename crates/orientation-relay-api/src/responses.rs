//! Response types for the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Service name reported by the health endpoint
pub const SERVICE_NAME: &str = "orientation-relay";

/// Health check response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    /// `"enabled"` when a signing secret is configured, else `"disabled"`
    pub signature: String,
}

impl HealthResponse {
    pub fn new(signature_enabled: bool) -> Self {
        Self {
            ok: true,
            timestamp: Utc::now(),
            service: SERVICE_NAME.to_string(),
            signature: if signature_enabled {
                "enabled".to_string()
            } else {
                "disabled".to_string()
            },
        }
    }
}
