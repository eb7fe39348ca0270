//! # Orientation Relay Service
//!
//! Binary entry point for the Orientation Relay HTTP service.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes logging
//! - Builds the order webhook pipeline
//! - Starts the HTTP server from orientation-relay-api

use orientation_relay_api::{
    build_pipeline, start_server, ConfigError, LoggingConfig, ServiceConfig, ServiceError,
};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable naming an extra configuration file
const CONFIG_FILE_ENV: &str = "RELAY_CONFIG_FILE";

/// Prefix for configuration environment variables
const ENV_PREFIX: &str = "RELAY";

#[tokio::main]
async fn main() {
    let explicit_path = std::env::var(CONFIG_FILE_ENV)
        .ok()
        .filter(|path| !path.is_empty());

    // Logging needs the configuration, so a load failure is reported once the
    // subscriber exists.
    let loaded = load_config(explicit_path.as_deref());
    let logging = loaded
        .as_ref()
        .map(|config| config.logging.clone())
        .unwrap_or_default();
    init_tracing(&logging);

    info!("Starting Orientation Relay Service");
    if let Some(path) = &explicit_path {
        info!(path = %path, "Loaded configuration from explicit path");
    }

    let service_config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Service configuration is invalid; aborting");
            std::process::exit(ServiceError::from(e).exit_code());
        }
    };

    let pipeline = match build_pipeline(&service_config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!(error = %e, "Failed to build order pipeline; aborting");
            std::process::exit(ServiceError::from(e).exit_code());
        }
    };

    info!(
        host = %service_config.server.host,
        port = service_config.server.port,
        "Starting HTTP server"
    );

    if let Err(e) = start_server(service_config, pipeline).await {
        error!("Failed to start server: {}", e);
        std::process::exit(e.exit_code());
    }
}

/// Load configuration.
///
/// Sources, later overriding earlier:
///  1. /etc/orientation-relay/service.yaml
///  2. ./config/service.yaml
///  3. `explicit_path` (required when given; format from its extension)
///  4. Environment variables prefixed `RELAY__`, e.g. `RELAY__SERVER__PORT=9090`
///
/// Absent files fall back to serde defaults. A malformed file, a value that
/// cannot be coerced, or a structurally invalid result is an error.
fn load_config(explicit_path: Option<&str>) -> Result<ServiceConfig, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/orientation-relay/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Some(path) = explicit_path {
        builder = builder.add_source(config::File::with_name(path).required(true));
    }

    let service_config: ServiceConfig = builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .and_then(|config| config.try_deserialize())
        .map_err(|e| ConfigError::Invalid {
            message: e.to_string(),
        })?;

    service_config.validate()?;
    Ok(service_config)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "orientation_relay_service={level},orientation_relay_api={level},orientation_relay_core={level},tower_http=debug",
            level = logging.level
        )
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json_format {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
