//! # Structured Logging
//!
//! Subscriber setup plus the span and audit macros used by the request path.
//!
//! Audit records are ordinary `tracing` events emitted with
//! `target: "audit"`, so they can be routed with a filter directive such as
//! `RUST_LOG=info,audit=info` and shipped separately from operational logs.

use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{Error, Result};

/// Create a tracing span for request tracking.
///
/// ```rust,ignore
/// let span = request_span!("POST", "/acme/new-reg");
/// let span = request_span!("POST", "/acme/new-reg", requester = tracing::field::Empty);
/// ```
#[macro_export]
macro_rules! request_span {
    ($method:expr, $path:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            requester = tracing::field::Empty
        )
    };
    ($method:expr, $path:expr, $($field:tt)*) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Emit an audit record.
///
/// ```rust,ignore
/// audit!(client_addr = %addr, registration = id, "Certificate request");
/// ```
#[macro_export]
macro_rules! audit {
    ($($arg:tt)+) => {
        tracing::info!(target: "audit", $($arg)+)
    };
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json_logging {
        builder.json().flatten_event(true).try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| Error::internal(format!("Failed to install log subscriber: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        server_address = %config.server.bind_address(),
        base_url = %config.wfe.base_url,
        tls_enabled = config.server.tls.is_some(),
        subscriber_agreement = %config.wfe.subscriber_agreement_url,
        allow_origins = ?config.wfe.allow_origins,
        nonce_capacity = config.nonce.capacity,
        nonce_ttl_seconds = config.nonce.ttl_seconds,
        max_body_size = config.server.max_body_size,
        metrics_enabled = %config.observability.enable_metrics,
        "ACME web front end configuration"
    );
}
