//! # Configuration Settings
//!
//! Defines the configuration structure for the ACME web front end.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;
use validator::Validate;

use super::tls::ListenerTlsConfig;
use crate::errors::{Error, Result};

/// Prefix for environment overrides, e.g. `ACME_WFE__SERVER__PORT`.
pub const ENV_PREFIX: &str = "ACME_WFE";
const ENV_SEPARATOR: &str = "__";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// Protocol surface configuration
    #[validate(nested)]
    pub wfe: WfeConfig,

    /// Anti-replay nonce bounds
    #[validate(nested)]
    pub nonce: NonceConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load defaults, then the optional file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR)
                .list_separator(",")
                .with_list_parse_key("wfe.allow_origins")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;
        self.validate_custom()?;
        Ok(())
    }

    /// Custom validation logic that goes beyond what the validator crate can do
    fn validate_custom(&self) -> Result<()> {
        if self.observability.enable_metrics
            && self.observability.metrics_port == self.server.port
        {
            return Err(Error::config("Server and metrics ports cannot be the same"));
        }

        let base = Url::parse(&self.wfe.base_url)
            .map_err(|e| {
                Error::config(format!("Invalid base URL '{}': {}", self.wfe.base_url, e))
            })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(Error::config("Base URL must start with 'http://' or 'https://'"));
        }
        if base.path() != "/" || base.query().is_some() {
            return Err(Error::config("Base URL must not carry a path or query"));
        }

        if let Some(tls) = &self.server.tls {
            tls.validate()?;
        }

        Ok(())
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// Server port
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Maximum request body size in bytes
    #[validate(range(min = 1024, message = "Max body size must be at least 1KB"))]
    pub max_body_size: usize,

    /// Upper bound on each backend call in seconds
    #[validate(range(
        min = 1,
        max = 300,
        message = "Backend timeout must be between 1 and 300 seconds"
    ))]
    pub backend_timeout_seconds: u64,

    /// Serve HTTPS when present
    pub tls: Option<ListenerTlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            max_body_size: 1024 * 1024, // 1MB
            backend_timeout_seconds: 30,
            tls: None,
        }
    }
}

impl ServerConfig {
    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get backend timeout as Duration
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_seconds)
    }
}

/// Protocol surface: URLs advertised to clients, CORS and caching.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct WfeConfig {
    /// Scheme and authority every absolute URL is built from
    #[validate(length(min = 1, message = "Base URL cannot be empty"))]
    pub base_url: String,

    /// Current subscriber agreement; empty disables the terms link
    pub subscriber_agreement_url: String,

    /// Origins allowed to make cross-origin requests, `*` for any
    pub allow_origins: Vec<String>,

    /// `max-age` for issued certificates
    pub cert_cache_seconds: u64,

    /// `max-age` for the index page
    pub index_cache_seconds: u64,

    /// `max-age` for the issuer certificate
    pub issuer_cache_seconds: u64,

    /// PEM or DER issuer certificate served at `/acme/issuer-cert`
    pub issuer_cert_path: Option<String>,
}

impl Default for WfeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000".to_string(),
            subscriber_agreement_url: "http://localhost:4000/terms/v1".to_string(),
            allow_origins: vec![],
            cert_cache_seconds: 21600,  // 6 hours
            index_cache_seconds: 86400, // 1 day
            issuer_cache_seconds: 172800,
            issuer_cert_path: None,
        }
    }
}

impl WfeConfig {
    /// Base URL without a trailing slash
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Anti-replay nonce bounds
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct NonceConfig {
    /// Outstanding nonces kept before the oldest is evicted
    #[validate(range(min = 1, message = "Nonce capacity must be at least 1"))]
    pub capacity: usize,

    /// Seconds a nonce stays valid
    #[validate(range(
        min = 1,
        max = 86400,
        message = "Nonce TTL must be between 1 second and 24 hours"
    ))]
    pub ttl_seconds: u64,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self { capacity: 65536, ttl_seconds: 900 }
    }
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable metrics collection
    pub enable_metrics: bool,

    /// Prometheus scrape port
    pub metrics_port: u16,

    /// Service name attached to metrics
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_port: 9090,
            service_name: "acme-wfe".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if !self.enable_metrics || self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}
