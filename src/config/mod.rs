//! # Configuration Management
//!
//! Layered configuration for the front end: built-in defaults, an optional
//! file and `ACME_WFE__SECTION__KEY` environment overrides, validated before
//! anything starts listening.

pub mod settings;
pub mod tls;

pub use settings::{
    AppConfig, NonceConfig, ObservabilityConfig, ServerConfig, WfeConfig, ENV_PREFIX,
};
pub use tls::ListenerTlsConfig;
