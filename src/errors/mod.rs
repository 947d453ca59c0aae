//! # Error Handling
//!
//! Crate-level error types. [`Error`] covers startup and transport failures,
//! [`AcmeError`] is the protocol taxonomy shared by the front end and its
//! backend collaborators.

pub mod acme;
pub mod tls;

pub use acme::{AcmeError, ErrorCategory};
pub use tls::TlsError;

/// Custom result type for front-end operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for process-level failures
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS material could not be loaded
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new transport error
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Config(format!("Validation failed: {}", err))
    }
}
