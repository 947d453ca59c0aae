use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Failures while loading certificate material for the HTTPS listener or the
/// issuer certificate served at `/acme/issuer-cert`.
#[derive(Debug, Error)]
pub enum TlsError {
    /// TLS has been enabled but the certificate path was not provided.
    #[error("TLS is enabled but certificate path is not configured")]
    MissingCertificatePath,

    /// TLS has been enabled but the private key path was not provided.
    #[error("TLS is enabled but private key path is not configured")]
    MissingPrivateKeyPath,

    /// A certificate, chain or key file could not be read.
    #[error("Failed to read {kind} at {path}: {source}")]
    Read {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A PEM section was malformed.
    #[error("{kind} file {path} is not a valid PEM: {source}")]
    InvalidPem {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// No certificates were found in the supplied file.
    #[error("Certificate file {path} does not contain any certificates")]
    EmptyCertificateChain { path: PathBuf },

    /// The private key PEM contents were invalid or unsupported.
    #[error("Private key file {path} does not contain a supported private key")]
    InvalidPrivateKey {
        path: PathBuf,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// The certificate's public key does not belong to the private key.
    #[error("Certificate and private key do not match")]
    CertificateKeyMismatch,

    /// The certificate DER could not be parsed.
    #[error("Certificate at {path} could not be parsed: {source}")]
    InvalidCertificate {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// The certificate is not yet valid.
    #[error("Certificate at {path} is not valid before {not_before}")]
    CertificateNotYetValid { path: PathBuf, not_before: DateTime<Utc> },

    /// The certificate is expired.
    #[error("Certificate at {path} expired at {not_after}")]
    CertificateExpired { path: PathBuf, not_after: DateTime<Utc> },
}
