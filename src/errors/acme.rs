//! Protocol error taxonomy.
//!
//! Every failure the front end reports to a client, and every failure a
//! backend collaborator hands back, is an [`AcmeError`]. The HTTP status and
//! problem type are derived from its [`ErrorCategory`] in exactly one place,
//! `api::error::classify`.

use std::fmt;

/// Coarse classification used to pick a status code and problem type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Malformed,
    LengthRequired,
    Unauthorized,
    NotFound,
    MethodNotAllowed,
    Conflict,
    RateLimited,
    BadNonce,
    NotSupported,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Malformed => "malformed",
            ErrorCategory::LengthRequired => "length_required",
            ErrorCategory::Unauthorized => "unauthorized",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::MethodNotAllowed => "method_not_allowed",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::BadNonce => "bad_nonce",
            ErrorCategory::NotSupported => "not_supported",
            ErrorCategory::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Typed protocol errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AcmeError {
    /// A POST arrived without a `Content-Length` header.
    #[error("{0}")]
    LengthRequired(String),

    /// The request was syntactically or semantically invalid.
    #[error("{0}")]
    Malformed(String),

    /// A payload field could not be interpreted.
    #[error("{0}")]
    Syntax(String),

    /// The envelope could not be parsed or its signature did not verify.
    #[error("{0}")]
    SignatureValidation(String),

    /// The anti-replay nonce was missing, unknown or already used.
    #[error("{0}")]
    BadNonce(String),

    /// The requester is not allowed to perform the operation.
    #[error("{0}")]
    Unauthorized(String),

    /// The referenced resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// No account is registered for the signing key.
    #[error("{0}")]
    NoSuchRegistration(String),

    /// The backend does not implement the requested operation.
    #[error("{0}")]
    NotSupported(String),

    /// The backend refused the request because of a rate limit.
    #[error("{0}")]
    RateLimited(String),

    /// The lookup matched more than one record.
    #[error("{0}")]
    Duplicate(String),

    /// Anything the client cannot fix.
    #[error("{0}")]
    Internal(String),
}

impl AcmeError {
    pub fn length_required<S: Into<String>>(message: S) -> Self {
        Self::LengthRequired(message.into())
    }

    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::Malformed(message.into())
    }

    pub fn syntax<S: Into<String>>(message: S) -> Self {
        Self::Syntax(message.into())
    }

    pub fn signature<S: Into<String>>(message: S) -> Self {
        Self::SignatureValidation(message.into())
    }

    pub fn bad_nonce<S: Into<String>>(message: S) -> Self {
        Self::BadNonce(message.into())
    }

    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    pub fn no_such_registration<S: Into<String>>(message: S) -> Self {
        Self::NoSuchRegistration(message.into())
    }

    pub fn not_supported<S: Into<String>>(message: S) -> Self {
        Self::NotSupported(message.into())
    }

    pub fn rate_limited<S: Into<String>>(message: S) -> Self {
        Self::RateLimited(message.into())
    }

    pub fn duplicate<S: Into<String>>(message: S) -> Self {
        Self::Duplicate(message.into())
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Category used by the classifier.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AcmeError::LengthRequired(_) => ErrorCategory::LengthRequired,
            AcmeError::Malformed(_) | AcmeError::Syntax(_) | AcmeError::SignatureValidation(_) => {
                ErrorCategory::Malformed
            }
            AcmeError::BadNonce(_) => ErrorCategory::BadNonce,
            AcmeError::Unauthorized(_) | AcmeError::NoSuchRegistration(_) => {
                ErrorCategory::Unauthorized
            }
            AcmeError::NotFound(_) => ErrorCategory::NotFound,
            AcmeError::NotSupported(_) => ErrorCategory::NotSupported,
            AcmeError::RateLimited(_) => ErrorCategory::RateLimited,
            AcmeError::Duplicate(_) => ErrorCategory::Conflict,
            AcmeError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Short label for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            AcmeError::LengthRequired(_) => "length_required",
            AcmeError::Malformed(_) => "malformed",
            AcmeError::Syntax(_) => "syntax",
            AcmeError::SignatureValidation(_) => "signature_validation",
            AcmeError::BadNonce(_) => "bad_nonce",
            AcmeError::Unauthorized(_) => "unauthorized",
            AcmeError::NotFound(_) => "not_found",
            AcmeError::NoSuchRegistration(_) => "no_such_registration",
            AcmeError::NotSupported(_) => "not_supported",
            AcmeError::RateLimited(_) => "rate_limited",
            AcmeError::Duplicate(_) => "duplicate",
            AcmeError::Internal(_) => "internal",
        }
    }

    pub fn is_no_such_registration(&self) -> bool {
        matches!(self, AcmeError::NoSuchRegistration(_))
    }
}
