use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::warn;

use crate::audit;
use crate::errors::{AcmeError, ErrorCategory};
use crate::observability::MetricsRecorder;

pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

const MALFORMED_PROBLEM: &str = "urn:acme:error:malformed";
const UNAUTHORIZED_PROBLEM: &str = "urn:acme:error:unauthorized";
const RATE_LIMITED_PROBLEM: &str = "urn:acme:error:rateLimited";
const BAD_NONCE_PROBLEM: &str = "urn:acme:error:badNonce";
const SERVER_INTERNAL_PROBLEM: &str = "urn:acme:error:serverInternal";

const MARSHALLING_FALLBACK: &[u8] = br#"{"detail": "Problem marshalling error message."}"#;

/// Status code and problem type for a category.
pub fn classify(category: ErrorCategory) -> (StatusCode, &'static str) {
    match category {
        ErrorCategory::Malformed => (StatusCode::BAD_REQUEST, MALFORMED_PROBLEM),
        ErrorCategory::LengthRequired => (StatusCode::LENGTH_REQUIRED, MALFORMED_PROBLEM),
        ErrorCategory::Unauthorized => (StatusCode::FORBIDDEN, UNAUTHORIZED_PROBLEM),
        ErrorCategory::NotFound => (StatusCode::NOT_FOUND, MALFORMED_PROBLEM),
        ErrorCategory::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, MALFORMED_PROBLEM),
        ErrorCategory::Conflict => (StatusCode::CONFLICT, MALFORMED_PROBLEM),
        ErrorCategory::RateLimited => (StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_PROBLEM),
        ErrorCategory::BadNonce => (StatusCode::BAD_REQUEST, BAD_NONCE_PROBLEM),
        ErrorCategory::NotSupported => (StatusCode::NOT_IMPLEMENTED, SERVER_INTERNAL_PROBLEM),
        ErrorCategory::Internal => (StatusCode::INTERNAL_SERVER_ERROR, SERVER_INTERNAL_PROBLEM),
    }
}

/// Extra information attached to an [`ApiError`].
#[derive(Debug, Clone)]
pub enum ErrorDetail {
    /// A typed failure; its message is shown to the client unless internal.
    Cause(AcmeError),
    /// Log-only context, never echoed.
    Context(String),
}

/// A client-facing failure, rendered as an RFC 7807 problem document.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub category: ErrorCategory,
    pub message: String,
    pub detail: Option<ErrorDetail>,
}

/// Marker left on error responses so the request event can record them.
#[derive(Debug, Clone)]
pub struct ProblemRecord(pub String);

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: &'static str,
    pub detail: String,
}

impl ApiError {
    pub fn new<S: Into<String>>(category: ErrorCategory, message: S) -> Self {
        Self { category, message: message.into(), detail: None }
    }

    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCategory::Malformed, message)
    }

    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCategory::Unauthorized, message)
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCategory::NotFound, message)
    }

    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCategory::Conflict, message)
    }

    pub fn method_not_allowed<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCategory::MethodNotAllowed, message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(ErrorCategory::Internal, message)
    }

    /// Report `err` under `message`, classified by the error's own category.
    pub fn from_acme<S: Into<String>>(message: S, err: AcmeError) -> Self {
        Self::new(err.category(), message).with_cause(err)
    }

    /// Map a failed envelope verification to the client-facing message.
    pub fn from_verification(err: AcmeError) -> Self {
        let message = if err.is_no_such_registration() {
            "No registration exists matching provided key"
        } else {
            "Unable to read/verify body"
        };
        Self::from_acme(message, err)
    }

    pub fn with_cause(mut self, cause: AcmeError) -> Self {
        self.detail = Some(ErrorDetail::Cause(cause));
        self
    }

    pub fn with_context<S: Into<String>>(mut self, context: S) -> Self {
        self.detail = Some(ErrorDetail::Context(context.into()));
        self
    }

    pub fn status_code(&self) -> StatusCode {
        classify(self.category).0
    }

    /// Message shown to the client. Typed causes are appended, except internal
    /// failures and missing accounts.
    pub fn client_detail(&self) -> String {
        match &self.detail {
            Some(ErrorDetail::Cause(cause)) if echoes_cause(cause) => {
                format!("{} :: {}", self.message, cause)
            }
            _ => self.message.clone(),
        }
    }

    pub fn problem(&self) -> (StatusCode, ProblemDetails) {
        let (status, problem_type) = classify(self.category);
        (status, ProblemDetails { problem_type, detail: self.client_detail() })
    }

    fn log_detail(&self) -> String {
        match &self.detail {
            Some(ErrorDetail::Cause(cause)) => cause.to_string(),
            Some(ErrorDetail::Context(context)) => context.clone(),
            None => String::new(),
        }
    }
}

fn echoes_cause(cause: &AcmeError) -> bool {
    cause.category() != ErrorCategory::Internal && !cause.is_no_such_registration()
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.client_detail())
    }
}

impl From<AcmeError> for ApiError {
    fn from(err: AcmeError) -> Self {
        Self::new(err.category(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, problem) = self.problem();

        // Audit server-side failures only.
        if problem.problem_type == SERVER_INTERNAL_PROBLEM {
            audit!(
                status = status.as_u16(),
                message = %self.message,
                detail = %self.log_detail(),
                "Internal error"
            );
        } else if status.is_client_error() {
            tracing::debug!(
                status = status.as_u16(),
                problem_type = problem.problem_type,
                detail = %self.log_detail(),
                "Client error"
            );
        }

        let metrics = MetricsRecorder::new();
        metrics.record_error_code(status.as_u16());
        metrics.record_problem_type(problem.problem_type);

        let body = serde_json::to_vec(&problem).unwrap_or_else(|err| {
            warn!(error = %err, "Failed to serialize problem document");
            MARSHALLING_FALLBACK.to_vec()
        });

        let mut response = (status, body).into_response();
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(PROBLEM_CONTENT_TYPE));
        response.extensions_mut().insert(ProblemRecord(problem.detail));
        response
    }
}
