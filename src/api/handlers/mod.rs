//! ACME resource handlers.

pub mod authorization;
pub mod certificate;
pub mod challenge;
pub mod directory;
pub mod registration;
pub mod revocation;

pub use authorization::{get_authorization, new_authorization};
pub use certificate::{get_certificate, new_certificate};
pub use challenge::challenge;
pub use directory::{build_id, directory, index, issuer_certificate, terms};
pub use registration::{new_registration, update_registration};
pub use revocation::revoke_certificate;

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::error::ApiError;

pub(crate) const JSON_CONTENT_TYPE: &str = "application/json";
pub(crate) const PKIX_CERT_CONTENT_TYPE: &str = "application/pkix-cert";
pub(crate) const NO_CACHE: &str = "public, max-age=0, no-cache";

pub(crate) fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value).map_err(|err| {
        ApiError::internal("Unable to build response header").with_context(err.to_string())
    })
}

/// `Link: <url>;rel="rel"`
pub(crate) fn add_link(headers: &mut HeaderMap, url: &str, rel: &str) -> Result<(), ApiError> {
    headers.append(header::LINK, header_value(&format!("<{url}>;rel=\"{rel}\""))?);
    Ok(())
}

pub(crate) fn set_location(headers: &mut HeaderMap, url: &str) -> Result<(), ApiError> {
    headers.insert(header::LOCATION, header_value(url)?);
    Ok(())
}

pub(crate) fn cache_for(seconds: u64) -> Result<HeaderValue, ApiError> {
    header_value(&format!("public, max-age={seconds}"))
}

/// Serialize `body` as the JSON response body.
pub(crate) fn json_response<T: Serialize>(
    status: StatusCode,
    body: &T,
) -> Result<Response, ApiError> {
    let bytes = serde_json::to_vec(body).map_err(|err| {
        ApiError::internal("Failed to marshal response").with_context(err.to_string())
    })?;
    Ok(bytes_response(status, JSON_CONTENT_TYPE, bytes))
}

pub(crate) fn bytes_response(
    status: StatusCode,
    content_type: &'static str,
    body: Vec<u8>,
) -> Response {
    let mut response = (status, body).into_response();
    response.headers_mut().insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
