//! Signed-request verification.
//!
//! Every state-changing ACME request is a POST whose body is a JWS. Before a
//! handler sees the payload, [`verify_post`] checks the envelope, resolves the
//! signing key (the account's stored key when one exists), verifies the
//! signature, consumes the anti-replay nonce and makes sure the payload names
//! the resource the request was sent to.

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap};
use http_body_util::LengthLimitError;
use serde_json::Value;
use tracing::{debug, warn};

use super::event::EventHandle;
use super::state::WebFrontEnd;
use crate::domain::{AcmeResource, Registration};
use crate::errors::AcmeError;
use crate::jose::{check_algorithm, good_key, Jwk, Jws};

const LOGGED_BODY_PREFIX: usize = 100;

/// A POST whose envelope checked out.
#[derive(Debug, Clone)]
pub struct VerifiedPost {
    pub payload: Vec<u8>,
    /// The key that verified the signature.
    pub key: Jwk,
    /// The signer's account, when one exists.
    pub registration: Option<Registration>,
}

impl VerifiedPost {
    /// The signer's account. Only call after verifying with
    /// `require_known_account`.
    pub fn account(&self) -> Result<&Registration, AcmeError> {
        self.registration
            .as_ref()
            .ok_or_else(|| AcmeError::internal("verified request carries no account"))
    }
}

struct Verifier<'a> {
    wfe: &'a WebFrontEnd,
    event: &'a EventHandle,
}

impl Verifier<'_> {
    fn reject(&self, reason: &str, err: AcmeError) -> AcmeError {
        self.event.add_error(err.to_string());
        self.wfe.metrics.record_verification_failure(reason);
        err
    }
}

/// Authenticate a signed POST for `resource`.
///
/// With `require_known_account` unset, a key that owns no account is accepted
/// as long as it passes the key policy, and the result carries no account.
pub async fn verify_post(
    wfe: &WebFrontEnd,
    event: &EventHandle,
    headers: &HeaderMap,
    body: Body,
    resource: AcmeResource,
    require_known_account: bool,
) -> Result<VerifiedPost, AcmeError> {
    let verifier = Verifier { wfe, event };

    if !headers.contains_key(header::CONTENT_LENGTH) {
        return Err(verifier.reject(
            "length_required",
            AcmeError::length_required("Content-Length header is required for POST."),
        ));
    }

    let body = match to_bytes(body, wfe.max_body_size).await {
        Ok(body) => body,
        Err(err) if is_length_limit(&err) => {
            return Err(verifier.reject(
                "body_too_large",
                AcmeError::malformed(format!(
                    "Request body exceeds {} bytes",
                    wfe.max_body_size
                )),
            ));
        }
        Err(err) => {
            debug!(error = %err, "Failed to read request body");
            return Err(verifier
                .reject("body_read", AcmeError::internal("unable to read request body")));
        }
    };
    if body.is_empty() {
        return Err(verifier.reject("empty_body", AcmeError::malformed("No body on POST")));
    }

    let mut jws = Jws::parse(&body).map_err(|err| {
        debug!(error = %err, "Rejected unparseable JWS");
        verifier.reject("parse", AcmeError::signature("Parse error reading JWS"))
    })?;

    let signature = match jws.signatures.len() {
        0 => {
            return Err(verifier.reject("unsigned", AcmeError::signature("POST JWS not signed")));
        }
        1 => jws.signatures.remove(0),
        _ => {
            return Err(verifier.reject(
                "multiple_signatures",
                AcmeError::signature("Too many signatures in POST body"),
            ));
        }
    };

    let submitted = signature
        .jwk()
        .cloned()
        .ok_or_else(|| verifier.reject("no_jwk", AcmeError::signature("No JWK in JWS header")))?;

    let (key, registration) = match wfe
        .backend("get_registration_by_key", wfe.sa.get_registration_by_key(&submitted))
        .await
    {
        Ok(registration) => {
            event.set_requester(registration.id, &registration.contact);
            (registration.key.clone(), Some(registration))
        }
        Err(err) if err.is_no_such_registration() && !require_known_account => {
            good_key(&submitted).map_err(|err| verifier.reject("bad_key", err))?;
            (submitted, None)
        }
        Err(err) => return Err(verifier.reject("registration_lookup", err)),
    };

    let algorithm =
        check_algorithm(&key, &signature).map_err(|err| verifier.reject("algorithm", err))?;

    let signing_input = jws.signing_input(&signature);
    if let Err(err) = algorithm.verify(&key, &signing_input, &signature.signature) {
        let prefix = &body[..body.len().min(LOGGED_BODY_PREFIX)];
        warn!(
            algorithm = %algorithm,
            body_prefix = %String::from_utf8_lossy(prefix),
            "JWS signature did not verify"
        );
        return Err(verifier.reject("signature", err));
    }

    let nonce = signature.nonce().ok_or_else(|| {
        verifier.reject("missing_nonce", AcmeError::bad_nonce("JWS has no anti-replay nonce"))
    })?;
    if !wfe.nonces.consume(nonce).await {
        wfe.metrics.record_nonce("rejected");
        return Err(verifier.reject(
            "invalid_nonce",
            AcmeError::bad_nonce("JWS has invalid anti-replay nonce"),
        ));
    }
    wfe.metrics.record_nonce("consumed");

    let payload = jws.payload().map_err(|_| {
        verifier.reject("payload", AcmeError::malformed("Request payload did not parse as JSON"))
    })?;
    let parsed: Value = serde_json::from_slice(&payload).map_err(|_| {
        verifier.reject("payload", AcmeError::malformed("Request payload did not parse as JSON"))
    })?;

    let declared = parsed
        .get("resource")
        .and_then(Value::as_str)
        .filter(|declared| !declared.is_empty())
        .ok_or_else(|| {
            verifier.reject(
                "no_resource",
                AcmeError::malformed("Request payload does not specify a resource"),
            )
        })?;
    if declared != resource.as_str() {
        return Err(verifier.reject(
            "resource_mismatch",
            AcmeError::malformed(format!(
                "JWS resource payload does not match the HTTP resource: {} != {}",
                declared, resource
            )),
        ));
    }

    Ok(VerifiedPost { payload, key, registration })
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(current) = source {
        if current.is::<LengthLimitError>() {
            return true;
        }
        source = current.source();
    }
    false
}
