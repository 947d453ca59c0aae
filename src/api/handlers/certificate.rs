use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};

use super::{add_link, bytes_response, cache_for, set_location, NO_CACHE, PKIX_CERT_CONTENT_TYPE};
use crate::api::error::ApiError;
use crate::api::event::EventHandle;
use crate::api::state::WfeState;
use crate::api::verify::verify_post;
use crate::audit;
use crate::domain::{valid_serial, AcmeResource, CertificateDetails, CertificateRequest};
use crate::errors::AcmeError;
use crate::jose::{encode_b64, good_key};

/// `POST /acme/new-cert`
pub async fn new_certificate(
    State(wfe): State<WfeState>,
    Extension(event): Extension<EventHandle>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let verified = verify_post(&wfe, &event, &headers, body, AcmeResource::NewCertificate, true)
        .await
        .map_err(ApiError::from_verification)?;
    let account = verified.account()?;

    if !account.has_agreed() {
        return Err(ApiError::unauthorized(
            "Must agree to subscriber agreement before any further actions",
        ));
    }

    let request: CertificateRequest = serde_json::from_slice(&verified.payload).map_err(|err| {
        ApiError::malformed("Error unmarshaling certificate request").with_context(err.to_string())
    })?;

    audit!(
        client_addr = ?event.client_ip(),
        csr = %encode_b64(&request.csr),
        registration = account.id,
        "Certificate request"
    );

    let csr = request
        .parse()
        .map_err(|err| ApiError::from_acme("Error unmarshaling certificate request", err))?;
    good_key(&csr.key).map_err(|err| {
        ApiError::malformed("Invalid key in certificate request").with_cause(err)
    })?;
    event.insert_extra("CSRDNSNames", &csr.dns_names);
    event.insert_extra("CSRCommonName", &csr.common_name);

    let certificate = wfe
        .backend("new_certificate", wfe.ra.new_certificate(request, account.id))
        .await
        .map_err(|err| {
            event.add_error(format!("unable to create new cert: {err}"));
            ApiError::from_acme("Error creating new cert", err)
        })?;

    let details = CertificateDetails::from_der(&certificate.der)
        .map_err(|err| ApiError::malformed("Error creating new cert").with_cause(err))?;

    let mut response =
        bytes_response(StatusCode::CREATED, PKIX_CERT_CONTENT_TYPE, certificate.der);
    set_location(
        response.headers_mut(),
        &format!("{}{}", wfe.urls.cert_base, details.serial),
    )?;
    add_link(response.headers_mut(), &wfe.urls.issuer, "up")?;
    Ok(response)
}

/// `GET /acme/cert/{serial}`
pub async fn get_certificate(
    State(wfe): State<WfeState>,
    Extension(event): Extension<EventHandle>,
    Path(serial): Path<String>,
) -> Result<Response, ApiError> {
    if !valid_serial(&serial) {
        event.add_error(format!("certificate serial provided was not valid: {serial}"));
        return Ok(not_found(ApiError::not_found("Certificate not found").with_context(serial)));
    }
    event.insert_extra("RequestedSerial", &serial);

    let certificate = match wfe.backend("get_certificate", wfe.sa.get_certificate(&serial)).await {
        Ok(certificate) => certificate,
        Err(err @ AcmeError::Duplicate(_)) => {
            event.add_error(format!("unable to get certificate by serial id {serial}: {err}"));
            return Err(ApiError::conflict("Multiple certificates with same short serial")
                .with_cause(err));
        }
        Err(err) => {
            event.add_error(format!("unable to get certificate by serial id {serial}: {err}"));
            return Ok(not_found(ApiError::not_found("Certificate not found").with_cause(err)));
        }
    };

    let mut response = bytes_response(StatusCode::OK, PKIX_CERT_CONTENT_TYPE, certificate.der);
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, cache_for(wfe.cert_cache_seconds)?);
    add_link(response.headers_mut(), &wfe.urls.issuer, "up")?;
    Ok(response)
}

fn not_found(err: ApiError) -> Response {
    let mut response = err.into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));
    response
}
