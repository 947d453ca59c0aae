use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use serde::Deserialize;
use tracing::debug;

use crate::api::error::ApiError;
use crate::api::event::EventHandle;
use crate::api::state::WfeState;
use crate::api::verify::verify_post;
use crate::domain::{AcmeResource, CertificateDetails};
use crate::jose::base64url;
use crate::services::REVOCATION_REASON_UNSPECIFIED;

const REVOKE_UNAUTHORIZED: &str = "Revocation request must be signed by private key of cert \
    to be revoked, or by the account key of the account that issued it.";

#[derive(Debug, Deserialize)]
struct RevokeRequest {
    #[serde(with = "base64url")]
    certificate: Vec<u8>,
}

/// `POST /acme/revoke-cert`
///
/// Anyone holding the certificate's private key may revoke it, so the signer
/// does not need an account.
pub async fn revoke_certificate(
    State(wfe): State<WfeState>,
    Extension(event): Extension<EventHandle>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let verified =
        verify_post(&wfe, &event, &headers, body, AcmeResource::RevokeCertificate, false)
            .await
            .map_err(ApiError::from_verification)?;

    let request: RevokeRequest = serde_json::from_slice(&verified.payload).map_err(|err| {
        event.add_error("Couldn't unmarshal in revoke request");
        ApiError::malformed("Unable to read/verify body").with_context(err.to_string())
    })?;

    let provided = CertificateDetails::from_der(&request.certificate).map_err(|err| {
        event.add_error(format!("unable to parse revoke certificate DER: {err}"));
        ApiError::malformed("Unable to read/verify body").with_cause(err)
    })?;
    event.insert_extra("ProvidedCertificateSerial", &provided.serial);

    let lookup = wfe.backend("get_certificate", wfe.sa.get_certificate(&provided.serial)).await;
    let certificate = match lookup {
        Ok(certificate) if certificate.der == request.certificate => certificate,
        Ok(_) => return Err(ApiError::not_found("No such certificate")),
        Err(err) => return Err(ApiError::not_found("No such certificate").with_cause(err)),
    };

    let retrieved = CertificateDetails::from_der(&certificate.der)
        .map_err(|err| ApiError::internal("Invalid certificate").with_cause(err))?;
    event.insert_extra("RetrievedCertificateSerial", &retrieved.serial);
    event.insert_extra("RetrievedCertificateDNSNames", &retrieved.dns_names);
    event.insert_extra("CertificateStatus", certificate.status.as_str());

    if certificate.is_revoked() {
        event.add_error(format!("Certificate already revoked: {}", certificate.serial));
        return Err(ApiError::conflict("Certificate already revoked"));
    }

    let requester = verified.registration.as_ref().map(|registration| registration.id);
    let signed_by_certificate_key = verified.key.same_key(&retrieved.key);
    if !signed_by_certificate_key && requester != Some(certificate.registration_id) {
        return Err(ApiError::unauthorized(REVOKE_UNAUTHORIZED)
            .with_context(verified.key.thumbprint()));
    }

    let serial = certificate.serial.clone();
    wfe.backend(
        "revoke_certificate",
        wfe.ra.revoke_certificate(certificate, REVOCATION_REASON_UNSPECIFIED, requester),
    )
    .await
    .map_err(|err| ApiError::from_acme("Failed to revoke certificate", err))?;

    debug!(serial = %serial, "Revoked certificate");
    Ok(StatusCode::OK.into_response())
}
