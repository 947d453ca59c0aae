use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    Extension,
};

use super::{add_link, json_response, set_location};
use crate::api::error::ApiError;
use crate::api::event::EventHandle;
use crate::api::state::WfeState;
use crate::api::verify::verify_post;
use crate::domain::{AcmeResource, Authorization, AuthorizationRequest};

/// `POST /acme/new-authz`
pub async fn new_authorization(
    State(wfe): State<WfeState>,
    Extension(event): Extension<EventHandle>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let verified = verify_post(&wfe, &event, &headers, body, AcmeResource::NewAuthorization, true)
        .await
        .map_err(ApiError::from_verification)?;
    let account = verified.account()?;

    // Any version of the agreement will do here.
    if !account.has_agreed() {
        return Err(ApiError::unauthorized(
            "Must agree to subscriber agreement before any further actions",
        ));
    }

    let request: AuthorizationRequest = serde_json::from_slice(&verified.payload)
        .map_err(|err| {
            ApiError::malformed("Error unmarshaling JSON").with_context(err.to_string())
        })?;
    event.insert_extra("Identifier", &request.identifier);

    let authorization = wfe
        .backend(
            "new_authorization",
            wfe.ra.new_authorization(request.identifier, account.id),
        )
        .await
        .map_err(|err| ApiError::from_acme("Error creating new authz", err))?;
    event.insert_extra("AuthzID", &authorization.id);

    let mut response = json_response(
        StatusCode::CREATED,
        &authorization.for_display(&wfe.urls.challenge_base),
    )?;
    set_location(
        response.headers_mut(),
        &format!("{}{}", wfe.urls.authz_base, authorization.id),
    )?;
    add_link(response.headers_mut(), &wfe.urls.new_cert, "next")?;
    Ok(response)
}

/// `GET /acme/authz/{id}`
pub async fn get_authorization(
    State(wfe): State<WfeState>,
    Extension(event): Extension<EventHandle>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let authorization = wfe
        .backend("get_authorization", wfe.sa.get_authorization(&id))
        .await
        .map_err(|err| {
            event.add_error(format!("No such authorization at id {id}"));
            ApiError::not_found("Unable to find authorization").with_cause(err)
        })?;
    record_authorization(&event, &authorization);

    if authorization.is_expired(wfe.clock.now()) {
        return Err(expired(&authorization));
    }

    let mut response =
        json_response(StatusCode::OK, &authorization.for_display(&wfe.urls.challenge_base))?;
    add_link(response.headers_mut(), &wfe.urls.new_cert, "next")?;
    Ok(response)
}

pub(crate) fn record_authorization(event: &EventHandle, authorization: &Authorization) {
    event.insert_extra("AuthorizationID", &authorization.id);
    event.insert_extra("AuthorizationRegistrationID", authorization.registration_id);
    event.insert_extra("AuthorizationIdentifier", &authorization.identifier);
    event.insert_extra("AuthorizationStatus", authorization.status);
    event.insert_extra("AuthorizationExpires", authorization.expires);
}

pub(crate) fn expired(authorization: &Authorization) -> ApiError {
    let when = authorization
        .expires
        .map(|expires| expires.to_rfc3339())
        .unwrap_or_else(|| "never set".to_string());
    ApiError::not_found("Expired authorization")
        .with_context(format!("Authorization {} expired in the past ({})", authorization.id, when))
}
