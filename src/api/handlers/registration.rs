use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};

use super::{add_link, json_response, set_location};
use crate::api::error::ApiError;
use crate::api::event::EventHandle;
use crate::api::state::{WebFrontEnd, WfeState};
use crate::api::verify::verify_post;
use crate::domain::{AcmeResource, Registration, RegistrationPayload};

/// `POST /acme/new-reg`
pub async fn new_registration(
    State(wfe): State<WfeState>,
    Extension(event): Extension<EventHandle>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let verified =
        verify_post(&wfe, &event, &headers, body, AcmeResource::NewRegistration, false)
            .await
            .map_err(ApiError::from_verification)?;

    if let Some(existing) = &verified.registration {
        let mut response = ApiError::conflict("Registration key is already in use").into_response();
        set_location(response.headers_mut(), &registration_url(&wfe, existing.id))?;
        return Ok(response);
    }

    let payload: RegistrationPayload = serde_json::from_slice(&verified.payload)
        .map_err(|err| {
            ApiError::malformed("Error unmarshaling JSON").with_context(err.to_string())
        })?;
    check_agreement(&wfe, &payload.agreement, None)?;

    let initial_ip = event.client_ip().ok_or_else(|| {
        ApiError::internal("couldn't parse the remote (that is, the client's) address")
    })?;

    let registration = wfe
        .backend(
            "new_registration",
            wfe.ra.new_registration(payload.into_registration(verified.key, Some(initial_ip))),
        )
        .await
        .map_err(|err| ApiError::from_acme("Error creating new registration", err))?;
    event.set_requester(registration.id, &registration.contact);

    let mut response = json_response(StatusCode::CREATED, &registration)?;
    set_location(response.headers_mut(), &registration_url(&wfe, registration.id))?;
    add_registration_links(&wfe, &mut response)?;
    Ok(response)
}

/// `POST /acme/reg/{id}`
pub async fn update_registration(
    State(wfe): State<WfeState>,
    Extension(event): Extension<EventHandle>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let verified = verify_post(&wfe, &event, &headers, body, AcmeResource::Registration, true)
        .await
        .map_err(ApiError::from_verification)?;
    let current = verified.account()?.clone();

    let id: i64 = id.parse().map_err(|_| {
        ApiError::malformed("Registration ID must be an integer").with_context(id.clone())
    })?;
    if id <= 0 {
        return Err(ApiError::malformed("Registration ID must be a positive non-zero integer"));
    }
    if id != current.id {
        return Err(ApiError::unauthorized("Request signing key did not match registration key"));
    }

    let payload: RegistrationPayload = serde_json::from_slice(&verified.payload).map_err(|err| {
        ApiError::malformed("Error unmarshaling registration").with_context(err.to_string())
    })?;
    check_agreement(&wfe, &payload.agreement, Some(current.agreement.as_str()))?;

    // The key can never be changed through an update.
    let mut update: Registration = payload.into_registration(current.key.clone(), None);
    update.id = current.id;

    let updated = wfe
        .backend("update_registration", wfe.ra.update_registration(current, update))
        .await
        .map_err(|err| ApiError::from_acme("Unable to update registration", err))?;

    let mut response = json_response(StatusCode::ACCEPTED, &updated)?;
    add_registration_links(&wfe, &mut response)?;
    Ok(response)
}

fn registration_url(wfe: &WebFrontEnd, id: i64) -> String {
    format!("{}{}", wfe.urls.reg_base, id)
}

fn check_agreement(
    wfe: &WebFrontEnd,
    provided: &str,
    current: Option<&str>,
) -> Result<(), ApiError> {
    if wfe.agreement_acceptable(provided) || current == Some(provided) {
        return Ok(());
    }
    Err(ApiError::malformed(format!(
        "Provided agreement URL [{}] does not match current agreement URL [{}]",
        provided, wfe.subscriber_agreement_url
    )))
}

fn add_registration_links(wfe: &WebFrontEnd, response: &mut Response) -> Result<(), ApiError> {
    let headers = response.headers_mut();
    add_link(headers, &wfe.urls.new_authz, "next")?;
    if !wfe.subscriber_agreement_url.is_empty() {
        add_link(headers, &wfe.subscriber_agreement_url, "terms-of-service")?;
    }
    Ok(())
}
