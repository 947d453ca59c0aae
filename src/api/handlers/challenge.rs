use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::Response,
    Extension,
};

use super::authorization::{expired, record_authorization};
use super::{add_link, json_response, set_location};
use crate::api::error::ApiError;
use crate::api::event::EventHandle;
use crate::api::state::WfeState;
use crate::api::verify::verify_post;
use crate::domain::{AcmeResource, Authorization, Challenge, ChallengeResponse};

/// `GET|POST /acme/challenge/{authz}/{id}`
pub async fn challenge(
    State(wfe): State<WfeState>,
    Extension(event): Extension<EventHandle>,
    Path(slug): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let not_found = || ApiError::not_found("No such registration").with_context(slug.clone());

    let (authorization_id, challenge_id) = match slug.split('/').collect::<Vec<_>>().as_slice() {
        [authorization_id, challenge_id] => (
            authorization_id.to_string(),
            challenge_id.parse::<i64>().map_err(|_| not_found())?,
        ),
        _ => return Err(not_found()),
    };
    event.insert_extra("AuthorizationID", &authorization_id);
    event.insert_extra("ChallengeID", challenge_id);

    let authorization = wfe
        .backend("get_authorization", wfe.sa.get_authorization(&authorization_id))
        .await
        .map_err(|_| not_found())?;

    if authorization.is_expired(wfe.clock.now()) {
        return Err(expired(&authorization));
    }

    let index = authorization.find_challenge(challenge_id).ok_or_else(not_found)?;
    event.insert_extra("ChallengeType", &authorization.challenges[index].kind);
    record_authorization(&event, &authorization);

    if method == Method::POST {
        post_challenge(&wfe, &event, authorization, index, &headers, body).await
    } else {
        let challenge = &authorization.challenges[index];
        challenge_response(&wfe, &authorization, challenge)
    }
}

async fn post_challenge(
    wfe: &WfeState,
    event: &EventHandle,
    authorization: Authorization,
    index: usize,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let verified = verify_post(wfe, event, headers, body, AcmeResource::Challenge, true)
        .await
        .map_err(ApiError::from_verification)?;
    let account = verified.account()?;

    if !account.has_agreed() {
        return Err(ApiError::unauthorized(
            "Registration didn't agree to subscriber agreement before any further actions",
        ));
    }
    if account.id != authorization.registration_id {
        event.add_error(format!(
            "User registration id: {} != Authorization registration id: {}",
            account.id, authorization.registration_id
        ));
        return Err(ApiError::unauthorized(
            "User registration ID doesn't match registration ID in authorization",
        ));
    }

    let update: ChallengeResponse = serde_json::from_slice(&verified.payload).map_err(|err| {
        ApiError::malformed("Error unmarshaling challenge response").with_context(err.to_string())
    })?;

    let updated = wfe
        .backend(
            "update_authorization",
            wfe.ra.update_authorization(authorization.clone(), index, update),
        )
        .await
        .map_err(|err| ApiError::from_acme("Unable to update challenge", err))?;

    // Challenge order is preserved by updates.
    let challenge = updated
        .challenges
        .get(index)
        .ok_or_else(|| ApiError::internal("Updated authorization lost its challenge"))?;
    challenge_response(wfe, &authorization, challenge)
}

fn challenge_response(
    wfe: &WfeState,
    authorization: &Authorization,
    challenge: &Challenge,
) -> Result<Response, ApiError> {
    let view = challenge.for_display(&wfe.urls.challenge_base, &authorization.id);
    let mut response = json_response(StatusCode::ACCEPTED, &view)?;
    set_location(response.headers_mut(), &view.uri)?;
    add_link(
        response.headers_mut(),
        &format!("{}{}", wfe.urls.authz_base, authorization.id),
        "up",
    )?;
    Ok(response)
}
