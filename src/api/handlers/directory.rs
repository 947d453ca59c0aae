use axum::{
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};

use super::{bytes_response, cache_for, header_value, JSON_CONTENT_TYPE, PKIX_CERT_CONTENT_TYPE};
use crate::api::dispatch::{allow_header, EndpointLabel};
use crate::api::error::ApiError;
use crate::api::state::WfeState;

const INDEX_PAGE: &str = r#"<html>
  <body>
    This is an <a href="https://github.com/letsencrypt/acme-spec/">ACME</a>
    Certificate Authority. The JSON directory is available at
    <a href="{directory}">{directory}</a>.
  </body>
</html>
"#;

/// `GET /directory`
pub async fn directory(State(wfe): State<WfeState>) -> Response {
    bytes_response(StatusCode::OK, JSON_CONTENT_TYPE, wfe.directory.clone())
}

/// `GET /terms`: redirect to the current subscriber agreement.
pub async fn terms(State(wfe): State<WfeState>) -> Result<Response, ApiError> {
    let mut response = StatusCode::FOUND.into_response();
    response
        .headers_mut()
        .insert(header::LOCATION, header_value(&wfe.subscriber_agreement_url)?);
    Ok(response)
}

/// `GET /acme/issuer-cert`
pub async fn issuer_certificate(State(wfe): State<WfeState>) -> Result<Response, ApiError> {
    let mut response =
        bytes_response(StatusCode::OK, PKIX_CERT_CONTENT_TYPE, wfe.issuer_der.clone());
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, cache_for(wfe.issuer_cache_seconds)?);
    Ok(response)
}

/// `GET /build`
pub async fn build_id(State(wfe): State<WfeState>) -> Response {
    bytes_response(StatusCode::OK, "text/plain", wfe.build_id.clone().into_bytes())
}

/// Fallback for every path no resource claims. Only `GET /` is served.
pub async fn index(State(wfe): State<WfeState>, method: Method, uri: Uri) -> Response {
    let mut response = match serve_index(&wfe, &method, &uri) {
        Ok(response) => response,
        Err(err) => err.into_response(),
    };
    response.extensions_mut().insert(EndpointLabel("/"));
    response
}

fn serve_index(wfe: &WfeState, method: &Method, uri: &Uri) -> Result<Response, ApiError> {
    if uri.path() != "/" {
        return Err(ApiError::not_found("Resource not found").with_context(uri.path().to_string()));
    }
    if method != Method::GET && method != Method::HEAD {
        let mut response = ApiError::method_not_allowed("Method not allowed")
            .with_context(method.to_string())
            .into_response();
        response.headers_mut().insert(header::ALLOW, allow_header(&[Method::GET]));
        return Ok(response);
    }

    let page = INDEX_PAGE.replace("{directory}", &wfe.urls.directory);

    let mut response = if method == Method::HEAD {
        bytes_response(StatusCode::OK, "text/html", Vec::new())
    } else {
        bytes_response(StatusCode::OK, "text/html", page.into_bytes())
    };
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, cache_for(wfe.index_cache_seconds)?);
    Ok(response)
}
