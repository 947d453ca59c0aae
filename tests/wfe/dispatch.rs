use axum::body::Body;
use axum::http::{Method, Request, StatusCode};

use crate::wfe::support::{TestWfe, AGREEMENT_URL, ORIGIN};

#[tokio::test]
async fn directory_lists_resources_with_nonce() {
    let app = TestWfe::new();
    let response = app.get("/directory").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert!(response.header("replay-nonce").is_some());

    let directory = response.json();
    assert_eq!(directory["new-reg"], "http://localhost:4000/acme/new-reg");
    assert_eq!(directory["new-authz"], "http://localhost:4000/acme/new-authz");
    assert_eq!(directory["new-cert"], "http://localhost:4000/acme/new-cert");
    assert_eq!(directory["revoke-cert"], "http://localhost:4000/acme/revoke-cert");
}

#[tokio::test]
async fn nonces_are_fresh_per_response() {
    let app = TestWfe::new();
    let first = app.nonce().await;
    let second = app.nonce().await;
    assert_ne!(first, second);
    assert!(app.wfe.nonces.outstanding().await >= 2);
}

#[tokio::test]
async fn head_strips_the_body() {
    let app = TestWfe::new();
    let response = app.request(Method::HEAD, "/directory").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.is_empty());
    assert!(response.header("replay-nonce").is_some());
}

#[tokio::test]
async fn unsupported_method_is_refused_with_allow() {
    let app = TestWfe::new();

    let response = app.get("/acme/new-reg").await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.header("allow"), Some("POST"));
    assert_eq!(response.problem_type(), "urn:acme:error:malformed");
    assert!(response.header("replay-nonce").is_some());

    let response = app.request(Method::PUT, "/directory").await;
    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.header("allow"), Some("GET, HEAD"));
}

#[tokio::test]
async fn options_answers_preflight_for_allowed_origin() {
    let app = TestWfe::new();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/acme/new-reg")
        .header("origin", ORIGIN)
        .header("access-control-request-method", "POST")
        .body(Body::empty())
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("allow"), Some("POST"));
    assert_eq!(response.header("access-control-allow-origin"), Some(ORIGIN));
    assert_eq!(response.header("access-control-allow-methods"), Some("POST"));
    assert_eq!(response.header("access-control-expose-headers"), Some("Link, Replay-Nonce"));
    assert_eq!(response.header("vary"), Some("Origin"));
}

#[tokio::test]
async fn options_without_matching_method_has_no_cors() {
    let app = TestWfe::new();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/acme/new-reg")
        .header("origin", ORIGIN)
        .header("access-control-request-method", "DELETE")
        .body(Body::empty())
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("allow"), Some("POST"));
    assert!(response.header("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn cors_headers_only_for_allowed_origins() {
    let app = TestWfe::new();

    let allowed = Request::builder()
        .uri("/directory")
        .header("origin", ORIGIN)
        .body(Body::empty())
        .unwrap();
    let response = app.send(allowed).await;
    assert_eq!(response.header("access-control-allow-origin"), Some(ORIGIN));
    assert!(response.header("access-control-allow-methods").is_none());

    let denied = Request::builder()
        .uri("/directory")
        .header("origin", "https://evil.test")
        .body(Body::empty())
        .unwrap();
    let response = app.send(denied).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.header("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn index_serves_only_the_root() {
    let app = TestWfe::new();

    let index = app.get("/").await;
    assert_eq!(index.status, StatusCode::OK);
    assert_eq!(index.header("content-type"), Some("text/html"));
    assert_eq!(index.header("cache-control"), Some("public, max-age=86400"));
    let page = String::from_utf8(index.body.clone()).unwrap();
    assert!(page.contains("http://localhost:4000/directory"));

    let missing = app.get("/no-such-resource").await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.detail(), "Resource not found");

    let post = app.request(Method::POST, "/").await;
    assert_eq!(post.status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(post.header("allow"), Some("GET"));
}

#[tokio::test]
async fn terms_redirects_to_agreement() {
    let app = TestWfe::new();
    let response = app.get("/terms").await;
    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(response.header("location"), Some(AGREEMENT_URL));
}

#[tokio::test]
async fn build_reports_version() {
    let app = TestWfe::new();
    let response = app.get("/build").await;
    assert_eq!(response.status, StatusCode::OK);
    let body = String::from_utf8(response.body).unwrap();
    assert_eq!(body, format!("acme-wfe={}", env!("CARGO_PKG_VERSION")));
}
