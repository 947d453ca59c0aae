use acme_wfe::services::StorageGetter;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::json;

use crate::wfe::support::{TestKey, TestWfe, AGREEMENT_URL, CLIENT_IP};

#[tokio::test]
async fn new_registration_is_created() {
    let app = TestWfe::new();
    let key = TestKey::generate();

    let response = app.register(&key, true).await;
    assert_eq!(response.status, StatusCode::CREATED);

    let body = response.json();
    let id = body["id"].as_i64().expect("id");
    assert!(id >= 1);
    assert_eq!(body["agreement"], AGREEMENT_URL);
    assert_eq!(body["initialIp"], CLIENT_IP);
    assert_eq!(body["contact"], json!(["mailto:admin@example.com"]));
    assert_eq!(response.location_path(), format!("/acme/reg/{id}"));

    let links = response.links();
    assert!(links.contains(&"<http://localhost:4000/acme/new-authz>;rel=\"next\"".to_string()));
    assert!(links.contains(&format!("<{AGREEMENT_URL}>;rel=\"terms-of-service\"")));
    assert!(response.header("replay-nonce").is_some());
}

#[tokio::test]
async fn existing_key_conflicts_with_location() {
    let app = TestWfe::new();
    let (key, id) = app.account().await;

    let response = app.register(&key, true).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.problem_type(), "urn:acme:error:malformed");
    assert_eq!(response.detail(), "Registration key is already in use");
    assert_eq!(response.location_path(), format!("/acme/reg/{id}"));
}

#[tokio::test]
async fn wrong_agreement_is_rejected() {
    let app = TestWfe::new();
    let key = TestKey::generate();

    let response = app
        .post(
            "/acme/new-reg",
            &key,
            json!({ "resource": "new-reg", "agreement": "http://localhost:4000/terms/v0" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.detail().contains("does not match current agreement URL"));
}

#[tokio::test]
async fn replayed_nonce_is_bad_nonce() {
    let app = TestWfe::new();
    let key = TestKey::generate();
    let nonce = app.nonce().await;
    let body = key.sign(&json!({ "resource": "new-reg" }), &nonce);

    let first = app.post_raw("/acme/new-reg", body.clone()).await;
    assert_eq!(first.status, StatusCode::CREATED);

    let replayed = app.post_raw("/acme/new-reg", body).await;
    assert_eq!(replayed.status, StatusCode::BAD_REQUEST);
    assert_eq!(replayed.problem_type(), "urn:acme:error:badNonce");
}

#[tokio::test]
async fn unknown_nonce_is_bad_nonce() {
    let app = TestWfe::new();
    let key = TestKey::generate();
    let body = key.sign(&json!({ "resource": "new-reg" }), "never-issued");

    let response = app.post_raw("/acme/new-reg", body).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.problem_type(), "urn:acme:error:badNonce");
}

#[tokio::test]
async fn resource_must_match_endpoint() {
    let app = TestWfe::new();
    let key = TestKey::generate();

    let response = app.post("/acme/new-reg", &key, json!({ "resource": "new-authz" })).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.problem_type(), "urn:acme:error:malformed");
    assert!(response.detail().starts_with("Unable to read/verify body"));
}

#[tokio::test]
async fn tampered_signature_is_rejected() {
    let app = TestWfe::new();
    let key = TestKey::generate();
    let nonce = app.nonce().await;

    let mut envelope: serde_json::Value =
        serde_json::from_str(&key.sign(&json!({ "resource": "new-reg" }), &nonce)).unwrap();
    let other = TestKey::generate().sign(&json!({ "resource": "new-reg" }), &nonce);
    let other: serde_json::Value = serde_json::from_str(&other).unwrap();
    envelope["signature"] = other["signature"].clone();

    let response = app.post_raw("/acme/new-reg", envelope.to_string()).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.problem_type(), "urn:acme:error:malformed");
}

#[tokio::test]
async fn post_without_content_length_is_refused() {
    let app = TestWfe::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/acme/new-reg")
        .body(Body::from("{}"))
        .unwrap();

    let response = app.send(request).await;
    assert_eq!(response.status, StatusCode::LENGTH_REQUIRED);
    assert_eq!(
        response.header(header::CONTENT_TYPE.as_str()),
        Some("application/problem+json")
    );
}

#[tokio::test]
async fn empty_and_garbage_bodies_are_malformed() {
    let app = TestWfe::new();

    let empty = app.post_raw("/acme/new-reg", String::new()).await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    let garbage = app.post_raw("/acme/new-reg", "not a jws".to_string()).await;
    assert_eq!(garbage.status, StatusCode::BAD_REQUEST);
    assert_eq!(garbage.problem_type(), "urn:acme:error:malformed");
}

#[tokio::test]
async fn update_accepts_agreement_later() {
    let app = TestWfe::new();
    let key = TestKey::generate();
    let created = app.register(&key, false).await;
    assert_eq!(created.status, StatusCode::CREATED);
    let path = created.location_path();

    let response = app
        .post(&path, &key, json!({ "resource": "reg", "agreement": AGREEMENT_URL }))
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.json()["agreement"], AGREEMENT_URL);
    assert_eq!(response.json()["contact"], json!(["mailto:admin@example.com"]));
}

#[tokio::test]
async fn update_cannot_replace_the_account_key() {
    let app = TestWfe::new();
    let (key, id) = app.account().await;
    let replacement = TestKey::generate();

    let response = app
        .post(
            &format!("/acme/reg/{id}"),
            &key,
            json!({
                "resource": "reg",
                "key": replacement.jwk,
                "contact": ["mailto:new@example.com"],
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.json()["key"], json!(key.jwk));
    assert_eq!(response.json()["contact"], json!(["mailto:new@example.com"]));

    let stored = app.authority.get_registration(id).await.expect("stored registration");
    assert!(stored.key.same_key(&key.jwk));
    assert!(app.authority.get_registration_by_key(&replacement.jwk).await.is_err());
}

#[tokio::test]
async fn update_of_another_account_is_unauthorized() {
    let app = TestWfe::new();
    let (key, _) = app.account().await;
    let (_, other_id) = app.account().await;

    let response = app
        .post(&format!("/acme/reg/{other_id}"), &key, json!({ "resource": "reg" }))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.detail(), "Request signing key did not match registration key");
}

#[tokio::test]
async fn update_rejects_bad_ids() {
    let app = TestWfe::new();
    let (key, _) = app.account().await;

    let not_integer = app.post("/acme/reg/abc", &key, json!({ "resource": "reg" })).await;
    assert_eq!(not_integer.status, StatusCode::BAD_REQUEST);
    assert_eq!(not_integer.detail(), "Registration ID must be an integer");

    let zero = app.post("/acme/reg/0", &key, json!({ "resource": "reg" })).await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);
    assert_eq!(zero.detail(), "Registration ID must be a positive non-zero integer");
}

#[tokio::test]
async fn update_with_unknown_key_is_unauthorized() {
    let app = TestWfe::new();
    let (_, id) = app.account().await;
    let stranger = TestKey::generate();

    let response = app
        .post(&format!("/acme/reg/{id}"), &stranger, json!({ "resource": "reg" }))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.problem_type(), "urn:acme:error:unauthorized");
    assert_eq!(response.detail(), "No registration exists matching provided key");
}
