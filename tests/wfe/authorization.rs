use acme_wfe::services::memory::key_authorization;
use axum::http::StatusCode;
use chrono::Duration;
use serde_json::json;

use crate::wfe::support::{TestKey, TestWfe, BASE_URL};

fn path_of(url: &str) -> &str {
    url.strip_prefix(BASE_URL).unwrap_or(url)
}

#[tokio::test]
async fn new_authorization_requires_agreement() {
    let app = TestWfe::new();
    let key = TestKey::generate();
    assert_eq!(app.register(&key, false).await.status, StatusCode::CREATED);

    let response = app.new_authorization(&key, "example.com").await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.problem_type(), "urn:acme:error:unauthorized");
}

#[tokio::test]
async fn new_authorization_requires_account() {
    let app = TestWfe::new();
    let response = app.new_authorization(&TestKey::generate(), "example.com").await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert!(response.detail().starts_with("No registration exists matching provided key"));
}

#[tokio::test]
async fn new_authorization_is_created_with_challenges() {
    let app = TestWfe::new();
    let (key, _) = app.account().await;

    let response = app.new_authorization(&key, "example.com").await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert!(response.location_path().starts_with("/acme/authz/"));
    assert!(response
        .links()
        .contains(&"<http://localhost:4000/acme/new-cert>;rel=\"next\"".to_string()));

    let body = response.json();
    assert_eq!(body["identifier"], json!({ "type": "dns", "value": "example.com" }));
    assert_eq!(body["status"], "pending");
    assert!(body.get("regId").is_none());
    let challenges = body["challenges"].as_array().expect("challenges");
    assert!(!challenges.is_empty());
    for challenge in challenges {
        let uri = challenge["uri"].as_str().expect("uri");
        assert!(uri.starts_with("http://localhost:4000/acme/challenge/"));
        assert!(challenge.get("accountKey").is_none());
        assert!(challenge.get("id").is_none());
    }

    let fetched = app.get(&response.location_path()).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.json()["identifier"]["value"], "example.com");
}

#[tokio::test]
async fn unknown_authorization_is_not_found() {
    let app = TestWfe::new();
    let response = app.get("/acme/authz/missing").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.detail(), "Unable to find authorization :: Unable to find authorization");
}

#[tokio::test]
async fn expired_authorization_is_not_found() {
    let app = TestWfe::new();
    let (key, _) = app.account().await;
    let created = app.new_authorization(&key, "example.com").await;
    let authz_path = created.location_path();
    let challenge_uri = created.json()["challenges"][0]["uri"].as_str().unwrap().to_string();

    app.clock.advance(Duration::days(8));

    let authz = app.get(&authz_path).await;
    assert_eq!(authz.status, StatusCode::NOT_FOUND);
    let challenge = app.get(path_of(&challenge_uri)).await;
    assert_eq!(challenge.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn challenge_get_links_to_authorization() {
    let app = TestWfe::new();
    let (key, _) = app.account().await;
    let created = app.new_authorization(&key, "example.com").await;
    let authz_url = created.header("location").unwrap().to_string();
    let challenge_uri = created.json()["challenges"][0]["uri"].as_str().unwrap().to_string();

    let response = app.get(path_of(&challenge_uri)).await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.header("location"), Some(challenge_uri.as_str()));
    assert!(response.links().contains(&format!("<{authz_url}>;rel=\"up\"")));
    assert_eq!(response.json()["status"], "pending");
}

#[tokio::test]
async fn malformed_challenge_paths_are_not_found() {
    let app = TestWfe::new();
    let (key, _) = app.account().await;
    let created = app.new_authorization(&key, "example.com").await;
    let authz_id = created.location_path().trim_start_matches("/acme/authz/").to_string();

    for path in [
        "/acme/challenge/only-one-part".to_string(),
        format!("/acme/challenge/{authz_id}/not-a-number"),
        format!("/acme/challenge/{authz_id}/999999"),
        "/acme/challenge/missing/1".to_string(),
    ] {
        let response = app.get(&path).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "{path}");
        assert_eq!(response.detail(), "No such registration");
    }
}

#[tokio::test]
async fn challenge_response_validates_authorization() {
    let app = TestWfe::new();
    let (key, _) = app.account().await;
    let authz_path = app.authorize(&key, "example.com").await;

    let authz = app.get(&authz_path).await;
    assert_eq!(authz.status, StatusCode::OK);
    assert_eq!(authz.json()["status"], "valid");
    assert_eq!(authz.json()["challenges"][0]["status"], "valid");
}

#[tokio::test]
async fn challenge_response_from_other_account_is_unauthorized() {
    let app = TestWfe::new();
    let (owner, _) = app.account().await;
    let (intruder, _) = app.account().await;
    let created = app.new_authorization(&owner, "example.com").await;
    let challenge = created.json()["challenges"][0].clone();
    let token = challenge["token"].as_str().unwrap();

    let response = app
        .post(
            path_of(challenge["uri"].as_str().unwrap()),
            &intruder,
            json!({
                "resource": "challenge",
                "keyAuthorization": key_authorization(token, &intruder.jwk),
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(
        response.detail(),
        "User registration ID doesn't match registration ID in authorization"
    );
}

#[tokio::test]
async fn wrong_key_authorization_is_malformed() {
    let app = TestWfe::new();
    let (key, _) = app.account().await;
    let created = app.new_authorization(&key, "example.com").await;
    let uri = created.json()["challenges"][0]["uri"].as_str().unwrap().to_string();

    let response = app
        .post(
            path_of(&uri),
            &key,
            json!({ "resource": "challenge", "keyAuthorization": "wrong" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.detail().starts_with("Unable to update challenge"));
}
