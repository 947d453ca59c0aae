use axum::http::StatusCode;
use rcgen::{CertificateParams, KeyPair};

use crate::wfe::support::{TestKey, TestWfe};

const UNAUTHORIZED_DETAIL: &str = "Revocation request must be signed by private key of cert \
    to be revoked, or by the account key of the account that issued it.";

#[tokio::test]
async fn certificate_key_can_revoke_without_account() {
    let app = TestWfe::new();
    let (_, certificate_key, der) = app.issued_certificate("example.com").await;

    let response = app.revoke(&certificate_key, &der).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn owning_account_can_revoke() {
    let app = TestWfe::new();
    let (account_key, _, der) = app.issued_certificate("example.com").await;

    let response = app.revoke(&account_key, &der).await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn certificate_key_that_is_also_the_account_key_can_revoke() {
    let (app, backend) = TestWfe::planted();
    let (key, id) = app.account().await;
    let der = key.self_signed("example.com", &[0x42; 16]);
    let serial = backend.plant(id, &[0x42; 16], der.clone());

    let response = app.revoke(&key, &der).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(*backend.revocations.lock(), vec![(serial, Some(id))]);

    let again = app.revoke(&key, &der).await;
    assert_eq!(again.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn other_account_cannot_revoke() {
    let app = TestWfe::new();
    let (_, _, der) = app.issued_certificate("example.com").await;
    let (stranger, _) = app.account().await;

    let response = app.revoke(&stranger, &der).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.detail(), UNAUTHORIZED_DETAIL);
}

#[tokio::test]
async fn unregistered_key_cannot_revoke() {
    let app = TestWfe::new();
    let (_, _, der) = app.issued_certificate("example.com").await;

    let response = app.revoke(&TestKey::generate(), &der).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.problem_type(), "urn:acme:error:unauthorized");
}

#[tokio::test]
async fn already_revoked_conflicts() {
    let app = TestWfe::new();
    let (_, certificate_key, der) = app.issued_certificate("example.com").await;
    assert_eq!(app.revoke(&certificate_key, &der).await.status, StatusCode::OK);

    let again = app.revoke(&certificate_key, &der).await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(again.detail(), "Certificate already revoked");
}

#[tokio::test]
async fn unknown_certificate_is_not_found() {
    let app = TestWfe::new();
    let key = KeyPair::generate().unwrap();
    let foreign = CertificateParams::new(vec!["example.com".to_string()])
        .unwrap()
        .self_signed(&key)
        .unwrap();

    let response = app.revoke(&TestKey::generate(), foreign.der()).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert!(response.detail().starts_with("No such certificate"));
}
