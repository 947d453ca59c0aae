use acme_wfe::domain::CertificateDetails;
use axum::http::StatusCode;

use acme_wfe::jose::decode_b64;

use crate::wfe::support::{TestKey, TestWfe};

/// CSR for example.com over a 1024-bit RSA key.
const WEAK_RSA_CSR: &str = "MIIBfjCB6AIBADAWMRQwEgYDVQQDDAtleGFtcGxlLmNvbTCBnzANBgkqhkiG9w0BAQEFAAOBjQAwgYkCgYEAwCgsDHd4kPJSvY58C47aY90qP_zmFcmMnYgWDRfkjFgzS-LnREQJBvNrTw5rIcPgXrKgW-X1VdHf5GG1QoN1WJ0r241wE5GZXP7tix6AJJx7LgjJ74srbfJ6Vr_vCeT-R6TGH1oCF94FfpIeMNWBTTcBLWEUF1q-57DfpS3-facCAwEAAaApMCcGCSqGSIb3DQEJDjEaMBgwFgYDVR0RBA8wDYILZXhhbXBsZS5jb20wDQYJKoZIhvcNAQELBQADgYEAPuBQsH582wSIT7Q5SFqiyNx5irLKXAQkRrNTkcr8ofAyameNa4_p4HdioEcGNoU9e8lWhDVw8ZUsAVakhPynbMAqdRScaoAgbFmTwfNcocqKg4drdphKNKviMJHCuHan8cB9Hgqs-D85heE_wdNG2bwTegNXVMtBUvFBI4sMTCY";

#[tokio::test]
async fn issued_certificate_is_served() {
    let app = TestWfe::new();
    let (key, _) = app.account().await;
    app.authorize(&key, "example.com").await;

    let issued = app.issue(&key, &TestKey::generate(), "example.com").await;
    assert_eq!(issued.status, StatusCode::CREATED);
    assert_eq!(issued.header("content-type"), Some("application/pkix-cert"));
    assert!(issued
        .links()
        .contains(&"<http://localhost:4000/acme/issuer-cert>;rel=\"up\"".to_string()));

    let details = CertificateDetails::from_der(&issued.body).expect("issued DER");
    assert_eq!(details.dns_names, vec!["example.com".to_string()]);
    let cert_path = issued.location_path();
    assert_eq!(cert_path, format!("/acme/cert/{}", details.serial));

    let fetched = app.get(&cert_path).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body, issued.body);
    assert_eq!(fetched.header("cache-control"), Some("public, max-age=21600"));
    assert!(fetched
        .links()
        .contains(&"<http://localhost:4000/acme/issuer-cert>;rel=\"up\"".to_string()));
}

#[tokio::test]
async fn issuance_requires_authorized_names() {
    let app = TestWfe::new();
    let (key, _) = app.account().await;

    let response = app.issue(&key, &TestKey::generate(), "example.com").await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.problem_type(), "urn:acme:error:unauthorized");
    assert!(response.detail().contains("example.com"));
}

#[tokio::test]
async fn issuance_requires_agreement() {
    let app = TestWfe::new();
    let key = TestKey::generate();
    assert_eq!(app.register(&key, false).await.status, StatusCode::CREATED);

    let response = app.issue(&key, &TestKey::generate(), "example.com").await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(
        response.detail(),
        "Must agree to subscriber agreement before any further actions"
    );
}

#[tokio::test]
async fn csr_with_account_key_is_refused() {
    let app = TestWfe::new();
    let (key, _) = app.account().await;
    app.authorize(&key, "example.com").await;

    let response = app.issue(&key, &key, "example.com").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.detail().starts_with("Error creating new cert"));
}

#[tokio::test]
async fn invalid_serial_is_not_found_and_uncached() {
    let app = TestWfe::new();

    for path in ["/acme/cert/not-a-serial", "/acme/cert/0000000000000000000000000000000a"] {
        let response = app.get(path).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "{path}");
        assert_eq!(response.header("cache-control"), Some("public, max-age=0, no-cache"));
        assert!(response.detail().starts_with("Certificate not found"));
    }
}

#[tokio::test]
async fn issuer_certificate_is_served() {
    let app = TestWfe::new();
    let response = app.get("/acme/issuer-cert").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), Some("application/pkix-cert"));
    assert_eq!(response.header("cache-control"), Some("public, max-age=172800"));
    assert_eq!(response.body, app.authority.issuer_der());
}

#[tokio::test]
async fn csr_with_weak_key_is_refused() {
    let app = TestWfe::new();
    let (key, _) = app.account().await;
    app.authorize(&key, "example.com").await;

    let csr = decode_b64(WEAK_RSA_CSR).expect("csr fixture");
    let response = app.issue_csr(&key, &csr).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.problem_type(), "urn:acme:error:malformed");
    assert!(response.detail().starts_with("Invalid key in certificate request :: Key too small"));
}

#[tokio::test]
async fn ambiguous_serial_conflicts() {
    let (app, backend) = TestWfe::planted();
    let (key, id) = app.account().await;
    let serial = backend.plant(id, &[0x0a; 16], key.self_signed("example.com", &[0x0a; 16]));
    backend.plant(id, &[0x0a; 16], TestKey::generate().self_signed("example.com", &[0x0a; 16]));

    let response = app.get(&format!("/acme/cert/{serial}")).await;
    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.problem_type(), "urn:acme:error:malformed");
    assert!(response.detail().starts_with("Multiple certificates with same short serial"));
    assert_eq!(response.header("cache-control"), None);
}
