use std::collections::HashMap;
use std::sync::Arc;

use acme_wfe::api::{build_router, WebFrontEnd, WfeState};
use acme_wfe::domain::{
    serial_to_string, Authorization, Certificate, CertificateRequest, CertificateStatus,
    ChallengeResponse, FixedClock, Identifier, Registration,
};
use acme_wfe::errors::AcmeError;
use acme_wfe::jose::{encode_b64, Jwk};
use acme_wfe::services::memory::key_authorization;
use acme_wfe::services::{MemoryAuthority, RegistrationAuthority, StorageGetter};
use acme_wfe::AppConfig;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use rcgen::{CertificateParams, DistinguishedName, DnType, SerialNumber};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair as _, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const BASE_URL: &str = "http://localhost:4000";
pub const AGREEMENT_URL: &str = "http://localhost:4000/terms/v1";
pub const CLIENT_IP: &str = "203.0.113.7";
pub const ORIGIN: &str = "https://client.test";

/// An ECDSA P-256 key usable both for signing envelopes and for CSRs.
pub struct TestKey {
    signer: EcdsaKeyPair,
    key_pair: rcgen::KeyPair,
    pub jwk: Jwk,
}

impl TestKey {
    pub fn generate() -> Self {
        let key_pair = rcgen::KeyPair::generate().expect("generate key");
        let signer = EcdsaKeyPair::from_pkcs8(
            &ECDSA_P256_SHA256_FIXED_SIGNING,
            &key_pair.serialize_der(),
            &SystemRandom::new(),
        )
        .expect("load key into ring");
        let jwk = Jwk::ec_from_point(signer.public_key().as_ref()).expect("jwk");
        Self { signer, key_pair, jwk }
    }

    /// Flattened JSON serialization with the key embedded in the protected header.
    pub fn sign(&self, payload: &Value, nonce: &str) -> String {
        let header = json!({ "alg": "ES256", "jwk": self.jwk, "nonce": nonce });
        let protected = encode_b64(header.to_string().as_bytes());
        let payload = encode_b64(payload.to_string().as_bytes());
        let signature = self
            .signer
            .sign(&SystemRandom::new(), format!("{protected}.{payload}").as_bytes())
            .expect("sign");
        json!({
            "protected": protected,
            "payload": payload,
            "signature": encode_b64(signature.as_ref()),
        })
        .to_string()
    }

    pub fn csr(&self, names: &[&str]) -> Vec<u8> {
        let mut params =
            CertificateParams::new(names.iter().map(|n| n.to_string()).collect::<Vec<_>>())
                .expect("csr params");
        params.distinguished_name = DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, names[0]);
        params.serialize_request(&self.key_pair).expect("csr").der().to_vec()
    }

    /// Self-signed certificate for `domain` over this key, with a fixed serial.
    pub fn self_signed(&self, domain: &str, serial: &[u8]) -> Vec<u8> {
        let mut params = CertificateParams::new(vec![domain.to_string()]).expect("cert params");
        params.serial_number = Some(SerialNumber::from_slice(serial));
        params.self_signed(&self.key_pair).expect("self-signed").der().to_vec()
    }
}

/// Backend that answers certificate lookups from planted records before
/// falling back to the in-memory authority. A serial planted more than once is
/// ambiguous. Revoking a planted certificate marks it and records the requester.
pub struct PlantedBackend {
    inner: Arc<MemoryAuthority>,
    certificates: Mutex<HashMap<String, Vec<Certificate>>>,
    pub revocations: Mutex<Vec<(String, Option<i64>)>>,
}

impl PlantedBackend {
    pub fn new(inner: Arc<MemoryAuthority>) -> Self {
        Self { inner, certificates: Mutex::default(), revocations: Mutex::default() }
    }

    /// Plant `der` as issued to `registration_id`. Returns the serial.
    pub fn plant(&self, registration_id: i64, serial: &[u8], der: Vec<u8>) -> String {
        let serial = serial_to_string(serial);
        let issued = Utc::now();
        let certificate = Certificate {
            registration_id,
            serial: serial.clone(),
            der,
            status: CertificateStatus::Good,
            issued,
            expires: issued + Duration::days(90),
        };
        self.certificates.lock().entry(serial.clone()).or_default().push(certificate);
        serial
    }
}

#[async_trait]
impl StorageGetter for PlantedBackend {
    async fn get_registration(&self, id: i64) -> Result<Registration, AcmeError> {
        self.inner.get_registration(id).await
    }

    async fn get_registration_by_key(&self, key: &Jwk) -> Result<Registration, AcmeError> {
        self.inner.get_registration_by_key(key).await
    }

    async fn get_authorization(&self, id: &str) -> Result<Authorization, AcmeError> {
        self.inner.get_authorization(id).await
    }

    async fn get_certificate(&self, serial: &str) -> Result<Certificate, AcmeError> {
        let planted = self.certificates.lock().get(serial).cloned();
        match planted.as_deref() {
            Some([certificate]) => Ok(certificate.clone()),
            Some(_) => Err(AcmeError::duplicate(format!("Serial {serial} is not unique"))),
            None => self.inner.get_certificate(serial).await,
        }
    }
}

#[async_trait]
impl RegistrationAuthority for PlantedBackend {
    async fn new_registration(
        &self,
        registration: Registration,
    ) -> Result<Registration, AcmeError> {
        self.inner.new_registration(registration).await
    }

    async fn new_authorization(
        &self,
        identifier: Identifier,
        registration_id: i64,
    ) -> Result<Authorization, AcmeError> {
        self.inner.new_authorization(identifier, registration_id).await
    }

    async fn new_certificate(
        &self,
        request: CertificateRequest,
        registration_id: i64,
    ) -> Result<Certificate, AcmeError> {
        self.inner.new_certificate(request, registration_id).await
    }

    async fn update_registration(
        &self,
        current: Registration,
        update: Registration,
    ) -> Result<Registration, AcmeError> {
        self.inner.update_registration(current, update).await
    }

    async fn update_authorization(
        &self,
        authorization: Authorization,
        challenge_index: usize,
        response: ChallengeResponse,
    ) -> Result<Authorization, AcmeError> {
        self.inner.update_authorization(authorization, challenge_index, response).await
    }

    async fn revoke_certificate(
        &self,
        certificate: Certificate,
        reason: u8,
        requester: Option<i64>,
    ) -> Result<(), AcmeError> {
        let planted = match self.certificates.lock().get_mut(&certificate.serial) {
            Some(planted) => {
                planted.iter_mut().for_each(|stored| stored.status = CertificateStatus::Revoked);
                true
            }
            None => false,
        };
        if !planted {
            return self.inner.revoke_certificate(certificate, reason, requester).await;
        }
        self.revocations.lock().push((certificate.serial, requester));
        Ok(())
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("json body")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn links(&self) -> Vec<String> {
        self.headers
            .get_all(header::LINK)
            .iter()
            .filter_map(|value| value.to_str().ok().map(str::to_string))
            .collect()
    }

    pub fn problem_type(&self) -> String {
        self.json()["type"].as_str().unwrap_or_default().to_string()
    }

    pub fn detail(&self) -> String {
        self.json()["detail"].as_str().unwrap_or_default().to_string()
    }

    /// Location header with the base URL removed, ready to be requested.
    pub fn location_path(&self) -> String {
        let location = self.header("location").expect("location header");
        location.strip_prefix(BASE_URL).unwrap_or(location).to_string()
    }
}

/// Web front end backed by the in-memory authority and a fixed clock.
pub struct TestWfe {
    pub wfe: WfeState,
    pub authority: Arc<MemoryAuthority>,
    pub clock: Arc<FixedClock>,
    router: Router,
}

impl TestWfe {
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.wfe.allow_origins = vec![ORIGIN.to_string()];
        Self::with_config(config)
    }

    pub fn with_config(config: AppConfig) -> Self {
        let (clock, authority) = Self::authority();
        Self::assemble(config, clock, authority.clone(), authority.clone(), authority)
    }

    /// Front end whose collaborators are a [`PlantedBackend`].
    pub fn planted() -> (Self, Arc<PlantedBackend>) {
        let (clock, authority) = Self::authority();
        let backend = Arc::new(PlantedBackend::new(authority.clone()));
        let app = Self::assemble(
            AppConfig::default(),
            clock,
            authority,
            backend.clone(),
            backend.clone(),
        );
        (app, backend)
    }

    fn authority() -> (Arc<FixedClock>, Arc<MemoryAuthority>) {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let authority =
            Arc::new(MemoryAuthority::with_clock(clock.clone()).expect("in-memory authority"));
        (clock, authority)
    }

    fn assemble(
        config: AppConfig,
        clock: Arc<FixedClock>,
        authority: Arc<MemoryAuthority>,
        ra: Arc<dyn RegistrationAuthority>,
        sa: Arc<dyn StorageGetter>,
    ) -> Self {
        let issuer = authority.issuer_der();
        let wfe =
            Arc::new(WebFrontEnd::new(&config, ra, sa, issuer).with_clock(clock.clone()));
        let router = build_router(wfe.clone()).expect("router");
        Self { wfe, authority, clock, router }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.expect("request");
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
        TestResponse { status, headers, body: body.to_vec() }
    }

    pub async fn request(&self, method: Method, path: &str) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("x-real-ip", CLIENT_IP)
            .body(Body::empty())
            .expect("build request");
        self.send(request).await
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.request(Method::GET, path).await
    }

    pub async fn nonce(&self) -> String {
        let response = self.request(Method::HEAD, "/directory").await;
        response.header("replay-nonce").expect("replay-nonce header").to_string()
    }

    /// POST a raw body with an explicit Content-Length.
    pub async fn post_raw(&self, path: &str, body: String) -> TestResponse {
        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("x-real-ip", CLIENT_IP)
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .expect("build request");
        self.send(request).await
    }

    pub async fn post(&self, path: &str, key: &TestKey, payload: Value) -> TestResponse {
        let nonce = self.nonce().await;
        self.post_raw(path, key.sign(&payload, &nonce)).await
    }

    pub async fn register(&self, key: &TestKey, agree: bool) -> TestResponse {
        let mut payload = json!({
            "resource": "new-reg",
            "contact": ["mailto:admin@example.com"],
        });
        if agree {
            payload["agreement"] = json!(AGREEMENT_URL);
        }
        self.post("/acme/new-reg", key, payload).await
    }

    /// A registered account that accepted the current agreement.
    pub async fn account(&self) -> (TestKey, i64) {
        let key = TestKey::generate();
        let response = self.register(&key, true).await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text());
        let id = response.json()["id"].as_i64().expect("registration id");
        (key, id)
    }

    pub async fn new_authorization(&self, key: &TestKey, domain: &str) -> TestResponse {
        self.post(
            "/acme/new-authz",
            key,
            json!({
                "resource": "new-authz",
                "identifier": { "type": "dns", "value": domain },
            }),
        )
        .await
    }

    /// Answer the first challenge of a fresh authorization with the correct
    /// key authorization. Returns the authorization path.
    pub async fn authorize(&self, key: &TestKey, domain: &str) -> String {
        let created = self.new_authorization(key, domain).await;
        assert_eq!(created.status, StatusCode::CREATED, "{}", created.text());
        let authz_path = created.location_path();
        let authz = created.json();
        let challenge = &authz["challenges"][0];
        let token = challenge["token"].as_str().expect("challenge token");
        let uri = challenge["uri"].as_str().expect("challenge uri");

        let answered = self
            .post(
                uri.strip_prefix(BASE_URL).unwrap_or(uri),
                key,
                json!({
                    "resource": "challenge",
                    "type": challenge["type"],
                    "keyAuthorization": key_authorization(token, &key.jwk),
                }),
            )
            .await;
        assert_eq!(answered.status, StatusCode::ACCEPTED, "{}", answered.text());
        authz_path
    }

    pub async fn issue(
        &self,
        key: &TestKey,
        certificate_key: &TestKey,
        domain: &str,
    ) -> TestResponse {
        self.issue_csr(key, &certificate_key.csr(&[domain])).await
    }

    pub async fn issue_csr(&self, key: &TestKey, csr: &[u8]) -> TestResponse {
        let payload = json!({ "resource": "new-cert", "csr": encode_b64(csr) });
        self.post("/acme/new-cert", key, payload).await
    }

    /// Issue a certificate for `domain` to a new account. Returns the account
    /// key, the certificate key and the issued DER.
    pub async fn issued_certificate(&self, domain: &str) -> (TestKey, TestKey, Vec<u8>) {
        let (key, _) = self.account().await;
        self.authorize(&key, domain).await;
        let certificate_key = TestKey::generate();
        let issued = self.issue(&key, &certificate_key, domain).await;
        assert_eq!(issued.status, StatusCode::CREATED, "{}", issued.text());
        (key, certificate_key, issued.body)
    }

    pub async fn revoke(&self, signer: &TestKey, der: &[u8]) -> TestResponse {
        self.post(
            "/acme/revoke-cert",
            signer,
            json!({ "resource": "revoke-cert", "certificate": encode_b64(der) }),
        )
        .await
    }
}

impl Default for TestWfe {
    fn default() -> Self {
        Self::new()
    }
}
