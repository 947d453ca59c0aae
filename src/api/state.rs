use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::warn;

use crate::config::AppConfig;
use crate::domain::{Clock, SystemClock};
use crate::errors::AcmeError;
use crate::nonce::NonceService;
use crate::observability::MetricsRecorder;
use crate::services::{RegistrationAuthority, StorageGetter};

pub const DIRECTORY_PATH: &str = "/directory";
pub const NEW_REG_PATH: &str = "/acme/new-reg";
pub const REG_PATH: &str = "/acme/reg/";
pub const NEW_AUTHZ_PATH: &str = "/acme/new-authz";
pub const AUTHZ_PATH: &str = "/acme/authz/";
pub const CHALLENGE_PATH: &str = "/acme/challenge/";
pub const NEW_CERT_PATH: &str = "/acme/new-cert";
pub const CERT_PATH: &str = "/acme/cert/";
pub const REVOKE_CERT_PATH: &str = "/acme/revoke-cert";
pub const TERMS_PATH: &str = "/terms";
pub const ISSUER_PATH: &str = "/acme/issuer-cert";
pub const BUILD_ID_PATH: &str = "/build";

/// Absolute URLs advertised to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcmeUrls {
    pub base: String,
    pub directory: String,
    pub new_reg: String,
    pub reg_base: String,
    pub new_authz: String,
    pub authz_base: String,
    pub challenge_base: String,
    pub new_cert: String,
    pub cert_base: String,
    pub revoke_cert: String,
    pub issuer: String,
}

impl AcmeUrls {
    pub fn new(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        let url = |path: &str| format!("{base}{path}");
        Self {
            base: base.to_string(),
            directory: url(DIRECTORY_PATH),
            new_reg: url(NEW_REG_PATH),
            reg_base: url(REG_PATH),
            new_authz: url(NEW_AUTHZ_PATH),
            authz_base: url(AUTHZ_PATH),
            challenge_base: url(CHALLENGE_PATH),
            new_cert: url(NEW_CERT_PATH),
            cert_base: url(CERT_PATH),
            revoke_cert: url(REVOKE_CERT_PATH),
            issuer: url(ISSUER_PATH),
        }
    }
}

/// Everything the handlers share. Immutable after construction apart from
/// the nonce registry.
pub struct WebFrontEnd {
    pub urls: AcmeUrls,
    /// Serialized once at startup.
    pub directory: Vec<u8>,
    pub subscriber_agreement_url: String,
    pub allow_origins: Vec<String>,
    pub cert_cache_seconds: u64,
    pub index_cache_seconds: u64,
    pub issuer_cache_seconds: u64,
    pub issuer_der: Vec<u8>,
    pub build_id: String,
    pub ra: Arc<dyn RegistrationAuthority>,
    pub sa: Arc<dyn StorageGetter>,
    pub nonces: NonceService,
    pub clock: Arc<dyn Clock>,
    pub metrics: MetricsRecorder,
    pub max_body_size: usize,
    pub backend_timeout: Duration,
}

pub type WfeState = Arc<WebFrontEnd>;

impl std::fmt::Debug for WebFrontEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebFrontEnd")
            .field("urls", &self.urls)
            .field("subscriber_agreement_url", &self.subscriber_agreement_url)
            .field("allow_origins", &self.allow_origins)
            .field("max_body_size", &self.max_body_size)
            .field("backend_timeout", &self.backend_timeout)
            .finish_non_exhaustive()
    }
}

impl WebFrontEnd {
    pub fn new(
        config: &AppConfig,
        ra: Arc<dyn RegistrationAuthority>,
        sa: Arc<dyn StorageGetter>,
        issuer_der: Vec<u8>,
    ) -> Self {
        let urls = AcmeUrls::new(config.wfe.base());
        let directory = json!({
            "new-reg": urls.new_reg,
            "new-authz": urls.new_authz,
            "new-cert": urls.new_cert,
            "revoke-cert": urls.revoke_cert,
        })
        .to_string()
        .into_bytes();

        Self {
            urls,
            directory,
            subscriber_agreement_url: config.wfe.subscriber_agreement_url.clone(),
            allow_origins: config.wfe.allow_origins.clone(),
            cert_cache_seconds: config.wfe.cert_cache_seconds,
            index_cache_seconds: config.wfe.index_cache_seconds,
            issuer_cache_seconds: config.wfe.issuer_cache_seconds,
            issuer_der,
            build_id: format!("{}={}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
            ra,
            sa,
            nonces: NonceService::from_config(&config.nonce),
            clock: Arc::new(SystemClock),
            metrics: MetricsRecorder::new(),
            max_body_size: config.server.max_body_size,
            backend_timeout: config.server.backend_timeout(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run a backend call under the configured timeout.
    pub async fn backend<T, F>(&self, operation: &str, call: F) -> Result<T, AcmeError>
    where
        F: Future<Output = Result<T, AcmeError>>,
    {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.backend_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout = ?self.backend_timeout, "Backend call timed out");
                Err(AcmeError::internal(format!("{operation} timed out")))
            }
        };
        self.metrics.record_backend_call(
            operation,
            result.is_ok(),
            started.elapsed().as_secs_f64(),
        );
        result
    }

    /// True when the agreement in an account payload is acceptable: absent
    /// or the current one.
    pub fn agreement_acceptable(&self, agreement: &str) -> bool {
        agreement.is_empty() || agreement == self.subscriber_agreement_url
    }
}
