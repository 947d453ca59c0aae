//! # Backend Collaborators
//!
//! The front end authenticates requests and enforces lifecycle checks; the
//! actual work is delegated to a registration authority and read-only
//! storage. Both are async traits so deployments can plug in remote
//! services. [`memory::MemoryAuthority`] implements both for development and
//! tests.
//!
//! Implementations report failures as [`AcmeError`]; the front end maps
//! them to problem documents without inspecting anything else.

pub mod memory;

pub use memory::MemoryAuthority;

use async_trait::async_trait;

use crate::domain::{
    Authorization, Certificate, CertificateRequest, ChallengeResponse, Identifier, Registration,
};
use crate::errors::AcmeError;
use crate::jose::Jwk;

/// RFC 5280 reason code used for client-initiated revocation.
pub const REVOCATION_REASON_UNSPECIFIED: u8 = 0;

/// Performs state-changing ACME operations.
#[async_trait]
pub trait RegistrationAuthority: Send + Sync {
    /// Create an account. The returned registration carries its assigned ID.
    async fn new_registration(&self, registration: Registration) -> Result<Registration, AcmeError>;

    /// Create a pending authorization for `identifier` owned by `registration_id`.
    async fn new_authorization(
        &self,
        identifier: Identifier,
        registration_id: i64,
    ) -> Result<Authorization, AcmeError>;

    /// Issue a certificate for a CSR.
    async fn new_certificate(
        &self,
        request: CertificateRequest,
        registration_id: i64,
    ) -> Result<Certificate, AcmeError>;

    /// Apply the client-controlled fields of `update` to `current`.
    async fn update_registration(
        &self,
        current: Registration,
        update: Registration,
    ) -> Result<Registration, AcmeError>;

    /// Record the client's response to the challenge at `challenge_index`.
    async fn update_authorization(
        &self,
        authorization: Authorization,
        challenge_index: usize,
        response: ChallengeResponse,
    ) -> Result<Authorization, AcmeError>;

    /// Revoke an issued certificate. `requester` is the account that asked,
    /// `None` when the request was signed by the certificate key.
    async fn revoke_certificate(
        &self,
        certificate: Certificate,
        reason: u8,
        requester: Option<i64>,
    ) -> Result<(), AcmeError>;
}

/// Read-only lookups.
#[async_trait]
pub trait StorageGetter: Send + Sync {
    async fn get_registration(&self, id: i64) -> Result<Registration, AcmeError>;

    /// Fails with [`AcmeError::NoSuchRegistration`] when no account owns `key`.
    async fn get_registration_by_key(&self, key: &Jwk) -> Result<Registration, AcmeError>;

    async fn get_authorization(&self, id: &str) -> Result<Authorization, AcmeError>;

    /// Fails with [`AcmeError::NotFound`] for unknown serials and
    /// [`AcmeError::Duplicate`] when the serial is ambiguous.
    async fn get_certificate(&self, serial: &str) -> Result<Certificate, AcmeError>;
}
