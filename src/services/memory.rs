//! In-memory registration authority and storage.
//!
//! Accounts, authorizations and certificates live in process memory and are
//! lost on restart. Challenge responses are accepted when the key
//! authorization matches; no network validation is performed. Certificates
//! are signed by an issuer generated at construction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequestParams, DistinguishedName,
    DnType, IsCa, KeyPair, SanType, SerialNumber,
};
use ring::rand::{SecureRandom, SystemRandom};
use rustls::pki_types::CertificateSigningRequestDer;
use time::OffsetDateTime;
use tracing::{debug, info};

use super::{RegistrationAuthority, StorageGetter};
use crate::domain::{
    serial_to_string, Authorization, Certificate, CertificateRequest, CertificateStatus,
    Challenge, ChallengeResponse, Clock, Identifier, Registration, Status, SystemClock,
};
use crate::errors::AcmeError;
use crate::jose::{encode_b64, good_key, Jwk};

const PENDING_AUTHORIZATION_LIFETIME_DAYS: i64 = 7;
const VALID_AUTHORIZATION_LIFETIME_DAYS: i64 = 300;
const CERTIFICATE_LIFETIME_DAYS: i64 = 90;
const CHALLENGE_TYPES: &[&str] = &["http-01", "dns-01"];

#[derive(Debug, Default)]
struct Records {
    registrations: HashMap<i64, Registration>,
    /// key thumbprint -> registration ID
    registrations_by_key: HashMap<String, i64>,
    authorizations: HashMap<String, Authorization>,
    certificates: HashMap<String, Certificate>,
    next_registration_id: i64,
    next_challenge_id: i64,
}

struct Issuer {
    key: KeyPair,
    certificate: rcgen::Certificate,
}

/// Development backend implementing both collaborator traits.
pub struct MemoryAuthority {
    records: Mutex<Records>,
    issuer: Issuer,
    clock: Arc<dyn Clock>,
    rng: SystemRandom,
}

impl std::fmt::Debug for MemoryAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAuthority").finish_non_exhaustive()
    }
}

impl MemoryAuthority {
    pub fn new() -> Result<Self, AcmeError> {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Result<Self, AcmeError> {
        let issuer = generate_issuer(clock.now())?;
        info!("Generated in-memory issuer for development");
        Ok(Self {
            records: Mutex::new(Records {
                next_registration_id: 1,
                next_challenge_id: 1,
                ..Default::default()
            }),
            issuer,
            clock,
            rng: SystemRandom::new(),
        })
    }

    /// DER of the certificate that signs everything issued here.
    pub fn issuer_der(&self) -> Vec<u8> {
        self.issuer.certificate.der().to_vec()
    }

    fn random_token(&self) -> Result<String, AcmeError> {
        let mut bytes = [0u8; 32];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AcmeError::internal("Unable to generate challenge token"))?;
        Ok(encode_b64(&bytes))
    }

    fn random_serial(&self) -> Result<Vec<u8>, AcmeError> {
        let mut bytes = vec![0u8; 16];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AcmeError::internal("Unable to generate serial"))?;
        bytes[0] &= 0x7f;
        bytes[0] |= 0x01;
        Ok(bytes)
    }

    /// Names in `names` lacking a valid, unexpired authorization owned by
    /// `registration_id`.
    fn unauthorized_names(&self, names: &[String], registration_id: i64) -> Vec<String> {
        let now = self.clock.now();
        let records = self.records.lock();
        names
            .iter()
            .filter(|name| {
                !records.authorizations.values().any(|authz| {
                    authz.registration_id == registration_id
                        && authz.status == Status::Valid
                        && !authz.is_expired(now)
                        && authz.identifier.value.eq_ignore_ascii_case(name)
                })
            })
            .cloned()
            .collect()
    }
}

fn to_offset(moment: DateTime<Utc>) -> Result<OffsetDateTime, AcmeError> {
    OffsetDateTime::from_unix_timestamp(moment.timestamp())
        .map_err(|e| AcmeError::internal(format!("Timestamp out of range: {e}")))
}

fn generate_issuer(now: DateTime<Utc>) -> Result<Issuer, AcmeError> {
    let rcgen_err = |e: rcgen::Error| AcmeError::internal(format!("Unable to create issuer: {e}"));

    let key = KeyPair::generate().map_err(rcgen_err)?;
    let mut params = CertificateParams::new(Vec::<String>::new()).map_err(rcgen_err)?;
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, "acme-wfe development issuer");
    params.distinguished_name = name;
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.not_before = to_offset(now - Duration::hours(1))?;
    params.not_after = to_offset(now + Duration::days(3650))?;

    let certificate = params.self_signed(&key).map_err(rcgen_err)?;
    Ok(Issuer { key, certificate })
}

#[async_trait]
impl RegistrationAuthority for MemoryAuthority {
    async fn new_registration(
        &self,
        registration: Registration,
    ) -> Result<Registration, AcmeError> {
        good_key(&registration.key)?;
        let thumbprint = registration.key.thumbprint();

        let mut records = self.records.lock();
        if records.registrations_by_key.contains_key(&thumbprint) {
            return Err(AcmeError::duplicate("Registration key is already in use"));
        }

        let id = records.next_registration_id;
        records.next_registration_id += 1;
        let created = Registration { id, ..registration };
        records.registrations_by_key.insert(thumbprint, id);
        records.registrations.insert(id, created.clone());

        debug!(registration_id = id, "Created registration");
        Ok(created)
    }

    async fn new_authorization(
        &self,
        identifier: Identifier,
        registration_id: i64,
    ) -> Result<Authorization, AcmeError> {
        if identifier.kind != "dns" {
            return Err(AcmeError::malformed(format!(
                "Invalid identifier type '{}'",
                identifier.kind
            )));
        }
        if identifier.value.is_empty() || identifier.value.contains('*') {
            return Err(AcmeError::malformed("Invalid identifier value"));
        }

        let account_key = {
            let records = self.records.lock();
            records
                .registrations
                .get(&registration_id)
                .map(|registration| registration.key.clone())
                .ok_or_else(|| AcmeError::no_such_registration("No such registration"))?
        };

        let mut challenges = Vec::with_capacity(CHALLENGE_TYPES.len());
        for kind in CHALLENGE_TYPES {
            challenges.push(Challenge {
                id: 0,
                kind: kind.to_string(),
                status: Status::Pending,
                error: None,
                validated: None,
                token: self.random_token()?,
                key_authorization: None,
                account_key: Some(account_key.clone()),
            });
        }

        let mut records = self.records.lock();
        for challenge in &mut challenges {
            challenge.id = records.next_challenge_id;
            records.next_challenge_id += 1;
        }

        let authorization = Authorization {
            id: uuid::Uuid::new_v4().simple().to_string(),
            identifier,
            registration_id,
            status: Status::Pending,
            expires: Some(self.clock.now() + Duration::days(PENDING_AUTHORIZATION_LIFETIME_DAYS)),
            combinations: (0..challenges.len()).map(|index| vec![index]).collect(),
            challenges,
        };
        records.authorizations.insert(authorization.id.clone(), authorization.clone());

        debug!(authorization_id = %authorization.id, registration_id, "Created authorization");
        Ok(authorization)
    }

    async fn new_certificate(
        &self,
        request: CertificateRequest,
        registration_id: i64,
    ) -> Result<Certificate, AcmeError> {
        let csr = request.parse()?;
        good_key(&csr.key)?;

        let registration = self.get_registration(registration_id).await?;
        if registration.key.same_key(&csr.key) {
            return Err(AcmeError::malformed(
                "Certificate public key must be different than account key",
            ));
        }

        let mut names = csr.dns_names.clone();
        if let Some(common_name) = &csr.common_name {
            if !names.iter().any(|name| name.eq_ignore_ascii_case(common_name)) {
                names.push(common_name.clone());
            }
        }
        if names.is_empty() {
            return Err(AcmeError::malformed("CSR has no names in it"));
        }

        let missing = self.unauthorized_names(&names, registration_id);
        if !missing.is_empty() {
            return Err(AcmeError::unauthorized(format!(
                "Authorizations for these names not found or expired: {}",
                missing.join(", ")
            )));
        }

        let rcgen_err = |e: rcgen::Error| AcmeError::malformed(format!("Unable to sign CSR: {e}"));
        let der = CertificateSigningRequestDer::from(request.csr.clone());
        let mut csr_params = CertificateSigningRequestParams::from_der(&der).map_err(rcgen_err)?;

        let now = self.clock.now();
        let expires = now + Duration::days(CERTIFICATE_LIFETIME_DAYS);
        let serial = self.random_serial()?;

        csr_params.params.serial_number = Some(SerialNumber::from_slice(&serial));
        csr_params.params.not_before = to_offset(now)?;
        csr_params.params.not_after = to_offset(expires)?;
        csr_params.params.is_ca = IsCa::NoCa;
        if csr.dns_names.is_empty() {
            for name in &names {
                let dns = name.clone().try_into().map_err(rcgen_err)?;
                csr_params.params.subject_alt_names.push(SanType::DnsName(dns));
            }
        }

        let issued = csr_params
            .signed_by(&self.issuer.certificate, &self.issuer.key)
            .map_err(rcgen_err)?;

        let certificate = Certificate {
            registration_id,
            serial: serial_to_string(&serial),
            der: issued.der().to_vec(),
            status: CertificateStatus::Good,
            issued: now,
            expires,
        };
        self.records
            .lock()
            .certificates
            .insert(certificate.serial.clone(), certificate.clone());

        info!(serial = %certificate.serial, registration_id, names = ?names, "Issued certificate");
        Ok(certificate)
    }

    async fn update_registration(
        &self,
        current: Registration,
        update: Registration,
    ) -> Result<Registration, AcmeError> {
        let mut records = self.records.lock();
        let stored = records
            .registrations
            .get_mut(&current.id)
            .ok_or_else(|| AcmeError::no_such_registration("No such registration"))?;

        if !update.contact.is_empty() {
            stored.contact = update.contact;
        }
        if !update.agreement.is_empty() {
            stored.agreement = update.agreement;
        }

        Ok(stored.clone())
    }

    async fn update_authorization(
        &self,
        authorization: Authorization,
        challenge_index: usize,
        response: ChallengeResponse,
    ) -> Result<Authorization, AcmeError> {
        let mut records = self.records.lock();
        let stored = records
            .authorizations
            .get_mut(&authorization.id)
            .ok_or_else(|| AcmeError::not_found("Unable to find authorization"))?;

        let challenge = stored
            .challenges
            .get_mut(challenge_index)
            .ok_or_else(|| AcmeError::malformed("Invalid challenge index"))?;

        if let Some(kind) = &response.kind {
            if kind != &challenge.kind {
                return Err(AcmeError::malformed(format!(
                    "Challenge type '{}' does not match '{}'",
                    kind, challenge.kind
                )));
            }
        }

        let expected = challenge
            .account_key
            .as_ref()
            .map(|key| key_authorization(&challenge.token, key))
            .ok_or_else(|| AcmeError::internal("Challenge has no account key"))?;
        match response.key_authorization.as_deref() {
            Some(provided) if provided == expected => {}
            _ => return Err(AcmeError::malformed("Response does not complete challenge")),
        }

        let now = self.clock.now();
        challenge.key_authorization = Some(expected);
        challenge.status = Status::Valid;
        challenge.validated = Some(now);

        stored.status = Status::Valid;
        stored.expires = Some(now + Duration::days(VALID_AUTHORIZATION_LIFETIME_DAYS));

        debug!(authorization_id = %stored.id, challenge_index, "Challenge validated");
        Ok(stored.clone())
    }

    async fn revoke_certificate(
        &self,
        certificate: Certificate,
        reason: u8,
        requester: Option<i64>,
    ) -> Result<(), AcmeError> {
        let mut records = self.records.lock();
        let stored = records
            .certificates
            .get_mut(&certificate.serial)
            .ok_or_else(|| AcmeError::not_found("No such certificate"))?;

        stored.status = CertificateStatus::Revoked;
        info!(serial = %stored.serial, reason, requester = ?requester, "Revoked certificate");
        Ok(())
    }
}

#[async_trait]
impl StorageGetter for MemoryAuthority {
    async fn get_registration(&self, id: i64) -> Result<Registration, AcmeError> {
        self.records
            .lock()
            .registrations
            .get(&id)
            .cloned()
            .ok_or_else(|| AcmeError::no_such_registration(format!("No registration with ID {id}")))
    }

    async fn get_registration_by_key(&self, key: &Jwk) -> Result<Registration, AcmeError> {
        let records = self.records.lock();
        records
            .registrations_by_key
            .get(&key.thumbprint())
            .and_then(|id| records.registrations.get(id))
            .cloned()
            .ok_or_else(|| AcmeError::no_such_registration("No registration exists for this key"))
    }

    async fn get_authorization(&self, id: &str) -> Result<Authorization, AcmeError> {
        self.records
            .lock()
            .authorizations
            .get(id)
            .cloned()
            .ok_or_else(|| AcmeError::not_found("Unable to find authorization"))
    }

    async fn get_certificate(&self, serial: &str) -> Result<Certificate, AcmeError> {
        self.records
            .lock()
            .certificates
            .get(serial)
            .cloned()
            .ok_or_else(|| AcmeError::not_found("Certificate not found"))
    }
}

/// `token || '.' || thumbprint(account key)`
pub fn key_authorization(token: &str, account_key: &Jwk) -> String {
    format!("{}.{}", token, account_key.thumbprint())
}
