use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use x509_parser::{
    certificate::X509Certificate,
    certification_request::X509CertificationRequest,
    extensions::{GeneralName, ParsedExtension},
    prelude::FromDer,
};

use crate::errors::AcmeError;
use crate::jose::{base64url, Jwk};

/// Serials in certificate URLs: exactly 32 lowercase hex digits.
static VALID_SERIAL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{32}$").expect("serial pattern compiles"));

pub fn valid_serial(serial: &str) -> bool {
    VALID_SERIAL_REGEX.is_match(serial)
}

/// Render a big-endian serial as lowercase hex, zero-padded to 32 digits.
pub fn serial_to_string(serial: &[u8]) -> String {
    let encoded = hex::encode(serial);
    format!("{:0>32}", encoded.trim_start_matches('0'))
}

/// OCSP-style status of an issued certificate. Revocation is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    #[default]
    Good,
    Revoked,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Good => "good",
            CertificateStatus::Revoked => "revoked",
        }
    }
}

/// An issued certificate as held by storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub registration_id: i64,
    pub serial: String,
    #[serde(with = "base64url")]
    pub der: Vec<u8>,
    pub status: CertificateStatus,
    pub issued: DateTime<Utc>,
    pub expires: DateTime<Utc>,
}

impl Certificate {
    pub fn is_revoked(&self) -> bool {
        self.status == CertificateStatus::Revoked
    }
}

/// Fields of an X.509 certificate the front end acts on.
#[derive(Debug, Clone, PartialEq)]
pub struct CertificateDetails {
    pub serial: String,
    pub key: Jwk,
    pub dns_names: Vec<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl CertificateDetails {
    pub fn from_der(der: &[u8]) -> Result<Self, AcmeError> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|err| AcmeError::malformed(format!("Unable to parse certificate: {err}")))?;

        let key = Jwk::from_spki(cert.public_key())?;
        let dns_names = match cert.subject_alternative_name() {
            Ok(Some(san)) => dns_names(&san.value.general_names),
            _ => Vec::new(),
        };
        let validity = cert.validity();

        Ok(Self {
            serial: serial_to_string(cert.raw_serial()),
            key,
            dns_names,
            not_before: timestamp(validity.not_before.timestamp())?,
            not_after: timestamp(validity.not_after.timestamp())?,
        })
    }
}

fn timestamp(seconds: i64) -> Result<DateTime<Utc>, AcmeError> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| AcmeError::malformed("Certificate validity is out of range"))
}

fn dns_names(names: &[GeneralName<'_>]) -> Vec<String> {
    names
        .iter()
        .filter_map(|name| match name {
            GeneralName::DNSName(dns) => Some(dns.to_string()),
            _ => None,
        })
        .collect()
}

/// Body of a new-cert POST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateRequest {
    #[serde(with = "base64url")]
    pub csr: Vec<u8>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorizations: Vec<String>,
}

/// Fields of a parsed CSR.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrDetails {
    pub key: Jwk,
    pub common_name: Option<String>,
    pub dns_names: Vec<String>,
}

impl CertificateRequest {
    pub fn parse(&self) -> Result<CsrDetails, AcmeError> {
        let (_, csr) = X509CertificationRequest::from_der(&self.csr).map_err(|err| {
            AcmeError::malformed(format!("Unable to parse certificate request: {err}"))
        })?;

        let info = &csr.certification_request_info;
        let key = Jwk::from_spki(&info.subject_pki)?;
        let common_name = info
            .subject
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(str::to_string);

        let mut names = Vec::new();
        if let Some(extensions) = csr.requested_extensions() {
            for extension in extensions {
                if let ParsedExtension::SubjectAlternativeName(san) = extension {
                    names.extend(dns_names(&san.general_names));
                }
            }
        }

        Ok(CsrDetails { key, common_name, dns_names: names })
    }
}
