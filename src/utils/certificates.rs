use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use ring::{
    rand::SystemRandom,
    signature::{
        EcdsaKeyPair, KeyPair, RsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING,
        ECDSA_P384_SHA384_ASN1_SIGNING,
    },
};
use rustls::pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer};
use x509_parser::{certificate::X509Certificate, prelude::FromDer};

use crate::errors::TlsError;
use crate::jose::Jwk;

/// Metadata extracted from a certificate for logging and validation.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// Loaded certificate materials used for configuring the HTTPS listener.
#[derive(Debug)]
pub struct CertificateBundle {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub chain_path: Option<PathBuf>,
    pub leaf: CertificateDer<'static>,
    pub intermediates: Vec<CertificateDer<'static>>,
    pub private_key: PrivateKeyDer<'static>,
    pub info: CertificateInfo,
}

/// Load and validate certificate materials from disk.
pub fn load_certificate_bundle(
    cert_path: &Path,
    key_path: &Path,
    chain_path: Option<&Path>,
) -> Result<CertificateBundle, TlsError> {
    let mut leaf_chain = read_pem_certificates(cert_path, "certificate")?;
    if leaf_chain.is_empty() {
        return Err(TlsError::EmptyCertificateChain { path: cert_path.to_path_buf() });
    }

    let leaf = leaf_chain.remove(0);
    let mut intermediates = leaf_chain;

    if let Some(chain_path) = chain_path {
        intermediates.extend(read_pem_certificates(chain_path, "certificate chain")?);
    }

    let key_bytes = read_file(key_path, "private key")?;
    let private_key = PrivateKeyDer::from_pem_slice(&key_bytes).map_err(|err| {
        TlsError::InvalidPrivateKey { path: key_path.to_path_buf(), source: Some(anyhow!(err)) }
    })?;

    let (info, public_key) = parse_certificate(leaf.as_ref(), cert_path)?;
    validate_certificate_dates(&info, cert_path, Utc::now())?;
    enforce_public_key_match(&public_key, &private_key, key_path)?;

    Ok(CertificateBundle {
        cert_path: cert_path.to_path_buf(),
        key_path: key_path.to_path_buf(),
        chain_path: chain_path.map(Path::to_path_buf),
        leaf,
        intermediates,
        private_key,
        info,
    })
}

/// Load the issuer certificate served to clients. Accepts PEM or raw DER and
/// returns the DER of the first certificate.
pub fn load_issuer_certificate(path: &Path) -> Result<(Vec<u8>, CertificateInfo), TlsError> {
    let bytes = read_file(path, "issuer certificate")?;

    let der = if bytes.starts_with(b"-----") {
        read_pem_certificates_from(&bytes, path, "issuer certificate")?
            .into_iter()
            .next()
            .ok_or_else(|| TlsError::EmptyCertificateChain { path: path.to_path_buf() })?
            .to_vec()
    } else {
        bytes
    };

    let (info, _) = parse_certificate(&der, path)?;
    Ok((der, info))
}

fn read_file(path: &Path, kind: &'static str) -> Result<Vec<u8>, TlsError> {
    fs::read(path).map_err(|source| TlsError::Read { kind, path: path.to_path_buf(), source })
}

fn read_pem_certificates(
    path: &Path,
    kind: &'static str,
) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let bytes = read_file(path, kind)?;
    read_pem_certificates_from(&bytes, path, kind)
}

fn read_pem_certificates_from(
    bytes: &[u8],
    path: &Path,
    kind: &'static str,
) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    CertificateDer::pem_slice_iter(bytes)
        .map(|result| {
            result.map_err(|err| TlsError::InvalidPem {
                kind,
                path: path.to_path_buf(),
                source: anyhow!(err),
            })
        })
        .collect()
}

fn parse_certificate(der: &[u8], path: &Path) -> Result<(CertificateInfo, Jwk), TlsError> {
    let invalid = |source: anyhow::Error| TlsError::InvalidCertificate {
        path: path.to_path_buf(),
        source,
    };

    let (_, cert) = X509Certificate::from_der(der).map_err(|err| invalid(anyhow!(err)))?;
    let validity = cert.validity();
    let not_before = DateTime::from_timestamp(validity.not_before.timestamp(), 0)
        .ok_or_else(|| invalid(anyhow!("notBefore out of range")))?;
    let not_after = DateTime::from_timestamp(validity.not_after.timestamp(), 0)
        .ok_or_else(|| invalid(anyhow!("notAfter out of range")))?;
    let public_key =
        Jwk::from_spki(cert.public_key()).map_err(|err| invalid(anyhow!(err.to_string())))?;

    let info = CertificateInfo {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        not_before,
        not_after,
    };
    Ok((info, public_key))
}

fn validate_certificate_dates(
    info: &CertificateInfo,
    path: &Path,
    now: DateTime<Utc>,
) -> Result<(), TlsError> {
    if info.not_before > now {
        return Err(TlsError::CertificateNotYetValid {
            path: path.to_path_buf(),
            not_before: info.not_before,
        });
    }
    if info.not_after <= now {
        return Err(TlsError::CertificateExpired {
            path: path.to_path_buf(),
            not_after: info.not_after,
        });
    }
    Ok(())
}

fn enforce_public_key_match(
    certificate_key: &Jwk,
    private_key: &PrivateKeyDer<'static>,
    key_path: &Path,
) -> Result<(), TlsError> {
    let key_bytes = private_key.secret_der();
    let rng = SystemRandom::new();

    let derived = if let Ok(pair) =
        EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, key_bytes, &rng)
    {
        Jwk::ec_from_point(pair.public_key().as_ref()).ok()
    } else if let Ok(pair) =
        EcdsaKeyPair::from_pkcs8(&ECDSA_P384_SHA384_ASN1_SIGNING, key_bytes, &rng)
    {
        Jwk::ec_from_point(pair.public_key().as_ref()).ok()
    } else if let Ok(pair) =
        RsaKeyPair::from_pkcs8(key_bytes).or_else(|_| RsaKeyPair::from_der(key_bytes))
    {
        let public = ring::rsa::PublicKeyComponents::<Vec<u8>>::from(pair.public());
        Some(Jwk::rsa(&public.n, &public.e))
    } else {
        None
    };

    match derived {
        Some(key) if key.same_key(certificate_key) => Ok(()),
        Some(_) => Err(TlsError::CertificateKeyMismatch),
        None => Err(TlsError::InvalidPrivateKey { path: key_path.to_path_buf(), source: None }),
    }
}
