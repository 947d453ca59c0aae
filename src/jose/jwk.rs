use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x509_parser::oid_registry::{OID_EC_P256, OID_NIST_EC_P384};
use x509_parser::{public_key::PublicKey, x509::SubjectPublicKeyInfo};

use super::{decode_b64, encode_b64};
use crate::errors::AcmeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EcCurve {
    P256,
    P384,
}

impl EcCurve {
    pub fn name(&self) -> &'static str {
        match self {
            EcCurve::P256 => "P-256",
            EcCurve::P384 => "P-384",
        }
    }

    /// Length in bytes of one affine coordinate.
    pub fn coordinate_len(&self) -> usize {
        match self {
            EcCurve::P256 => 32,
            EcCurve::P384 => 48,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "P-256" => Some(EcCurve::P256),
            "P-384" => Some(EcCurve::P384),
            _ => None,
        }
    }
}

/// Public key material. RSA integers are stored minimal big-endian.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyParams {
    Rsa { n: Vec<u8>, e: Vec<u8> },
    Ec { curve: EcCurve, x: Vec<u8>, y: Vec<u8> },
}

/// A JSON Web Key holding a public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawJwk", into = "RawJwk")]
pub struct Jwk {
    pub params: KeyParams,
    /// Optional `alg` member; when present it pins the signature algorithm.
    pub alg: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct RawJwk {
    kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    crv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    y: Option<String>,
}

#[derive(Debug)]
pub struct JwkError(String);

impl fmt::Display for JwkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn member(value: Option<String>, name: &str) -> Result<Vec<u8>, JwkError> {
    let encoded = value.ok_or_else(|| JwkError(format!("JWK is missing '{name}'")))?;
    decode_b64(&encoded)
        .map_err(|err| JwkError(format!("JWK member '{name}' is not base64url: {err}")))
}

fn strip_leading_zeros(bytes: &[u8]) -> Vec<u8> {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    bytes[start..].to_vec()
}

impl TryFrom<RawJwk> for Jwk {
    type Error = JwkError;

    fn try_from(raw: RawJwk) -> Result<Self, Self::Error> {
        let params = match raw.kty.as_str() {
            "RSA" => {
                let n = strip_leading_zeros(&member(raw.n, "n")?);
                let e = strip_leading_zeros(&member(raw.e, "e")?);
                if n.is_empty() || e.is_empty() {
                    return Err(JwkError("RSA JWK has an empty modulus or exponent".to_string()));
                }
                KeyParams::Rsa { n, e }
            }
            "EC" => {
                let crv = raw.crv.ok_or_else(|| JwkError("JWK is missing 'crv'".to_string()))?;
                let curve = EcCurve::from_name(&crv)
                    .ok_or_else(|| JwkError(format!("Unsupported curve '{crv}'")))?;
                let x = member(raw.x, "x")?;
                let y = member(raw.y, "y")?;
                if x.len() != curve.coordinate_len() || y.len() != curve.coordinate_len() {
                    return Err(JwkError(format!(
                        "{} coordinates have the wrong length",
                        curve.name()
                    )));
                }
                KeyParams::Ec { curve, x, y }
            }
            other => return Err(JwkError(format!("Unsupported key type '{other}'"))),
        };
        Ok(Jwk { params, alg: raw.alg })
    }
}

impl From<Jwk> for RawJwk {
    fn from(jwk: Jwk) -> Self {
        match jwk.params {
            KeyParams::Rsa { n, e } => RawJwk {
                kty: "RSA".to_string(),
                alg: jwk.alg,
                crv: None,
                n: Some(encode_b64(&n)),
                e: Some(encode_b64(&e)),
                x: None,
                y: None,
            },
            KeyParams::Ec { curve, x, y } => RawJwk {
                kty: "EC".to_string(),
                alg: jwk.alg,
                crv: Some(curve.name().to_string()),
                n: None,
                e: None,
                x: Some(encode_b64(&x)),
                y: Some(encode_b64(&y)),
            },
        }
    }
}

impl Jwk {
    pub fn rsa(n: &[u8], e: &[u8]) -> Self {
        Self {
            params: KeyParams::Rsa { n: strip_leading_zeros(n), e: strip_leading_zeros(e) },
            alg: None,
        }
    }

    /// Build an EC key from an uncompressed SEC1 point (`04 || x || y`). The
    /// curve is taken from the point length; use [`Jwk::ec_on_curve`] when the
    /// curve is known.
    pub fn ec_from_point(point: &[u8]) -> Result<Self, AcmeError> {
        let curve = match point.len() {
            65 => EcCurve::P256,
            97 => EcCurve::P384,
            _ => return Err(AcmeError::malformed("Unsupported elliptic curve point")),
        };
        Self::ec_on_curve(curve, point)
    }

    pub fn ec_on_curve(curve: EcCurve, point: &[u8]) -> Result<Self, AcmeError> {
        let len = curve.coordinate_len();
        if point.len() != 1 + 2 * len {
            return Err(AcmeError::malformed(format!(
                "Point has the wrong length for {}",
                curve.name()
            )));
        }
        if point[0] != 0x04 {
            return Err(AcmeError::malformed("Compressed elliptic curve points are not supported"));
        }
        Ok(Self {
            params: KeyParams::Ec {
                curve,
                x: point[1..1 + len].to_vec(),
                y: point[1 + len..].to_vec(),
            },
            alg: None,
        })
    }

    /// Public key of a certificate or CSR.
    pub fn from_spki(spki: &SubjectPublicKeyInfo<'_>) -> Result<Self, AcmeError> {
        match spki.parsed() {
            Ok(PublicKey::RSA(rsa)) => Ok(Self::rsa(rsa.modulus, rsa.exponent)),
            Ok(PublicKey::EC(point)) => {
                let oid = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .and_then(|params| params.as_oid().ok())
                    .ok_or_else(|| AcmeError::malformed("EC public key names no curve"))?;
                let curve = if oid == OID_EC_P256 {
                    EcCurve::P256
                } else if oid == OID_NIST_EC_P384 {
                    EcCurve::P384
                } else {
                    return Err(AcmeError::malformed(format!("Unsupported elliptic curve {oid}")));
                };
                Self::ec_on_curve(curve, point.data())
            }
            Ok(_) => Err(AcmeError::malformed("Unsupported public key type")),
            Err(err) => Err(AcmeError::malformed(format!("Unable to parse public key: {err}"))),
        }
    }

    pub fn key_type(&self) -> &'static str {
        match self.params {
            KeyParams::Rsa { .. } => "RSA",
            KeyParams::Ec { .. } => "EC",
        }
    }

    /// SEC1 uncompressed encoding of an EC key.
    pub fn ec_point(&self) -> Option<Vec<u8>> {
        match &self.params {
            KeyParams::Ec { x, y, .. } => {
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                Some(point)
            }
            KeyParams::Rsa { .. } => None,
        }
    }

    /// RFC 7638 thumbprint, base64url of the SHA-256 of the canonical members.
    pub fn thumbprint(&self) -> String {
        let canonical = match &self.params {
            KeyParams::Rsa { n, e } => {
                format!(r#"{{"e":"{}","kty":"RSA","n":"{}"}}"#, encode_b64(e), encode_b64(n))
            }
            KeyParams::Ec { curve, x, y } => format!(
                r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
                curve.name(),
                encode_b64(x),
                encode_b64(y)
            ),
        };
        encode_b64(&Sha256::digest(canonical.as_bytes()))
    }

    /// Same public key, ignoring the `alg` member.
    pub fn same_key(&self, other: &Jwk) -> bool {
        self.params == other.params
    }
}
