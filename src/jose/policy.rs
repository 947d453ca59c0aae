//! Key quality and signature algorithm policy.

use std::fmt;
use std::sync::LazyLock;

use ring::signature::{self, RsaPublicKeyComponents, UnparsedPublicKey};
use x509_parser::num_bigint::BigUint;

use super::{EcCurve, Jwk, JwsSignature, KeyParams};
use crate::errors::AcmeError;

const MIN_RSA_BITS: usize = 2048;
const MAX_RSA_BITS: usize = 4096;
const MIN_RSA_EXPONENT: u64 = 65537;
const SMALL_PRIME_LIMIT: u32 = 752;

static SMALL_PRIMES: LazyLock<Vec<u32>> = LazyLock::new(|| {
    let limit = SMALL_PRIME_LIMIT as usize;
    let mut composite = vec![false; limit];
    let mut primes = Vec::new();
    for candidate in 2..limit {
        if composite[candidate] {
            continue;
        }
        primes.push(candidate as u32);
        let mut multiple = candidate * candidate;
        while multiple < limit {
            composite[multiple] = true;
            multiple += candidate;
        }
    }
    primes
});

// Field prime and `b` coefficient of the NIST curves (a = -3).
const P256_P: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
];
const P256_B: [u8; 32] = [
    0x5a, 0xc6, 0x35, 0xd8, 0xaa, 0x3a, 0x93, 0xe7, 0xb3, 0xeb, 0xbd, 0x55, 0x76, 0x98, 0x86, 0xbc,
    0x65, 0x1d, 0x06, 0xb0, 0xcc, 0x53, 0xb0, 0xf6, 0x3b, 0xce, 0x3c, 0x3e, 0x27, 0xd2, 0x60, 0x4b,
];
const P384_P: [u8; 48] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xff, 0xff, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff,
];
const P384_B: [u8; 48] = [
    0xb3, 0x31, 0x2f, 0xa7, 0xe2, 0x3e, 0xe7, 0xe4, 0x98, 0x8e, 0x05, 0x6b, 0xe3, 0xf8, 0x2d, 0x19,
    0x18, 0x1d, 0x9c, 0x6e, 0xfe, 0x81, 0x41, 0x12, 0x03, 0x14, 0x08, 0x8f, 0x50, 0x13, 0x87, 0x5a,
    0xc6, 0x56, 0x39, 0x8d, 0x8a, 0x2e, 0xd1, 0x9d, 0x2a, 0x85, 0xc8, 0xed, 0xd3, 0xec, 0x2a, 0xef,
];

/// Signature algorithms accepted on request envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    RS256,
    ES256,
    ES384,
}

impl SignatureAlgorithm {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "RS256" => Some(SignatureAlgorithm::RS256),
            "ES256" => Some(SignatureAlgorithm::ES256),
            "ES384" => Some(SignatureAlgorithm::ES384),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::RS256 => "RS256",
            SignatureAlgorithm::ES256 => "ES256",
            SignatureAlgorithm::ES384 => "ES384",
        }
    }

    /// The only algorithm a key of this shape may sign with.
    pub fn for_key(key: &Jwk) -> Self {
        match key.params {
            KeyParams::Rsa { .. } => SignatureAlgorithm::RS256,
            KeyParams::Ec { curve: EcCurve::P256, .. } => SignatureAlgorithm::ES256,
            KeyParams::Ec { curve: EcCurve::P384, .. } => SignatureAlgorithm::ES384,
        }
    }

    /// Verify `signature` over `message` with `key`.
    pub fn verify(&self, key: &Jwk, message: &[u8], signature: &[u8]) -> Result<(), AcmeError> {
        let result = match (&key.params, self) {
            (KeyParams::Rsa { n, e }, SignatureAlgorithm::RS256) => RsaPublicKeyComponents { n, e }
                .verify(&signature::RSA_PKCS1_2048_8192_SHA256, message, signature),
            (KeyParams::Ec { curve: EcCurve::P256, .. }, SignatureAlgorithm::ES256) => {
                let point = key.ec_point().unwrap_or_default();
                UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_FIXED, point)
                    .verify(message, signature)
            }
            (KeyParams::Ec { curve: EcCurve::P384, .. }, SignatureAlgorithm::ES384) => {
                let point = key.ec_point().unwrap_or_default();
                UnparsedPublicKey::new(&signature::ECDSA_P384_SHA384_FIXED, point)
                    .verify(message, signature)
            }
            _ => {
                return Err(AcmeError::signature(format!(
                    "{} cannot be used with a {} key",
                    self.name(),
                    key.key_type()
                )))
            }
        };
        result.map_err(|_| AcmeError::signature("JWS verification error"))
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Check that the envelope's declared algorithm is compatible with `key`.
pub fn check_algorithm(
    key: &Jwk,
    signature: &JwsSignature,
) -> Result<SignatureAlgorithm, AcmeError> {
    let declared = signature
        .algorithm()
        .ok_or_else(|| AcmeError::signature("No signature algorithm in JWS header"))?;
    let algorithm = SignatureAlgorithm::from_name(declared).ok_or_else(|| {
        AcmeError::signature(format!("Signature type '{declared}' in JWS header is not supported"))
    })?;

    if let Some(pinned) = key.alg.as_deref() {
        if pinned != declared {
            return Err(AcmeError::signature(format!(
                "Algorithm '{pinned}' on JWK does not match '{declared}' in JWS header"
            )));
        }
    }

    let expected = SignatureAlgorithm::for_key(key);
    if expected != algorithm {
        return Err(AcmeError::signature(format!(
            "Signature type '{declared}' does not match key type, expected {expected}"
        )));
    }

    Ok(algorithm)
}

/// Reject weak or unsupported client keys.
pub fn good_key(key: &Jwk) -> Result<(), AcmeError> {
    match &key.params {
        KeyParams::Rsa { n, e } => good_rsa_key(n, e),
        KeyParams::Ec { curve, x, y } => {
            if x.len() != curve.coordinate_len() || y.len() != curve.coordinate_len() {
                return Err(AcmeError::malformed("Key coordinates have the wrong length"));
            }
            if x.iter().all(|b| *b == 0) && y.iter().all(|b| *b == 0) {
                return Err(AcmeError::malformed("Key is the point at infinity"));
            }
            if !on_curve(*curve, x, y) {
                return Err(AcmeError::malformed(format!("Key is not a point on {}", curve.name())));
            }
            Ok(())
        }
    }
}

/// y^2 = x^3 - 3x + b (mod p), with both coordinates reduced.
fn on_curve(curve: EcCurve, x: &[u8], y: &[u8]) -> bool {
    let (p, b) = match curve {
        EcCurve::P256 => (BigUint::from_bytes_be(&P256_P), BigUint::from_bytes_be(&P256_B)),
        EcCurve::P384 => (BigUint::from_bytes_be(&P384_P), BigUint::from_bytes_be(&P384_B)),
    };
    let x = BigUint::from_bytes_be(x);
    let y = BigUint::from_bytes_be(y);
    if x >= p || y >= p {
        return false;
    }
    let lhs = (&y * &y) % &p;
    let three_x = (&x * 3u32) % &p;
    let rhs = ((&x * &x * &x) % &p + &b + &p - three_x) % &p;
    lhs == rhs
}

fn good_rsa_key(modulus: &[u8], exponent: &[u8]) -> Result<(), AcmeError> {
    let bits = bit_length(modulus);
    if bits < MIN_RSA_BITS {
        return Err(AcmeError::malformed(format!("Key too small: {bits} bits")));
    }
    if bits > MAX_RSA_BITS {
        return Err(AcmeError::malformed(format!("Key too large: {bits} bits")));
    }
    if bits % 8 != 0 {
        return Err(AcmeError::malformed("Key length wasn't a multiple of 8"));
    }

    if exponent.len() > 8 {
        return Err(AcmeError::malformed("Key exponent is too large"));
    }
    let e = exponent.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    if e % 2 == 0 {
        return Err(AcmeError::malformed("Key exponent should be odd"));
    }
    if e < MIN_RSA_EXPONENT {
        return Err(AcmeError::malformed(format!(
            "Key exponent should be at least {MIN_RSA_EXPONENT}"
        )));
    }

    if let Some(prime) = SMALL_PRIMES.iter().find(|p| remainder(modulus, **p) == 0) {
        return Err(AcmeError::malformed(format!("Key divisible by small prime {prime}")));
    }
    Ok(())
}

fn bit_length(bytes: &[u8]) -> usize {
    match bytes.iter().position(|b| *b != 0) {
        Some(first) => (bytes.len() - first - 1) * 8 + (8 - bytes[first].leading_zeros() as usize),
        None => 0,
    }
}

fn remainder(bytes: &[u8], divisor: u32) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc * 256 + u32::from(*b)) % divisor)
}
