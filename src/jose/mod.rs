//! # JOSE
//!
//! Just enough JSON Web Key / JSON Web Signature handling to authenticate
//! ACME requests: key model and thumbprints, envelope parsing in the three
//! JWS serializations, signature verification via `ring`, and the key
//! quality and algorithm policies applied to client keys.

pub mod jwk;
pub mod jws;
pub mod policy;

pub use jwk::{EcCurve, Jwk, KeyParams};
pub use jws::{Jws, JwsHeader, JwsSignature};
pub use policy::{check_algorithm, good_key, SignatureAlgorithm};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

/// Decode unpadded base64url, tolerating trailing padding some clients send.
pub fn decode_b64(value: &str) -> Result<Vec<u8>, base64::DecodeError> {
    URL_SAFE_NO_PAD.decode(value.trim_end_matches('='))
}

pub fn encode_b64(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Serde adapter for byte fields carried as base64url strings.
pub mod base64url {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::encode_b64(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        super::decode_b64(&encoded).map_err(D::Error::custom)
    }
}
