use serde::Deserialize;

use super::{decode_b64, Jwk};

#[derive(Debug, thiserror::Error)]
pub enum JwsError {
    #[error("body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} is not valid base64url")]
    Encoding(&'static str),
    #[error("{0}")]
    Structure(&'static str),
}

/// Header members the front end reads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JwsHeader {
    #[serde(default)]
    pub alg: Option<String>,
    #[serde(default)]
    pub jwk: Option<Jwk>,
    #[serde(default)]
    pub nonce: Option<String>,
}

/// One signature of an envelope.
#[derive(Debug, Clone)]
pub struct JwsSignature {
    /// Encoded protected header exactly as received, part of the signing input.
    pub protected_b64: String,
    pub protected: JwsHeader,
    pub unprotected: JwsHeader,
    pub signature: Vec<u8>,
}

impl JwsSignature {
    pub fn algorithm(&self) -> Option<&str> {
        self.protected.alg.as_deref().or(self.unprotected.alg.as_deref())
    }

    pub fn jwk(&self) -> Option<&Jwk> {
        self.protected.jwk.as_ref().or(self.unprotected.jwk.as_ref())
    }

    /// Anti-replay nonce. Only the integrity-protected header is consulted.
    pub fn nonce(&self) -> Option<&str> {
        self.protected.nonce.as_deref().filter(|nonce| !nonce.is_empty())
    }
}

/// A parsed envelope, signatures not yet verified.
#[derive(Debug, Clone)]
pub struct Jws {
    pub payload_b64: String,
    pub signatures: Vec<JwsSignature>,
}

#[derive(Deserialize)]
struct RawSignature {
    #[serde(default)]
    protected: Option<String>,
    #[serde(default)]
    header: Option<JwsHeader>,
    signature: String,
}

#[derive(Deserialize)]
struct RawJws {
    payload: Option<String>,
    #[serde(default)]
    protected: Option<String>,
    #[serde(default)]
    header: Option<JwsHeader>,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    signatures: Option<Vec<RawSignature>>,
}

impl Jws {
    /// Parse the general or flattened JSON serialization, or the compact one.
    pub fn parse(body: &[u8]) -> Result<Self, JwsError> {
        let text = std::str::from_utf8(body).map_err(|_| JwsError::Structure("body is not UTF-8"))?;
        let trimmed = text.trim();
        if trimmed.starts_with('{') {
            Self::parse_json(trimmed)
        } else {
            Self::parse_compact(trimmed)
        }
    }

    fn parse_json(text: &str) -> Result<Self, JwsError> {
        let raw: RawJws = serde_json::from_str(text)?;
        let payload_b64 = raw.payload.ok_or(JwsError::Structure("JWS has no payload"))?;

        let signatures = match (raw.signatures, raw.signature) {
            (Some(_), Some(_)) => {
                return Err(JwsError::Structure("JWS mixes flattened and general serialization"))
            }
            (Some(list), None) => list
                .into_iter()
                .map(|sig| signature_from_parts(sig.protected, sig.header, &sig.signature))
                .collect::<Result<Vec<_>, _>>()?,
            (None, Some(signature)) => {
                vec![signature_from_parts(raw.protected, raw.header, &signature)?]
            }
            (None, None) => Vec::new(),
        };

        Ok(Self { payload_b64, signatures })
    }

    fn parse_compact(text: &str) -> Result<Self, JwsError> {
        let parts: Vec<&str> = text.split('.').collect();
        if parts.len() != 3 {
            return Err(JwsError::Structure("compact JWS must have three parts"));
        }
        let signature = signature_from_parts(Some(parts[0].to_string()), None, parts[2])?;
        Ok(Self { payload_b64: parts[1].to_string(), signatures: vec![signature] })
    }

    pub fn payload(&self) -> Result<Vec<u8>, JwsError> {
        decode_b64(&self.payload_b64).map_err(|_| JwsError::Encoding("payload"))
    }

    /// Bytes covered by `signature`: `protected || '.' || payload`.
    pub fn signing_input(&self, signature: &JwsSignature) -> Vec<u8> {
        let mut input =
            Vec::with_capacity(signature.protected_b64.len() + 1 + self.payload_b64.len());
        input.extend_from_slice(signature.protected_b64.as_bytes());
        input.push(b'.');
        input.extend_from_slice(self.payload_b64.as_bytes());
        input
    }
}

fn signature_from_parts(
    protected: Option<String>,
    unprotected: Option<JwsHeader>,
    signature: &str,
) -> Result<JwsSignature, JwsError> {
    let protected_b64 = protected.unwrap_or_default();
    let protected_header = if protected_b64.is_empty() {
        JwsHeader::default()
    } else {
        let bytes =
            decode_b64(&protected_b64).map_err(|_| JwsError::Encoding("protected header"))?;
        serde_json::from_slice(&bytes)?
    };
    let signature = decode_b64(signature).map_err(|_| JwsError::Encoding("signature"))?;

    Ok(JwsSignature {
        protected_b64,
        protected: protected_header,
        unprotected: unprotected.unwrap_or_default(),
        signature,
    })
}
