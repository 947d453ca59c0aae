use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jose::Jwk;

/// Lifecycle state shared by authorizations and challenges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Unknown,
    #[default]
    Pending,
    Processing,
    Valid,
    Invalid,
    Revoked,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Unknown => "unknown",
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Valid => "valid",
            Status::Invalid => "invalid",
            Status::Revoked => "revoked",
        }
    }
}

/// The thing being authorized, e.g. `{"type": "dns", "value": "example.com"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl Identifier {
    pub fn dns<S: Into<String>>(value: S) -> Self {
        Self { kind: "dns".to_string(), value: value.into() }
    }
}

/// One verification method of an authorization, as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_authorization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_key: Option<Jwk>,
}

/// Client response to a challenge, the body of a challenge POST.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub key_authorization: Option<String>,
}

/// Proof-in-progress that an account controls an identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authorization {
    pub id: String,
    pub identifier: Identifier,
    #[serde(rename = "regId")]
    pub registration_id: i64,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub challenges: Vec<Challenge>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub combinations: Vec<Vec<usize>>,
}

/// Body of a new-authz POST.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthorizationRequest {
    pub identifier: Identifier,
}

impl Authorization {
    /// Index of the challenge with `id`, by linear scan.
    pub fn find_challenge(&self, id: i64) -> Option<usize> {
        self.challenges.iter().position(|challenge| challenge.id == id)
    }

    /// An authorization without an expiry is treated as already expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires {
            Some(expires) => expires < now,
            None => true,
        }
    }

    /// Client-facing form: owner ID and internal ID removed, every challenge
    /// given its URL and stripped of ID and account key.
    pub fn for_display(&self, challenge_base: &str) -> AuthorizationView {
        AuthorizationView {
            identifier: self.identifier.clone(),
            status: self.status,
            expires: self.expires,
            challenges: self
                .challenges
                .iter()
                .map(|challenge| challenge.for_display(challenge_base, &self.id))
                .collect(),
            combinations: self.combinations.clone(),
        }
    }
}

impl Challenge {
    pub fn uri(&self, challenge_base: &str, authorization_id: &str) -> String {
        format!("{}{}/{}", challenge_base, authorization_id, self.id)
    }

    pub fn for_display(&self, challenge_base: &str, authorization_id: &str) -> ChallengeView {
        ChallengeView {
            kind: self.kind.clone(),
            status: self.status,
            error: self.error.clone(),
            validated: self.validated,
            uri: self.uri(challenge_base, authorization_id),
            token: self.token.clone(),
            key_authorization: self.key_authorization.clone(),
        }
    }
}

/// What clients see of an authorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationView {
    pub identifier: Identifier,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
    pub challenges: Vec<ChallengeView>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub combinations: Vec<Vec<usize>>,
}

/// What clients see of a challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeView {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated: Option<DateTime<Utc>>,
    pub uri: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_authorization: Option<String>,
}
