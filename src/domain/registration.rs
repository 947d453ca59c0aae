use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::jose::Jwk;

/// An account: a public key plus contact details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// Assigned by the registration authority; zero until created.
    #[serde(default)]
    pub id: i64,
    pub key: Jwk,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contact: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub agreement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_ip: Option<IpAddr>,
}

impl Registration {
    pub fn has_agreed(&self) -> bool {
        !self.agreement.is_empty()
    }
}

/// Client-controlled fields of a new-reg or reg payload. Anything else in the
/// payload, including a `key`, is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RegistrationPayload {
    #[serde(default)]
    pub contact: Vec<String>,
    #[serde(default)]
    pub agreement: String,
}

impl RegistrationPayload {
    /// Build the registration forwarded to the authority. The key is always
    /// the one the request was authenticated with.
    pub fn into_registration(self, key: Jwk, initial_ip: Option<IpAddr>) -> Registration {
        Registration { id: 0, key, contact: self.contact, agreement: self.agreement, initial_ip }
    }
}
