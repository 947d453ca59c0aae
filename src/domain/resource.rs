use std::fmt;

/// Value a signed payload must carry in its `resource` field for each
/// POST endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcmeResource {
    NewRegistration,
    Registration,
    NewAuthorization,
    Challenge,
    NewCertificate,
    RevokeCertificate,
}

impl AcmeResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcmeResource::NewRegistration => "new-reg",
            AcmeResource::Registration => "reg",
            AcmeResource::NewAuthorization => "new-authz",
            AcmeResource::Challenge => "challenge",
            AcmeResource::NewCertificate => "new-cert",
            AcmeResource::RevokeCertificate => "revoke-cert",
        }
    }
}

impl fmt::Display for AcmeResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
