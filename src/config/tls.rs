use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{errors::TlsError, Result};

/// TLS configuration for the public listener.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerTlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub chain_path: Option<PathBuf>,
}

impl ListenerTlsConfig {
    /// Both the leaf certificate and the private key must be named.
    pub fn validate(&self) -> Result<()> {
        if self.cert_path.as_os_str().is_empty() {
            return Err(TlsError::MissingCertificatePath.into());
        }
        if self.key_path.as_os_str().is_empty() {
            return Err(TlsError::MissingPrivateKeyPath.into());
        }
        Ok(())
    }

    /// Drop an empty chain path so a blank env override means "no chain".
    pub fn chain_path(&self) -> Option<&Path> {
        self.chain_path.as_deref().filter(|path| !path.as_os_str().is_empty())
    }
}
