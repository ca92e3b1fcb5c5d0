use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::error::StorageError;

/// Bearer credentials shared by the Datastore and Bigtable clients.
///
/// The credentials file is JSON carrying an OAuth2 `access_token`, as
/// minted by `gcloud auth print-access-token` or a token broker sidecar.
#[derive(Clone)]
pub struct Credentials {
    access_token: String,
}

#[derive(Deserialize)]
struct CredentialsFile {
    access_token: Option<String>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, StorageError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            StorageError::Credentials(format!("cannot read {}: {e}", path.display()))
        })?;
        let parsed: CredentialsFile = serde_json::from_str(&raw).map_err(|e| {
            StorageError::Credentials(format!("{} is not valid JSON: {e}", path.display()))
        })?;
        match parsed.access_token {
            Some(token) if !token.trim().is_empty() => Ok(Self::new(token.trim())),
            _ => Err(StorageError::Credentials(format!(
                "{} has no access_token",
                path.display()
            ))),
        }
    }

    pub fn bearer(&self) -> &str {
        &self.access_token
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .finish()
    }
}
