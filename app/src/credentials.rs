//! Local credential storage.
//!
//! Credentials live in a JSON file under the data directory; absence of
//! the file is the logged-out state. An unreadable file is treated as
//! absent and removed so a corrupt write cannot wedge the app.

use std::path::PathBuf;

use beacon_client::Credentials;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("credential storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential storage serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Credential persistence used by the app facade.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Option<Credentials>;
    fn set(&self, credentials: &Credentials) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCredentials {
    token: String,
    device_id: String,
    api_url: String,
    saved_at: i64,
}

/// JSON-file-backed credential store.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Option<Credentials> {
        let body = match std::fs::read_to_string(&self.path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read credentials");
                return None;
            }
        };

        match serde_json::from_str::<StoredCredentials>(&body) {
            Ok(stored) => Some(Credentials {
                token: stored.token,
                device_id: stored.device_id,
                api_url: stored.api_url,
            }),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e,
                    "discarding unreadable credential file");
                let _ = std::fs::remove_file(&self.path);
                None
            }
        }
    }

    fn set(&self, credentials: &Credentials) -> Result<(), StoreError> {
        let stored = StoredCredentials {
            token: credentials.token.clone(),
            device_id: credentials.device_id.clone(),
            api_url: credentials.api_url.clone(),
            saved_at: chrono::Utc::now().timestamp(),
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&stored)?)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
