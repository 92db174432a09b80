//! Backend integration client for the Beacon companion app.
//!
//! Provides the credential/preference data model, the REST client for
//! the notification backend, and the pub/sub seam the realtime session
//! is built on.

pub mod api;
pub mod pubsub;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Credentials for the notification backend.
///
/// The caller is responsible for persisting these (e.g. via the app's
/// credential store). An incomplete set of credentials makes realtime
/// and preference access inert, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    pub device_id: String,
    pub api_url: String,
}

impl Credentials {
    /// Whether every field needed for API and realtime access is present.
    pub fn is_complete(&self) -> bool {
        !self.token.is_empty() && !self.device_id.is_empty() && !self.api_url.is_empty()
    }
}

/// Per-category notification preference map.
///
/// The authoritative copy lives server-side; clients hold a cached copy
/// that is refreshed from the server, never derived locally.
pub type PreferenceMap = BTreeMap<String, bool>;

/// Connection parameters for the realtime channel, fetched from the
/// backend before connecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeBootstrap {
    #[serde(rename = "pusherKey")]
    pub key: String,
    #[serde(rename = "wsHost")]
    pub host: String,
    #[serde(rename = "wsPort")]
    pub port: u16,
    #[serde(rename = "forceTLS")]
    pub force_tls: bool,
}

/// Unified error type for the beacon-client crate.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("missing credentials")]
    MissingCredentials,

    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("credentials rejected by server (status {status})")]
    Unauthorized { status: u16 },

    #[error("backend error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("pub/sub error: {0}")]
    PubSub(#[from] redis::RedisError),
}

impl ClientError {
    /// Whether this error means the stored credentials were rejected and
    /// should be dropped.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Unauthorized { .. })
    }
}
