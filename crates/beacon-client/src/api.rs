//! REST client for the notification backend.
//!
//! Injects `Authorization: Bearer` + `Device-Token` headers on every
//! request and maps 401/403 responses to [`ClientError::Unauthorized`]
//! so callers can drop their stored credentials.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;

use crate::{ClientError, Credentials, PreferenceMap, RealtimeBootstrap};

const PREFERENCES_PATH: &str = "/api/notification-preferences";
const BOOTSTRAP_PATH: &str = "/api/websocket-config";

/// Backend operations the synchronization core depends on.
///
/// Production uses [`BackendClient`]; tests substitute fakes.
#[async_trait]
pub trait PreferenceBackend: Send + Sync {
    /// Fetch the authoritative preference map.
    async fn fetch_preferences(
        &self,
        credentials: &Credentials,
    ) -> Result<PreferenceMap, ClientError>;

    /// Update one category and return the server's full map.
    async fn update_preference(
        &self,
        credentials: &Credentials,
        key: &str,
        value: bool,
    ) -> Result<PreferenceMap, ClientError>;

    /// Fetch connection parameters for the realtime channel.
    async fn fetch_realtime_bootstrap(
        &self,
        credentials: &Credentials,
    ) -> Result<RealtimeBootstrap, ClientError>;
}

/// HTTP client for the notification backend.
pub struct BackendClient {
    http: reqwest::Client,
}

impl BackendClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    fn auth_headers(credentials: &Credentials) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", credentials.token);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer)
                .map_err(|e| ClientError::Malformed(format!("invalid token: {e}")))?,
        );
        headers.insert(
            "Device-Token",
            HeaderValue::from_str(&credentials.device_id)
                .map_err(|e| ClientError::Malformed(format!("invalid device id: {e}")))?,
        );
        Ok(headers)
    }

    /// Read the response body, mapping auth and non-success statuses.
    async fn read_body(resp: reqwest::Response) -> Result<String, ClientError> {
        let status = resp.status().as_u16();
        let body = resp.text().await?;

        match status {
            401 | 403 => {
                tracing::warn!(status, "backend rejected credentials");
                Err(ClientError::Unauthorized { status })
            }
            s if (200..300).contains(&s) => Ok(body),
            s => Err(ClientError::Api {
                status: s,
                message: body,
            }),
        }
    }
}

impl Default for BackendClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PreferenceBackend for BackendClient {
    async fn fetch_preferences(
        &self,
        credentials: &Credentials,
    ) -> Result<PreferenceMap, ClientError> {
        if !credentials.is_complete() {
            return Err(ClientError::MissingCredentials);
        }

        let url = format!("{}{PREFERENCES_PATH}", credentials.api_url);
        let resp = self
            .http
            .get(&url)
            .headers(Self::auth_headers(credentials)?)
            .send()
            .await?;
        let body = Self::read_body(resp).await?;
        parse_preferences(&body)
    }

    async fn update_preference(
        &self,
        credentials: &Credentials,
        key: &str,
        value: bool,
    ) -> Result<PreferenceMap, ClientError> {
        if !credentials.is_complete() {
            return Err(ClientError::MissingCredentials);
        }

        let mut update = serde_json::Map::new();
        update.insert(key.to_string(), Value::Bool(value));

        let url = format!("{}{PREFERENCES_PATH}", credentials.api_url);
        let resp = self
            .http
            .post(&url)
            .headers(Self::auth_headers(credentials)?)
            .json(&update)
            .send()
            .await?;
        let body = Self::read_body(resp).await?;
        parse_preferences(&body)
    }

    async fn fetch_realtime_bootstrap(
        &self,
        credentials: &Credentials,
    ) -> Result<RealtimeBootstrap, ClientError> {
        if !credentials.is_complete() {
            return Err(ClientError::MissingCredentials);
        }

        let url = format!("{}{BOOTSTRAP_PATH}", credentials.api_url);
        let resp = self
            .http
            .get(&url)
            .headers(Self::auth_headers(credentials)?)
            .send()
            .await?;
        let body = Self::read_body(resp).await?;
        serde_json::from_str(&body)
            .map_err(|e| ClientError::Malformed(format!("bootstrap config: {e}")))
    }
}

/// Parse a preference map response.
///
/// The backend serves a flat JSON object; values are coerced the way the
/// backend's own clients treat them (non-bool truthiness collapses to a
/// bool, anything else reads as disabled). An unparseable payload is
/// logged and reads as an empty map.
fn parse_preferences(body: &str) -> Result<PreferenceMap, ClientError> {
    let mut map = PreferenceMap::new();

    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "malformed preference map, treating as empty");
            return Ok(map);
        }
    };
    let Some(object) = value.as_object() else {
        tracing::warn!("preference map is not an object, treating as empty");
        return Ok(map);
    };

    for (key, value) in object {
        map.insert(key.clone(), truthy(value));
    }
    Ok(map)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}
