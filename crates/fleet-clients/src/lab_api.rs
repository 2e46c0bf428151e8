//! [crates/fleet-clients/src/lab_api.rs]
//! Real HTTPS client for the lab service API: a `reqwest::Client` built once
//! with a fixed timeout and user agent, one `#[instrument]`-annotated method
//! per endpoint, status-code checked before deserializing. The bearer token
//! is obtained from the lab service's own JWT auth endpoint rather than
//! handed in at construction, and cached per worker endpoint, since each
//! worker appliance is reached at its own address but authenticates with one
//! shared operator credential.

use async_trait::async_trait;
use fleet_core::clients::{
    ClientError, LabApiClient, LabDetails, LabSummary, LicenseInfo, SystemHealth, SystemInformation, SystemStats,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::instrument;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct LabApiConfig {
    pub username: String,
    pub password: String,
    /// Lab appliances are commonly reached over a self-signed certificate.
    pub verify_tls: bool,
}

/// Reqwest-backed `LabApiClient`. One instance is shared across all workers;
/// each worker is identified by its own `https_endpoint`, so the token cache
/// is keyed by endpoint rather than held as a single field.
pub struct ReqwestLabApiClient {
    http: Client,
    config: LabApiConfig,
    tokens: Mutex<HashMap<String, String>>,
}

impl ReqwestLabApiClient {
    pub fn new(config: LabApiConfig) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("fleet-worker-client/1.0")
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .expect("lab API client configuration is always valid");
        Self {
            http,
            config,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    fn cached_token(&self, endpoint: &str) -> Option<String> {
        self.tokens.lock().unwrap().get(endpoint).cloned()
    }

    fn store_token(&self, endpoint: &str, token: String) {
        self.tokens.lock().unwrap().insert(endpoint.to_string(), token);
    }

    fn clear_token(&self, endpoint: &str) {
        self.tokens.lock().unwrap().remove(endpoint);
    }

    #[instrument(skip(self))]
    async fn authenticate(&self, endpoint: &str) -> Result<String, ClientError> {
        let url = format!("{}/api/v0/authenticate", endpoint.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "username": self.config.username,
                "password": self.config.password,
            }))
            .send()
            .await
            .map_err(|e| ClientError::Transient(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let token = response.text().await.map_err(|e| ClientError::Transient(e.to_string()))?;
                let token = token.trim().trim_matches('"').to_string();
                self.store_token(endpoint, token.clone());
                Ok(token)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ClientError::Auth(format!("credentials rejected by {endpoint}")))
            }
            status => Err(ClientError::Operation(format!("auth endpoint returned {status}"))),
        }
    }

    async fn token_for(&self, endpoint: &str) -> Result<String, ClientError> {
        match self.cached_token(endpoint) {
            Some(token) => Ok(token),
            None => self.authenticate(endpoint).await,
        }
    }

    /// Sends one request with the cached bearer token, re-authenticating and
    /// retrying exactly once if the lab service reports the token expired.
    async fn send_authed(
        &self,
        endpoint: &str,
        build: impl Fn(&Client, &str) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        let token = self.token_for(endpoint).await?;
        let response = build(&self.http, &token)
            .send()
            .await
            .map_err(|e| ClientError::Transient(e.to_string()))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            self.clear_token(endpoint);
            let token = self.authenticate(endpoint).await?;
            return build(&self.http, &token)
                .send()
                .await
                .map_err(|e| ClientError::Transient(e.to_string()));
        }
        Ok(response)
    }

    fn base(endpoint: &str) -> String {
        endpoint.trim_end_matches('/').to_string()
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                response.json::<T>().await.map_err(|e| ClientError::Operation(e.to_string()))
            }
            StatusCode::NOT_FOUND => Err(ClientError::NotFound("lab service returned 404".into())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::Auth("not authorized".into())),
            status => Err(ClientError::Operation(format!("lab service returned {status}"))),
        }
    }

    async fn expect_success(response: reqwest::Response) -> Result<(), ClientError> {
        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT | StatusCode::ACCEPTED => Ok(()),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound("lab service returned 404".into())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ClientError::Auth("not authorized".into())),
            status => Err(ClientError::Operation(format!("lab service returned {status}"))),
        }
    }
}

#[derive(Deserialize)]
struct RawSystemInformation {
    version: String,
    ready: bool,
    #[serde(default)]
    oui: Option<String>,
    #[serde(default)]
    allow_ssh_pubkey_auth: bool,
}

#[derive(Deserialize)]
struct RawSystemHealth {
    valid: bool,
    is_licensed: bool,
    is_enterprise: bool,
    #[serde(default)]
    computes: Value,
    #[serde(default)]
    controller: Value,
}

#[derive(Deserialize)]
struct RawLabSummary {
    id: String,
}

#[derive(Deserialize)]
struct RawLabDetails {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    owner_username: Option<String>,
    #[serde(default)]
    owner_full_name: Option<String>,
    #[serde(default)]
    node_count: u32,
    #[serde(default)]
    link_count: u32,
    #[serde(default)]
    groups: Vec<String>,
    #[serde(default)]
    created: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    modified: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Deserialize)]
struct ImportResponse {
    id: String,
}

#[async_trait]
impl LabApiClient for ReqwestLabApiClient {
    #[instrument(skip(self))]
    async fn system_information(&self, endpoint: &str) -> Result<SystemInformation, ClientError> {
        let url = format!("{}/api/v0/system_information", Self::base(endpoint));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Transient(e.to_string()))?;
        let raw: RawSystemInformation = Self::decode(response).await?;
        Ok(SystemInformation {
            version: raw.version,
            ready: raw.ready,
            oui: raw.oui,
            allow_ssh_pubkey_auth: raw.allow_ssh_pubkey_auth,
        })
    }

    #[instrument(skip(self))]
    async fn system_health(&self, endpoint: &str) -> Result<SystemHealth, ClientError> {
        let url = format!("{}/api/v0/system_health", Self::base(endpoint));
        let response = self
            .send_authed(endpoint, |client, token| client.get(&url).bearer_auth(token))
            .await?;
        let raw: RawSystemHealth = Self::decode(response).await?;
        Ok(SystemHealth {
            valid: raw.valid,
            is_licensed: raw.is_licensed,
            is_enterprise: raw.is_enterprise,
            computes: raw.computes,
            controller: raw.controller,
        })
    }

    #[instrument(skip(self))]
    async fn system_stats(&self, endpoint: &str) -> Result<SystemStats, ClientError> {
        let url = format!("{}/api/v0/system_stats", Self::base(endpoint));
        let response = self
            .send_authed(endpoint, |client, token| client.get(&url).bearer_auth(token))
            .await?;
        let raw: Value = Self::decode(response).await?;
        Ok(SystemStats { raw })
    }

    #[instrument(skip(self))]
    async fn licensing(&self, endpoint: &str) -> Result<LicenseInfo, ClientError> {
        let url = format!("{}/api/v0/licensing", Self::base(endpoint));
        let response = self
            .send_authed(endpoint, |client, token| client.get(&url).bearer_auth(token))
            .await?;
        let raw: Value = Self::decode(response).await?;
        Ok(LicenseInfo { raw })
    }

    #[instrument(skip(self))]
    async fn list_labs(&self, endpoint: &str) -> Result<Vec<LabSummary>, ClientError> {
        let url = format!("{}/api/v0/labs?show_all=true", Self::base(endpoint));
        let response = self
            .send_authed(endpoint, |client, token| client.get(&url).bearer_auth(token))
            .await?;
        // The lab service returns a bare array of id strings under show_all,
        // not objects; normalize both shapes defensively.
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ClientError::Operation(format!("list labs returned {status}")));
        }
        let raw: Value = response.json().await.map_err(|e| ClientError::Operation(e.to_string()))?;
        let ids: Vec<String> = match raw {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(id) => id,
                    other => serde_json::from_value::<RawLabSummary>(other).map(|s| s.id).unwrap_or_default(),
                })
                .filter(|id| !id.is_empty())
                .collect(),
            _ => Vec::new(),
        };
        Ok(ids.into_iter().map(|id| LabSummary { id }).collect())
    }

    #[instrument(skip(self))]
    async fn get_lab(&self, endpoint: &str, lab_id: &str) -> Result<LabDetails, ClientError> {
        let url = format!("{}/api/v0/labs/{}", Self::base(endpoint), lab_id);
        let response = self
            .send_authed(endpoint, |client, token| client.get(&url).bearer_auth(token))
            .await?;
        let raw: RawLabDetails = Self::decode(response).await?;
        Ok(LabDetails {
            id: raw.id,
            title: raw.title,
            description: raw.description,
            notes: raw.notes,
            state: raw.state,
            owner_username: raw.owner_username,
            owner_full_name: raw.owner_full_name,
            node_count: raw.node_count,
            link_count: raw.link_count,
            groups: raw.groups,
            created_at: raw.created,
            modified_at: raw.modified,
        })
    }

    #[instrument(skip(self))]
    async fn start_lab(&self, endpoint: &str, lab_id: &str) -> Result<(), ClientError> {
        let url = format!("{}/api/v0/labs/{}/start", Self::base(endpoint), lab_id);
        let response = self
            .send_authed(endpoint, |client, token| client.put(&url).bearer_auth(token))
            .await?;
        Self::expect_success(response).await
    }

    #[instrument(skip(self))]
    async fn stop_lab(&self, endpoint: &str, lab_id: &str) -> Result<(), ClientError> {
        let url = format!("{}/api/v0/labs/{}/stop", Self::base(endpoint), lab_id);
        let response = self
            .send_authed(endpoint, |client, token| client.put(&url).bearer_auth(token))
            .await?;
        Self::expect_success(response).await
    }

    #[instrument(skip(self))]
    async fn wipe_lab(&self, endpoint: &str, lab_id: &str) -> Result<(), ClientError> {
        let url = format!("{}/api/v0/labs/{}/wipe", Self::base(endpoint), lab_id);
        let response = self
            .send_authed(endpoint, |client, token| client.put(&url).bearer_auth(token))
            .await?;
        Self::expect_success(response).await
    }

    #[instrument(skip(self))]
    async fn delete_lab(&self, endpoint: &str, lab_id: &str) -> Result<(), ClientError> {
        let url = format!("{}/api/v0/labs/{}", Self::base(endpoint), lab_id);
        let response = self
            .send_authed(endpoint, |client, token| client.delete(&url).bearer_auth(token))
            .await?;
        Self::expect_success(response).await
    }

    #[instrument(skip(self))]
    async fn download_lab(&self, endpoint: &str, lab_id: &str) -> Result<String, ClientError> {
        let url = format!("{}/api/v0/labs/{}/download", Self::base(endpoint), lab_id);
        let response = self
            .send_authed(endpoint, |client, token| client.get(&url).bearer_auth(token))
            .await?;
        match response.status() {
            StatusCode::OK => response.text().await.map_err(|e| ClientError::Operation(e.to_string())),
            StatusCode::NOT_FOUND => Err(ClientError::NotFound(format!("lab {lab_id} not found"))),
            status => Err(ClientError::Operation(format!("download lab returned {status}"))),
        }
    }

    #[instrument(skip(self, topology_yaml))]
    async fn import_lab(&self, endpoint: &str, title: &str, topology_yaml: &str) -> Result<String, ClientError> {
        let url = format!("{}/api/v0/import?title={}", Self::base(endpoint), urlencoding_title(title));
        let topology_yaml = topology_yaml.to_string();
        let response = self
            .send_authed(endpoint, |client, token| {
                client
                    .post(&url)
                    .bearer_auth(token)
                    .header("Content-Type", "text/plain")
                    .body(topology_yaml.clone())
            })
            .await?;
        let raw: ImportResponse = Self::decode(response).await?;
        Ok(raw.id)
    }

    #[instrument(skip(self))]
    async fn telemetry_events(&self, endpoint: &str) -> Result<Vec<Value>, ClientError> {
        let url = format!("{}/api/v0/telemetry/events", Self::base(endpoint));
        let response = self
            .send_authed(endpoint, |client, token| client.get(&url).bearer_auth(token))
            .await?;
        Self::decode(response).await
    }
}

/// Minimal percent-encoding for the lab title query parameter; avoids a
/// dependency on a URL-encoding crate for a single call site.
fn urlencoding_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for byte in title.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
