//! Redfish client over HTTP(S)

use async_trait::async_trait;
use fabricpoll_core::DeviceId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::client::{ClientError, Connector, ResourceClient, Response};

/// Path of the Redfish service root
pub const SERVICE_ROOT: &str = "/redfish/v1";

/// Path of the Redfish session collection
pub const SESSIONS_PATH: &str = "/redfish/v1/SessionService/Sessions";

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 1;

/// Connection parameters for one Redfish endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedfishEndpoint {
    /// Base URL, e.g. `http://10.1.0.20:5000`
    pub base_url: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Session credentials; reads are unauthenticated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl RedfishEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            username: None,
            password: None,
        }
    }

    /// Absolute URL for a resource path
    pub fn url_for(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }
}

/// An authenticated Redfish session
#[derive(Debug, Clone)]
struct Session {
    token: String,
    /// Session resource to delete on logout
    location: String,
}

/// Redfish client bound to one device
pub struct RedfishClient {
    http: reqwest::Client,
    endpoint: RedfishEndpoint,
    session: Option<Session>,
    device_id: DeviceId,
}

impl RedfishClient {
    /// Connect to an endpoint: open a session if credentials are configured,
    /// then read the service root and take its `UUID` as the device identity
    pub async fn connect(endpoint: RedfishEndpoint) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs.max(1)))
            .build()
            .map_err(|e| ClientError::InvalidEndpoint(e.to_string()))?;

        let session = match (&endpoint.username, &endpoint.password) {
            (Some(user), Some(pass)) => Some(login(&http, &endpoint, user, pass).await?),
            _ => None,
        };

        let mut client = Self {
            http,
            endpoint,
            session,
            device_id: DeviceId::new(""),
        };

        match client.identify().await {
            Ok(device_id) => client.device_id = device_id,
            Err(e) => {
                // Do not leave the session open on the BMC
                client.close().await;
                return Err(e);
            }
        }

        info!(
            url = %client.endpoint.base_url,
            device = %client.device_id,
            "Connected to Redfish service"
        );
        Ok(client)
    }

    /// Read the service root and return the device identity it reports
    async fn identify(&self) -> Result<DeviceId, ClientError> {
        let root = self.get(SERVICE_ROOT).await?;
        if !root.is_success() {
            return Err(ClientError::Status {
                path: SERVICE_ROOT.to_string(),
                status: root.status,
            });
        }
        service_root_uuid(&root.body).ok_or(ClientError::MissingUuid)
    }

    pub fn endpoint(&self) -> &RedfishEndpoint {
        &self.endpoint
    }
}

/// Device identity reported by a Redfish service root
pub fn service_root_uuid(root: &Value) -> Option<DeviceId> {
    root.get("UUID")
        .and_then(Value::as_str)
        .filter(|uuid| !uuid.is_empty())
        .map(DeviceId::new)
}

async fn login(
    http: &reqwest::Client,
    endpoint: &RedfishEndpoint,
    username: &str,
    password: &str,
) -> Result<Session, ClientError> {
    let url = endpoint.url_for(SESSIONS_PATH);
    let transport = |e: reqwest::Error| ClientError::Transport {
        path: SESSIONS_PATH.to_string(),
        message: e.to_string(),
    };

    let resp = http
        .post(&url)
        .json(&json!({ "UserName": username, "Password": password }))
        .send()
        .await
        .map_err(transport)?;

    if !resp.status().is_success() {
        return Err(ClientError::Status {
            path: SESSIONS_PATH.to_string(),
            status: resp.status().as_u16(),
        });
    }

    let header = |name: &str| {
        resp.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let token = header("X-Auth-Token").ok_or_else(|| ClientError::InvalidBody {
        path: SESSIONS_PATH.to_string(),
        message: "missing X-Auth-Token header".to_string(),
    })?;
    let location = header("Location").unwrap_or_else(|| SESSIONS_PATH.to_string());

    debug!(url = %url, location = %location, "Opened Redfish session");
    Ok(Session { token, location })
}

#[async_trait]
impl ResourceClient for RedfishClient {
    fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    async fn get(&self, path: &str) -> Result<Response, ClientError> {
        let url = self.endpoint.url_for(path);
        let mut request = self.http.get(&url);
        if let Some(session) = &self.session {
            request = request.header("X-Auth-Token", &session.token);
        }

        let resp = request.send().await.map_err(|e| ClientError::Transport {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        let status = resp.status().as_u16();
        trace!(url = %url, status = status, "Redfish GET");
        if !resp.status().is_success() {
            return Ok(Response::status(status));
        }

        let body = resp
            .json::<Value>()
            .await
            .map_err(|e| ClientError::InvalidBody {
                path: path.to_string(),
                message: e.to_string(),
            })?;
        Ok(Response { status, body })
    }

    async fn close(&self) {
        let Some(session) = &self.session else {
            return;
        };

        // Location may be absolute or relative to the service
        let url = if session.location.starts_with("http") {
            session.location.clone()
        } else {
            self.endpoint.url_for(&session.location)
        };

        match self
            .http
            .delete(&url)
            .header("X-Auth-Token", &session.token)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                debug!(device = %self.device_id, "Closed Redfish session");
            }
            Ok(resp) => {
                warn!(device = %self.device_id, status = resp.status().as_u16(), "Redfish logout rejected");
            }
            Err(e) => {
                warn!(device = %self.device_id, error = %e, "Redfish logout failed");
            }
        }
    }
}

/// Connector producing [`RedfishClient`]s for a fixed endpoint
#[derive(Debug, Clone)]
pub struct RedfishConnector {
    pub endpoint: RedfishEndpoint,
}

impl RedfishConnector {
    pub fn new(endpoint: RedfishEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl Connector for RedfishConnector {
    async fn connect(&self) -> Result<Arc<dyn ResourceClient>, ClientError> {
        let client = RedfishClient::connect(self.endpoint.clone()).await?;
        Ok(Arc::new(client))
    }
}
