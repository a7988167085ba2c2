//! Device identity and device-type types for polled endpoints

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Unique identifier for a device, taken from the service root `UUID`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Kind of endpoint being polled, selected by a configuration string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Ethernet SSD storage enclosure exposing a Redfish service
    Essd,
}

impl DeviceKind {
    /// Storage namespace for records crawled from this kind of device
    pub fn key_prefix(&self) -> &'static str {
        match self {
            DeviceKind::Essd => "/essd/",
        }
    }

    /// Well-known key holding the liveness map for this kind of device
    pub fn liveness_key(&self) -> &'static str {
        match self {
            DeviceKind::Essd => "/essd/uptimes",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Essd => "essd",
        }
    }
}

impl std::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a device-type selector does not name a known kind
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid device type, {0} is not valid")]
pub struct UnknownDeviceKind(pub String);

impl FromStr for DeviceKind {
    type Err = UnknownDeviceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "essd" => Ok(DeviceKind::Essd),
            _ => Err(UnknownDeviceKind(s.to_string())),
        }
    }
}

/// A node of a remote resource tree: its path and its JSON document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceNode {
    pub path: String,
    pub body: serde_json::Value,
}

impl ResourceNode {
    pub fn new(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            path: path.into(),
            body,
        }
    }

    /// Stored form of the body: pretty-printed JSON with sorted keys, so that
    /// an unchanged document always serializes to the same bytes
    pub fn to_stored_value(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(&self.body)
    }
}
