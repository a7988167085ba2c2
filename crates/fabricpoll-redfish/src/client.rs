//! Resource client abstraction consumed by the crawler

use async_trait::async_trait;
use fabricpoll_core::DeviceId;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Transport error for {path}: {message}")]
    Transport { path: String, message: String },
    #[error("Unexpected status {status} for {path}")]
    Status { path: String, status: u16 },
    #[error("Invalid response body for {path}: {message}")]
    InvalidBody { path: String, message: String },
    #[error("Service root has no UUID, device cannot be identified")]
    MissingUuid,
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Status and parsed body of a single resource read
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    /// JSON document; `Value::Null` when the status is not a success
    pub body: Value,
}

impl Response {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Value::Null,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Read access to one device's resource tree
///
/// The device identity is fixed when the client is constructed and stays
/// the same for the life of the session.
#[async_trait]
pub trait ResourceClient: Send + Sync {
    fn device_id(&self) -> &DeviceId;

    /// Read the resource at `path` (relative to the service base URL)
    ///
    /// A non-success status is reported through [`Response::status`];
    /// `Err` means the request itself could not be completed.
    async fn get(&self, path: &str) -> Result<Response, ClientError>;

    /// End the session. Failures are logged, never returned.
    async fn close(&self) {}
}

/// Builds connected clients for a device poller
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ResourceClient>, ClientError>;
}
