//! Error types for fabricpoll-poller.

use fabricpoll_core::StoreError;
use fabricpoll_redfish::ClientError;
use thiserror::Error;

/// A crawl cycle that could not get past the tree root
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("root {path} unavailable: {reason}")]
    RootUnavailable { path: String, reason: String },
}

/// Errors starting or running a poller.
#[derive(Debug, Error)]
pub enum PollError {
    /// Unknown device type, zero interval, or similar; nothing was started.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("poller is already running")]
    AlreadyRunning,

    /// The remote client could not be constructed.
    #[error("failed to connect: {0}")]
    Connect(#[from] ClientError),

    #[error(transparent)]
    Crawl(#[from] CrawlError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
