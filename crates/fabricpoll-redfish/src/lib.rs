//! fabricpoll Redfish - resource client for device crawls
//!
//! The crawler only depends on the [`ResourceClient`] capability: read a
//! resource path, get back a status and a JSON body. This crate defines that
//! capability and implements it over HTTP for Redfish services.

pub mod client;
pub mod http;

pub use client::{ClientError, Connector, ResourceClient, Response};
pub use http::{RedfishClient, RedfishConnector, RedfishEndpoint, SERVICE_ROOT};
