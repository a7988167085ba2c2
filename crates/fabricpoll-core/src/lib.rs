//! fabricpoll Core - Core types, storage keys, and key-value stores
//!
//! This crate provides the foundational types for the fabricpoll system:
//! - Device identity and device-type selection
//! - Resource tree nodes as read from a remote endpoint
//! - Canonical storage key construction
//! - The key-value store abstraction and its backends

pub mod device;
pub mod key;
pub mod store;

pub use device::{DeviceId, DeviceKind, ResourceNode, UnknownDeviceKind};
pub use key::{device_key, device_prefix, normalize_key, record_key};
pub use store::{DirStore, KvStore, MemoryStore, StoreError};
