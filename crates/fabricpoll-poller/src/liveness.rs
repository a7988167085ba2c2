//! Device liveness tracking and stale-device eviction
//!
//! A single record maps every device identity seen by a crawl to the Unix
//! time it was last seen. Staleness is judged against the most recently seen
//! device rather than the wall clock, so a poller that was itself paused for
//! a long time does not evict everything when it resumes.

use chrono::Utc;
use fabricpoll_core::{device_key, device_prefix, DeviceId, DeviceKind, KvStore, StoreError};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Device identity → last-seen Unix seconds
pub type LivenessMap = BTreeMap<DeviceId, i64>;

/// Owner of the liveness record for one device namespace
///
/// Read-modify-write of the record is serialized between everyone sharing
/// the same tracker. Store calls are synchronous, so the lock is a plain
/// `std::sync::Mutex` and is never held across an await.
#[derive(Debug)]
pub struct LivenessTracker {
    /// Key of the liveness record
    key: String,
    /// Namespace prefix of the tracked devices' records
    prefix: String,
    lock: Mutex<()>,
}

impl LivenessTracker {
    pub fn new(key: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            prefix: prefix.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn for_kind(kind: DeviceKind) -> Self {
        Self::new(kind.liveness_key(), kind.key_prefix())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current liveness map; empty when the record is absent, unreadable or
    /// undecodable
    pub fn load(&self, store: &dyn KvStore) -> LivenessMap {
        let bytes = match store.get(&self.key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return LivenessMap::new(),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read liveness record");
                return LivenessMap::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(map) => map,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Discarding undecodable liveness record");
                LivenessMap::new()
            }
        }
    }

    /// Mark `device` as seen now
    pub fn record_seen(&self, store: &dyn KvStore, device: &DeviceId) -> Result<(), StoreError> {
        self.record_seen_at(store, device, Utc::now().timestamp())
    }

    /// Mark `device` as seen at `timestamp` (Unix seconds)
    ///
    /// The record changes every cycle, so it is always written.
    pub fn record_seen_at(
        &self,
        store: &dyn KvStore,
        device: &DeviceId,
        timestamp: i64,
    ) -> Result<(), StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut map = self.load(store);
        map.insert(device.clone(), timestamp);
        self.save(store, &map)?;
        debug!(device = %device, timestamp = timestamp, "Recorded device as seen");
        Ok(())
    }

    /// Drop every device whose last-seen time trails the most recently seen
    /// device by more than `threshold`, deleting all of its records
    ///
    /// Returns the evicted identities. A lone device is never evicted. A
    /// device whose records cannot all be deleted is kept in the map.
    pub fn evict_stale(
        &self,
        store: &dyn KvStore,
        threshold: Duration,
    ) -> Result<Vec<DeviceId>, StoreError> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let map = self.load(store);
        let Some(max_seen) = map.values().copied().max() else {
            return Ok(Vec::new());
        };

        let threshold = i64::try_from(threshold.as_secs()).unwrap_or(i64::MAX);
        let (mut keep, remove): (LivenessMap, LivenessMap) = map
            .into_iter()
            .partition(|(_, last_seen)| last_seen.saturating_add(threshold) >= max_seen);
        if remove.is_empty() {
            return Ok(Vec::new());
        }

        // Records go before the map entry: a device whose deletion fails stays
        // tracked so the next sweep retries it.
        let mut evicted = Vec::with_capacity(remove.len());
        for (device, last_seen) in remove {
            match self.delete_device_records(store, &device) {
                Ok(deleted) => {
                    info!(
                        device = %device,
                        last_seen = last_seen,
                        latest = max_seen,
                        records = deleted,
                        "Evicted stale device"
                    );
                    evicted.push(device);
                }
                Err(e) => {
                    warn!(device = %device, error = %e, "Failed to delete stale device records");
                    keep.insert(device, last_seen);
                }
            }
        }

        self.save(store, &keep)?;
        Ok(evicted)
    }

    /// Delete the device's top-level key and every record under its prefix
    fn delete_device_records(
        &self,
        store: &dyn KvStore,
        device: &DeviceId,
    ) -> Result<usize, StoreError> {
        let mut deleted = 0;
        let top = device_key(&self.prefix, device);
        if top != self.key {
            store.delete(&top)?;
            deleted += 1;
        }
        for key in store.keys_with_prefix(&device_prefix(&self.prefix, device))? {
            store.delete(&key)?;
            deleted += 1;
        }
        Ok(deleted)
    }

    fn save(&self, store: &dyn KvStore, map: &LivenessMap) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(map)?;
        store.save(&self.key, &json)
    }
}
