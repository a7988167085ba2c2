//! Application state management

use anyhow::Result;
use fabricpoll_core::{DeviceKind, DirStore, KvStore, MemoryStore};
use fabricpoll_poller::{CrawlReport, DevicePoller, LivenessMap, LivenessTracker, PollError};
use fabricpoll_redfish::RedfishConnector;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::config::{Config, EndpointConfig, StoreBackend};

/// A configured endpoint and its poller
pub struct PollerSlot {
    pub endpoint: EndpointConfig,
    pub poller: Mutex<DevicePoller>,
}

/// Poller summary served by the status API
#[derive(Debug, Clone, Serialize)]
pub struct PollerStatus {
    pub name: String,
    pub kind: String,
    pub url: String,
    pub interval_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_after_secs: Option<u64>,
    pub running: bool,
}

/// Shared application state
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Store holding crawled records and liveness maps
    pub store: Arc<dyn KvStore>,
    /// One liveness tracker per device kind, shared by its pollers
    pub trackers: HashMap<DeviceKind, Arc<LivenessTracker>>,
    pub pollers: Vec<PollerSlot>,
    /// Set once `stop_all` begins; no poller is started afterwards
    shutdown: watch::Sender<bool>,
}

impl AppState {
    /// Create application state with the configured store backend
    pub fn new(config: Config) -> Result<Arc<Self>> {
        let store = open_store(&config)?;
        Ok(Arc::new(Self::with_store(config, store)?))
    }

    /// Create application state over an existing store
    pub fn with_store(config: Config, store: Arc<dyn KvStore>) -> Result<Self> {
        config.validate()?;

        let mut trackers: HashMap<DeviceKind, Arc<LivenessTracker>> = HashMap::new();
        let mut pollers = Vec::with_capacity(config.endpoints.len());
        for endpoint in &config.endpoints {
            let kind = endpoint.poller.device_kind()?;
            let tracker = trackers
                .entry(kind)
                .or_insert_with(|| Arc::new(LivenessTracker::for_kind(kind)))
                .clone();
            let poller = DevicePoller::new(endpoint.poller.clone()).with_liveness(tracker);
            pollers.push(PollerSlot {
                endpoint: endpoint.clone(),
                poller: Mutex::new(poller),
            });
        }

        Ok(Self {
            config,
            store,
            trackers,
            pollers,
            shutdown: watch::Sender::new(false),
        })
    }

    /// Start every poller that is not running. Endpoints that cannot be
    /// reached are logged and left stopped. Returns the number started.
    pub async fn start_all(&self) -> usize {
        let mut started = 0;
        for slot in &self.pollers {
            let mut poller = slot.poller.lock().await;
            if *self.shutdown.borrow() {
                break;
            }
            if poller.is_running() {
                continue;
            }
            let connector = RedfishConnector::new(slot.endpoint.to_redfish_endpoint());
            match poller.start(&connector, Some(self.store.clone())).await {
                Ok(()) => started += 1,
                Err(e) => {
                    warn!(
                        name = %slot.endpoint.poller.name,
                        url = %slot.endpoint.url,
                        error = %e,
                        "Failed to start poller"
                    );
                }
            }
        }
        info!(started = started, total = self.pollers.len(), "Pollers started");
        started
    }

    /// Retry stopped pollers every `retry_interval` until `stop_all`
    pub async fn restart_stopped(self: Arc<Self>, retry_interval: Duration) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => {}
                _ = tokio::time::sleep(retry_interval) => {
                    if self.stopped_count().await > 0 {
                        self.start_all().await;
                    }
                }
            }
        }
        debug!("Poller restart loop finished");
    }

    /// Shortest configured poll interval, used as the restart cadence
    pub fn retry_interval(&self) -> Option<Duration> {
        self.config
            .endpoints
            .iter()
            .map(|endpoint| endpoint.poller.interval_secs)
            .min()
            .map(Duration::from_secs)
    }

    async fn stopped_count(&self) -> usize {
        let mut stopped = 0;
        for slot in &self.pollers {
            if !slot.poller.lock().await.is_running() {
                stopped += 1;
            }
        }
        stopped
    }

    /// Stop every poller and close their sessions
    pub async fn stop_all(&self) {
        self.shutdown.send_replace(true);
        for slot in &self.pollers {
            slot.poller.lock().await.stop().await;
        }
        info!("Pollers stopped");
    }

    /// Run one crawl cycle against every endpoint
    pub async fn poll_once_all(&self) -> Vec<(String, Result<Option<CrawlReport>, PollError>)> {
        let mut results = Vec::with_capacity(self.pollers.len());
        for slot in &self.pollers {
            let connector = RedfishConnector::new(slot.endpoint.to_redfish_endpoint());
            let poller = slot.poller.lock().await;
            let result = poller.poll_once(&connector, Some(self.store.clone())).await;
            results.push((slot.endpoint.poller.name.clone(), result));
        }
        results
    }

    pub async fn poller_statuses(&self) -> Vec<PollerStatus> {
        let mut statuses = Vec::with_capacity(self.pollers.len());
        for slot in &self.pollers {
            let running = slot.poller.lock().await.is_running();
            let config = &slot.endpoint.poller;
            statuses.push(PollerStatus {
                name: config.name.clone(),
                kind: config.kind.clone(),
                url: slot.endpoint.url.clone(),
                interval_secs: config.interval_secs,
                stale_after_secs: config.stale_after_secs,
                running,
            });
        }
        statuses
    }

    /// Liveness map of one device kind
    pub fn liveness(&self, kind: DeviceKind) -> Option<LivenessMap> {
        self.trackers
            .get(&kind)
            .map(|tracker| tracker.load(self.store.as_ref()))
    }

    /// Liveness maps of every polled device kind
    pub fn all_liveness(&self) -> BTreeMap<String, LivenessMap> {
        self.trackers
            .iter()
            .map(|(kind, tracker)| (kind.to_string(), tracker.load(self.store.as_ref())))
            .collect()
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn KvStore>> {
    let store: Arc<dyn KvStore> = match config.store.backend {
        StoreBackend::Memory => {
            info!("Using in-memory store");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Dir => {
            let store = DirStore::open(&config.store.path)?;
            info!(path = %config.store.path, "Using directory store");
            Arc::new(store)
        }
    };
    Ok(store)
}
