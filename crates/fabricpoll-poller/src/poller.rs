//! Device poller: one endpoint, crawled on a schedule
//!
//! Binds a device-type selector, a connected resource client, a store, the
//! crawler and the liveness tracker to a [`PollScheduler`]. The selector is
//! validated and the client connected before anything is scheduled, so a
//! failed `start` leaves nothing running.

use fabricpoll_core::{DeviceKind, KvStore};
use fabricpoll_redfish::{Connector, ResourceClient};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, warn, Span};

use crate::crawler::{CrawlReport, Crawler};
use crate::error::PollError;
use crate::liveness::LivenessTracker;
use crate::scheduler::PollScheduler;

/// Default poll interval in seconds
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

/// Per-endpoint poller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Name used in logs and the status API
    pub name: String,
    /// Device-type selector, e.g. `essd`
    pub kind: String,
    /// Seconds between crawl cycles
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Evict devices last seen this many seconds before the most recent one;
    /// eviction is off when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_after_secs: Option<u64>,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

impl PollerConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            stale_after_secs: None,
        }
    }

    pub fn device_kind(&self) -> Result<DeviceKind, PollError> {
        self.kind
            .parse()
            .map_err(|e: fabricpoll_core::UnknownDeviceKind| {
                PollError::InvalidConfiguration(e.to_string())
            })
    }

    fn interval(&self) -> Result<Duration, PollError> {
        if self.interval_secs == 0 {
            return Err(PollError::InvalidConfiguration(format!(
                "{}: interval_secs must be positive",
                self.name
            )));
        }
        Ok(Duration::from_secs(self.interval_secs))
    }
}

/// Everything one crawl cycle needs
struct Cycle {
    crawler: Crawler,
    client: Arc<dyn ResourceClient>,
    store: Option<Arc<dyn KvStore>>,
    liveness: Arc<LivenessTracker>,
    stale_after: Option<Duration>,
}

impl Cycle {
    /// Crawl, then reclaim stale devices. Never fails: a cycle that cannot
    /// complete is logged and retried on the next tick.
    async fn run(&self) -> Option<CrawlReport> {
        let store = self.store.as_deref();
        let report = match self.crawler.crawl(self.client.as_ref(), store).await {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Crawl cycle failed");
                return None;
            }
        };

        if let (Some(threshold), Some(store)) = (self.stale_after, store) {
            match self.liveness.evict_stale(store, threshold) {
                Ok(evicted) if !evicted.is_empty() => {
                    info!(count = evicted.len(), "Reclaimed stale devices");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Stale device eviction failed"),
            }
        }
        Some(report)
    }
}

/// Poller for one endpoint
pub struct DevicePoller {
    config: PollerConfig,
    span: Span,
    scheduler: PollScheduler,
    liveness: Option<Arc<LivenessTracker>>,
    client: Option<Arc<dyn ResourceClient>>,
}

impl DevicePoller {
    pub fn new(config: PollerConfig) -> Self {
        let span = info_span!("poller", name = %config.name, kind = %config.kind);
        Self {
            scheduler: PollScheduler::new(span.clone()),
            span,
            config,
            liveness: None,
            client: None,
        }
    }

    /// Share a liveness tracker with other pollers of the same kind
    pub fn with_liveness(mut self, tracker: Arc<LivenessTracker>) -> Self {
        self.liveness = Some(tracker);
        self
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Validate the configuration, connect, and start crawling every interval
    pub async fn start(
        &mut self,
        connector: &dyn Connector,
        store: Option<Arc<dyn KvStore>>,
    ) -> Result<(), PollError> {
        if self.scheduler.is_running() {
            return Err(PollError::AlreadyRunning);
        }
        let cycle = Arc::new(self.prepare(connector, store).await?);
        let interval = self.config.interval()?;

        self.scheduler.start(interval, {
            let cycle = cycle.clone();
            move || {
                let cycle = cycle.clone();
                async move {
                    cycle.run().await;
                }
            }
        })?;

        self.client = Some(cycle.client.clone());
        info!(parent: &self.span, device = %cycle.client.device_id(), "Poller started");
        Ok(())
    }

    /// Connect and run a single crawl cycle, then close the session
    pub async fn poll_once(
        &self,
        connector: &dyn Connector,
        store: Option<Arc<dyn KvStore>>,
    ) -> Result<Option<CrawlReport>, PollError> {
        let cycle = self.prepare(connector, store).await?;
        let report = cycle.run().await;
        cycle.client.close().await;
        Ok(report)
    }

    /// Stop crawling and close the client session; no-op when stopped
    pub async fn stop(&mut self) {
        self.scheduler.stop().await;
        if let Some(client) = self.client.take() {
            client.close().await;
            info!(parent: &self.span, "Poller stopped");
        }
    }

    async fn prepare(
        &self,
        connector: &dyn Connector,
        store: Option<Arc<dyn KvStore>>,
    ) -> Result<Cycle, PollError> {
        let kind = self.config.device_kind()?;
        self.config.interval()?;

        let liveness = self
            .liveness
            .clone()
            .unwrap_or_else(|| Arc::new(LivenessTracker::for_kind(kind)));
        let client = connector.connect().await?;

        Ok(Cycle {
            crawler: Crawler::for_kind(kind).with_liveness(liveness.clone()),
            client,
            store,
            liveness,
            stale_after: self.config.stale_after_secs.map(Duration::from_secs),
        })
    }
}

impl Drop for DevicePoller {
    fn drop(&mut self) {
        // The scheduler's own drop signals its task; the session is closed
        // on a detached task when a runtime is still around.
        if let Some(client) = self.client.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move { client.close().await });
            }
        }
    }
}
