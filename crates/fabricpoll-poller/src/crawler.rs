//! Resource tree crawler
//!
//! Walks a [`TraversalPlan`] over one device, persisting every node it reads.
//! Reads are strictly sequential and depth-first: the root is read and
//! persisted before anything else, and a collection's members are visited in
//! the order the endpoint lists them. A failed read drops that node's subtree
//! and the walk carries on with its siblings; only a failed root read ends
//! the cycle.

use fabricpoll_core::{record_key, DeviceKind, KvStore, ResourceNode};
use fabricpoll_redfish::ResourceClient;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::error::CrawlError;
use crate::liveness::LivenessTracker;
use crate::persist::{persist, PersistOutcome};
use crate::plan::{Step, TraversalPlan};

/// Counters for one crawl cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    /// Nodes read successfully
    pub visited: usize,
    /// Nodes whose stored value changed
    pub written: usize,
    /// Nodes whose stored value was already current
    pub unchanged: usize,
    /// Reads that failed (their subtrees were skipped)
    pub failed_reads: usize,
    /// Store writes that failed
    pub failed_writes: usize,
    /// Whether the device was recorded in the liveness map
    pub seen_recorded: bool,
}

/// Crawler for one device namespace
#[derive(Debug, Clone)]
pub struct Crawler {
    plan: TraversalPlan,
    /// Namespace prefix of stored records, e.g. `/essd/`
    prefix: String,
    liveness: Option<Arc<LivenessTracker>>,
}

impl Crawler {
    pub fn new(plan: TraversalPlan, prefix: impl Into<String>) -> Self {
        Self {
            plan,
            prefix: prefix.into(),
            liveness: None,
        }
    }

    /// Crawler with the plan and namespace of a device kind
    pub fn for_kind(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::Essd => Self::new(TraversalPlan::redfish_storage(), kind.key_prefix()),
        }
    }

    /// Record each successfully crawled device with `tracker`
    pub fn with_liveness(mut self, tracker: Arc<LivenessTracker>) -> Self {
        self.liveness = Some(tracker);
        self
    }

    pub fn plan(&self) -> &TraversalPlan {
        &self.plan
    }

    /// Run one crawl cycle against `client`, persisting into `store`
    pub async fn crawl(
        &self,
        client: &dyn ResourceClient,
        store: Option<&dyn KvStore>,
    ) -> Result<CrawlReport, CrawlError> {
        let device = client.device_id();
        let mut report = CrawlReport::default();

        let root = match read(client, &self.plan.root).await {
            Ok(body) => body,
            Err(reason) => {
                warn!(
                    device = %device,
                    path = %self.plan.root,
                    reason = %reason,
                    "Root read failed, skipping cycle"
                );
                return Err(CrawlError::RootUnavailable {
                    path: self.plan.root.clone(),
                    reason,
                });
            }
        };

        let mut pending: Vec<(String, &[Step])> = Vec::new();
        let root = ResourceNode::new(&self.plan.root, root);
        self.store_node(store, client, root, &self.plan.steps, &mut pending, &mut report);

        while let Some((path, steps)) = pending.pop() {
            match read(client, &path).await {
                Ok(body) => {
                    let node = ResourceNode::new(path, body);
                    self.store_node(store, client, node, steps, &mut pending, &mut report);
                }
                Err(reason) => {
                    debug!(device = %device, path = %path, reason = %reason, "Skipping subtree");
                    report.failed_reads += 1;
                }
            }
        }

        if let (Some(tracker), Some(store)) = (&self.liveness, store) {
            match tracker.record_seen(store, device) {
                Ok(()) => report.seen_recorded = true,
                Err(e) => warn!(device = %device, error = %e, "Failed to record device liveness"),
            }
        }

        info!(
            device = %device,
            visited = report.visited,
            written = report.written,
            unchanged = report.unchanged,
            failed_reads = report.failed_reads,
            failed_writes = report.failed_writes,
            "Crawl complete"
        );
        Ok(report)
    }

    /// Persist a node that was just read and queue the children its steps
    /// reference, so they pop in plan order, depth-first
    fn store_node<'p>(
        &self,
        store: Option<&dyn KvStore>,
        client: &dyn ResourceClient,
        node: ResourceNode,
        steps: &'p [Step],
        pending: &mut Vec<(String, &'p [Step])>,
        report: &mut CrawlReport,
    ) {
        report.visited += 1;
        let key = record_key(&self.prefix, client.device_id(), &node.path);
        let outcome = node
            .to_stored_value()
            .map_err(Into::into)
            .and_then(|value| persist(store, &key, &value));
        match outcome {
            Ok(PersistOutcome::Written) => report.written += 1,
            Ok(PersistOutcome::Unchanged) => report.unchanged += 1,
            Ok(PersistOutcome::Skipped) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to persist node");
                report.failed_writes += 1;
            }
        }

        let mut children = Vec::new();
        for step in steps {
            if !step.expand {
                trace!(path = %node.path, link = step.link.label(), "Collection not crawled");
                continue;
            }
            for target in step.link.targets(&node.body) {
                children.push((target, step.children.as_slice()));
            }
        }
        pending.extend(children.into_iter().rev());
    }
}

/// Read one node; any transport failure or non-success status is an error
async fn read(client: &dyn ResourceClient, path: &str) -> Result<Value, String> {
    match client.get(path).await {
        Ok(resp) if resp.is_success() => Ok(resp.body),
        Ok(resp) => Err(format!("status {}", resp.status)),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{essd_tree, CountingStore, MockClient};
    use fabricpoll_core::MemoryStore;
    use serde_json::json;

    const ESSD_NODES: usize = 7;

    #[tokio::test]
    async fn test_full_tree_is_persisted_root_first() {
        let client = essd_tree("dev-1");
        let store = MemoryStore::new();
        let crawler = Crawler::for_kind(DeviceKind::Essd);

        let report = crawler.crawl(&client, Some(&store)).await.unwrap();

        assert_eq!(report.visited, ESSD_NODES);
        assert_eq!(report.written, ESSD_NODES);
        assert_eq!(report.failed_reads, 0);
        assert_eq!(store.keys_with_prefix("/essd/dev-1/").unwrap().len(), ESSD_NODES);
        assert_eq!(
            client.reads(),
            vec![
                "/redfish/v1",
                "/redfish/v1/Systems",
                "/redfish/v1/Systems/1",
                "/redfish/v1/Systems/1/Storage",
                "/redfish/v1/Systems/1/Storage/1",
                "/redfish/v1/Systems/1/Storage/1/Drives/0",
                "/redfish/v1/Systems/1/Storage/1/Drives/1",
            ]
        );

        let stored = store.get("/essd/dev-1/redfish/v1/Systems/1").unwrap().unwrap();
        let body: Value = serde_json::from_slice(&stored).unwrap();
        assert_eq!(body["Id"], "1");
    }

    #[tokio::test]
    async fn test_unchanged_tree_is_not_rewritten() {
        let client = essd_tree("dev-1");
        let store = CountingStore::new(MemoryStore::new());
        let crawler = Crawler::for_kind(DeviceKind::Essd);

        crawler.crawl(&client, Some(&store)).await.unwrap();
        let second = crawler.crawl(&client, Some(&store)).await.unwrap();

        assert_eq!(second.written, 0);
        assert_eq!(second.unchanged, ESSD_NODES);
        assert_eq!(store.saves(), ESSD_NODES);
    }

    #[tokio::test]
    async fn test_failed_node_skips_only_its_subtree() {
        // Two systems; the first one's storage collection fails, so its
        // storage member and two drives are never reached.
        let client = essd_tree("dev-1")
            .node(
                "/redfish/v1/Systems",
                json!({
                    "Members@odata.count": 2,
                    "Members": [
                        {"@odata.id": "/redfish/v1/Systems/0"},
                        {"@odata.id": "/redfish/v1/Systems/1"}
                    ]
                }),
            )
            .node(
                "/redfish/v1/Systems/0",
                json!({"Storage": {"@odata.id": "/redfish/v1/Systems/0/Storage"}}),
            )
            .failing("/redfish/v1/Systems/0/Storage", 500);
        let store = MemoryStore::new();

        let report = Crawler::for_kind(DeviceKind::Essd)
            .crawl(&client, Some(&store))
            .await
            .unwrap();

        // 9 nodes are referenced; only the failed one is missing
        assert_eq!(report.failed_reads, 1);
        assert_eq!(report.visited, 9 - 1);
        assert_eq!(store.len(), 9 - 1);
        assert!(store
            .get("/essd/dev-1/redfish/v1/Systems/1/Storage/1/Drives/1")
            .unwrap()
            .is_some());
        assert!(store.get("/essd/dev-1/redfish/v1/Systems/0/Storage").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_mid_level_node_drops_descendants() {
        let client = essd_tree("dev-1").failing("/redfish/v1/Systems/1/Storage/1", 503);
        let store = MemoryStore::new();

        let report = Crawler::for_kind(DeviceKind::Essd)
            .crawl(&client, Some(&store))
            .await
            .unwrap();

        // Storage/1 and its two drives are lost
        assert_eq!(report.visited, ESSD_NODES - 3);
        assert_eq!(store.len(), ESSD_NODES - 3);
        assert!(!client
            .reads()
            .iter()
            .any(|p| p.contains("/Drives/")));
    }

    #[tokio::test]
    async fn test_root_failure_aborts_cycle() {
        let client = essd_tree("dev-1").failing("/redfish/v1", 503);
        let store = MemoryStore::new();
        let tracker = Arc::new(LivenessTracker::for_kind(DeviceKind::Essd));
        let crawler = Crawler::for_kind(DeviceKind::Essd).with_liveness(tracker);

        let err = crawler.crawl(&client, Some(&store)).await.unwrap_err();

        assert!(matches!(err, CrawlError::RootUnavailable { .. }));
        assert!(store.is_empty());
        assert_eq!(client.reads(), vec!["/redfish/v1"]);
    }

    #[tokio::test]
    async fn test_placeholder_collections_are_not_read() {
        let client = essd_tree("dev-1");
        Crawler::for_kind(DeviceKind::Essd)
            .crawl(&client, None)
            .await
            .unwrap();

        let reads = client.reads();
        assert!(!reads.iter().any(|p| p.contains("Chassis")));
        assert!(!reads.iter().any(|p| p.contains("Managers")));
        assert!(!reads.iter().any(|p| p.contains("JsonSchemas")));
    }

    #[tokio::test]
    async fn test_successful_crawl_records_liveness() {
        let client = essd_tree("dev-1");
        let store = MemoryStore::new();
        let tracker = Arc::new(LivenessTracker::for_kind(DeviceKind::Essd));
        let crawler = Crawler::for_kind(DeviceKind::Essd).with_liveness(tracker.clone());

        let report = crawler.crawl(&client, Some(&store)).await.unwrap();

        assert!(report.seen_recorded);
        assert!(tracker.load(&store).contains_key(client.device_id()));
    }

    #[tokio::test]
    async fn test_store_write_failures_do_not_stop_walk() {
        let client = essd_tree("dev-1");
        let store = CountingStore::new(MemoryStore::new()).failing_writes();

        let report = Crawler::for_kind(DeviceKind::Essd)
            .crawl(&client, Some(&store))
            .await
            .unwrap();

        assert_eq!(report.visited, ESSD_NODES);
        assert_eq!(report.failed_writes, ESSD_NODES);
    }

    #[tokio::test]
    async fn test_empty_systems_collection() {
        let client = MockClient::new("dev-2")
            .node("/redfish/v1", json!({"Systems": {"@odata.id": "/redfish/v1/Systems"}}))
            .node("/redfish/v1/Systems", json!({"Members@odata.count": 0, "Members": []}));
        let store = MemoryStore::new();

        let report = Crawler::for_kind(DeviceKind::Essd)
            .crawl(&client, Some(&store))
            .await
            .unwrap();
        assert_eq!(report.visited, 2);
    }
}
