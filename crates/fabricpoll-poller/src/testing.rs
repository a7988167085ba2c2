//! Test doubles shared by the poller's unit tests

use async_trait::async_trait;
use fabricpoll_core::{DeviceId, KvStore, StoreError};
use fabricpoll_redfish::{ClientError, Connector, ResourceClient, Response};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Store wrapper that counts writes and can be told to fail
pub struct CountingStore<S> {
    inner: S,
    saves: AtomicUsize,
    fail_reads: bool,
    fail_writes: bool,
}

impl<S: KvStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            saves: AtomicUsize::new(0),
            fail_reads: false,
            fail_writes: false,
        }
    }

    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl<S: KvStore> KvStore for CountingStore<S> {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if self.fail_reads {
            return Err(StoreError::Backend("read refused".to_string()));
        }
        self.inner.get(key)
    }

    fn save(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Backend("write refused".to_string()));
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(key, value)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key)
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.inner.keys_with_prefix(prefix)
    }
}

/// Resource client serving a fixed tree; unknown paths answer 404
pub struct MockClient {
    id: DeviceId,
    nodes: HashMap<String, Response>,
    reads: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl MockClient {
    pub fn new(id: &str) -> Self {
        Self {
            id: DeviceId::new(id),
            nodes: HashMap::new(),
            reads: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn node(mut self, path: &str, body: Value) -> Self {
        self.nodes.insert(path.to_string(), Response::ok(body));
        self
    }

    pub fn failing(mut self, path: &str, status: u16) -> Self {
        self.nodes.insert(path.to_string(), Response::status(status));
        self
    }

    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResourceClient for MockClient {
    fn device_id(&self) -> &DeviceId {
        &self.id
    }

    async fn get(&self, path: &str) -> Result<Response, ClientError> {
        self.reads.lock().unwrap().push(path.to_string());
        Ok(self
            .nodes
            .get(path)
            .cloned()
            .unwrap_or_else(|| Response::status(404)))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Connector handing out one shared mock client, or failing
pub struct MockConnector {
    pub client: Option<Arc<MockClient>>,
    pub connects: AtomicUsize,
}

impl MockConnector {
    pub fn new(client: MockClient) -> Self {
        Self {
            client: Some(Arc::new(client)),
            connects: AtomicUsize::new(0),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            client: None,
            connects: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Arc<dyn ResourceClient>, ClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match &self.client {
            Some(client) => Ok(client.clone() as Arc<dyn ResourceClient>),
            None => Err(ClientError::Transport {
                path: "/redfish/v1".to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

/// A storage enclosure with one system, one storage controller and two
/// drives: 7 nodes in total
pub fn essd_tree(id: &str) -> MockClient {
    use serde_json::json;

    MockClient::new(id)
        .node(
            "/redfish/v1",
            json!({
                "UUID": id,
                "Systems": {"@odata.id": "/redfish/v1/Systems"},
                "Chassis": {"@odata.id": "/redfish/v1/Chassis"},
                "Managers": {"@odata.id": "/redfish/v1/Managers"},
                "JsonSchemas": {"@odata.id": "/redfish/v1/JsonSchemas"}
            }),
        )
        .node(
            "/redfish/v1/Systems",
            json!({
                "Members@odata.count": 1,
                "Members": [{"@odata.id": "/redfish/v1/Systems/1"}]
            }),
        )
        .node(
            "/redfish/v1/Systems/1",
            json!({
                "Id": "1",
                "Storage": {"@odata.id": "/redfish/v1/Systems/1/Storage"}
            }),
        )
        .node(
            "/redfish/v1/Systems/1/Storage",
            json!({
                "Members": [{"@odata.id": "/redfish/v1/Systems/1/Storage/1"}]
            }),
        )
        .node(
            "/redfish/v1/Systems/1/Storage/1",
            json!({
                "Drives": [
                    {"@odata.id": "/redfish/v1/Systems/1/Storage/1/Drives/0"},
                    {"@odata.id": "/redfish/v1/Systems/1/Storage/1/Drives/1"}
                ]
            }),
        )
        .node(
            "/redfish/v1/Systems/1/Storage/1/Drives/0",
            json!({"Id": "0", "CapacityBytes": 3840755982336u64}),
        )
        .node(
            "/redfish/v1/Systems/1/Storage/1/Drives/1",
            json!({"Id": "1", "CapacityBytes": 3840755982336u64}),
        )
}
