//! Common test utilities shared by the integration tests.
//!
//! Graph builders, instrumented stores, a scripted fetcher and a fixed clock
//! so cache, download and sync behaviour can be exercised without disk or
//! network access.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use wayfinder_lib::download::CancelHandle;
use wayfinder_lib::{
    BlobStore, CacheConfig, Clock, DatasetEndpoints, DownloadOrchestrator, Edge, Error, Fetch,
    KeyValueStore, MemoryBlobStore, MemoryStore, Node, NodeId, NodeKind, ResourceCache, Result,
    Router, RouterConfig,
};

/// Path to the JSON fixture dataset shared with the CLI tests.
#[allow(dead_code)]
pub fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../docs/fixtures")
}

#[allow(dead_code)]
pub fn node(id: NodeId, code: &str, floor: i32) -> Node {
    Node {
        id,
        code: code.to_string(),
        name: format!("{code} name"),
        building: "Science".to_string(),
        floor_level: floor,
        kind: NodeKind::Hallway,
        position: None,
        image: None,
    }
}

#[allow(dead_code)]
pub fn node_with_image(id: NodeId, code: &str, floor: i32) -> Node {
    Node {
        image: Some(image_url(id)),
        ..node(id, code, floor)
    }
}

#[allow(dead_code)]
pub fn image_url(id: NodeId) -> String {
    format!("https://img.example.edu/upload/node-{id}.jpg")
}

#[allow(dead_code)]
pub fn edge(id: i64, from: NodeId, to: NodeId, distance: f64) -> Edge {
    Edge {
        id,
        from,
        to,
        distance,
        bearing: 90.0,
        is_staircase: false,
        is_active: true,
    }
}

#[allow(dead_code)]
pub fn stairs(id: i64, from: NodeId, to: NodeId, distance: f64) -> Edge {
    Edge {
        is_staircase: true,
        ..edge(id, from, to, distance)
    }
}

/// Diamond A-B-D / A-C-D where the route via C is shorter (10 vs 12).
#[allow(dead_code)]
pub fn diamond() -> (Vec<Node>, Vec<Edge>) {
    let nodes = vec![node(1, "A", 0), node(2, "B", 0), node(3, "C", 0), node(4, "D", 0)];
    let edges = vec![
        edge(1, 1, 2, 6.0),
        edge(2, 2, 4, 6.0),
        edge(3, 1, 3, 5.0),
        edge(4, 3, 4, 5.0),
    ];
    (nodes, edges)
}

/// Two floors joined by a 40 m staircase and a 42 m elevator route.
#[allow(dead_code)]
pub fn two_floors() -> (Vec<Node>, Vec<Edge>) {
    let nodes = vec![
        node(1, "LOBBY", 0),
        node(2, "LAB-101", 1),
        Node {
            kind: NodeKind::Elevator,
            ..node(3, "ELEV-0", 0)
        },
        Node {
            kind: NodeKind::Elevator,
            ..node(4, "ELEV-1", 1)
        },
    ];
    let edges = vec![
        stairs(1, 1, 2, 40.0),
        edge(2, 1, 3, 20.0),
        edge(3, 3, 4, 2.0),
        edge(4, 4, 2, 20.0),
    ];
    (nodes, edges)
}

/// Remote payloads for `nodes`, mixing wrapped and nested shapes.
#[allow(dead_code)]
pub fn nodes_payload(nodes: &[Node]) -> Value {
    let records: Vec<Value> = nodes
        .iter()
        .map(|node| {
            json!({
                "id": node.id,
                "code": node.code,
                "name": node.name,
                "building_name": node.building,
                "floor_level": node.floor_level,
                "node_type": node.kind.to_string(),
                "image360": node.image,
            })
        })
        .collect();
    json!({ "data": records })
}

#[allow(dead_code)]
pub fn edges_payload(edges: &[Edge]) -> Value {
    let records: Vec<Value> = edges
        .iter()
        .map(|edge| {
            json!({
                "id": edge.id,
                "from_node": { "id": edge.from },
                "to_node_id": edge.to,
                "distance": edge.distance,
                "compass_angle": edge.bearing,
                "is_staircase": edge.is_staircase,
                "is_active": edge.is_active,
            })
        })
        .collect();
    Value::Array(records)
}

/// Key-value store that counts reads and can delay them.
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    reads: AtomicUsize,
    writes: AtomicUsize,
    delay: Option<Duration>,
    fail_writes: bool,
    fail_key: Option<String>,
}

#[allow(dead_code)]
impl CountingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    /// Reject writes to `key` only.
    pub fn failing_key(key: &str) -> Self {
        Self {
            fail_key: Some(key.to_string()),
            ..Self::default()
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyValueStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        if self.fail_writes || self.fail_key.as_deref() == Some(key) {
            return Err(Error::StorageWrite {
                key: key.to_string(),
                message: "disk full".to_string(),
            });
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key).await
    }
}

/// Fetcher serving canned responses, recording every requested URL.
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    requests: Mutex<Vec<String>>,
    image_fetches: AtomicUsize,
    cancel_after: Mutex<Option<(CancelHandle, usize)>>,
}

#[allow(dead_code)]
impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `nodes/` and `edges/` with the given dataset and every node
    /// image with a few bytes.
    pub fn with_dataset(nodes: &[Node], edges: &[Edge]) -> Self {
        let fetcher = Self::new();
        fetcher.set_dataset(nodes, edges);
        for node in nodes {
            if let Some(url) = &node.image {
                fetcher.respond(url, vec![node.id as u8; 8]);
            }
        }
        fetcher
    }

    pub fn set_dataset(&self, nodes: &[Node], edges: &[Edge]) {
        let endpoints = DatasetEndpoints::default();
        self.respond(&endpoints.nodes, nodes_payload(nodes).to_string().into_bytes());
        self.respond(&endpoints.edges, edges_payload(edges).to_string().into_bytes());
    }

    pub fn respond(&self, url: &str, body: Vec<u8>) {
        self.responses
            .lock()
            .expect("responses lock")
            .insert(url.to_string(), body);
    }

    pub fn fail(&self, url: &str) {
        self.failing
            .lock()
            .expect("failing lock")
            .insert(url.to_string());
    }

    /// Trigger `handle` once `count` image fetches have completed.
    pub fn cancel_after(&self, handle: CancelHandle, count: usize) {
        *self.cancel_after.lock().expect("cancel lock") = Some((handle, count));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn image_fetches(&self) -> usize {
        self.image_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for ScriptedFetcher {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(url.to_string());

        if self.failing.lock().expect("failing lock").contains(url) {
            return Err(Error::DownloadFailed {
                message: format!("scripted failure for {url}"),
            });
        }
        let body = self
            .responses
            .lock()
            .expect("responses lock")
            .get(url)
            .cloned()
            .ok_or_else(|| Error::DownloadFailed {
                message: format!("no scripted response for {url}"),
            })?;

        if url.ends_with(".jpg") {
            let fetched = self.image_fetches.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((handle, count)) = self.cancel_after.lock().expect("cancel lock").as_ref() {
                if fetched >= *count {
                    handle.cancel();
                }
            }
        }
        Ok(body)
    }
}

/// Clock pinned to a settable instant.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

#[allow(dead_code)]
impl FixedClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(
                Utc.with_ymd_and_hms(2025, 9, 1, 9, 0, 0)
                    .single()
                    .expect("valid timestamp"),
            ),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock lock") = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

/// Fully wired in-memory core for a scripted dataset.
#[allow(dead_code)]
pub struct Harness {
    pub kv: Arc<CountingStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub fetcher: Arc<ScriptedFetcher>,
    pub clock: Arc<FixedClock>,
    pub cache: Arc<ResourceCache>,
    pub router: Arc<Router>,
    pub orchestrator: Arc<DownloadOrchestrator>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(fetcher: ScriptedFetcher) -> Self {
        Self::with_store(CountingStore::new(), fetcher)
    }

    pub fn with_store(kv: CountingStore, fetcher: ScriptedFetcher) -> Self {
        let kv = Arc::new(kv);
        let blobs = Arc::new(MemoryBlobStore::new());
        let fetcher = Arc::new(fetcher);
        let clock = Arc::new(FixedClock::new());
        let cache = Arc::new(ResourceCache::new(
            Arc::clone(&kv) as Arc<dyn KeyValueStore>,
            Arc::clone(&blobs) as Arc<dyn BlobStore>,
            Arc::clone(&fetcher) as Arc<dyn Fetch>,
            Arc::clone(&clock) as Arc<dyn Clock>,
            CacheConfig {
                prefetch_delay_ms: 10,
                ..CacheConfig::default()
            },
        ));
        let router = Arc::new(Router::new(RouterConfig::default()));
        let orchestrator = Arc::new(DownloadOrchestrator::new(
            Arc::clone(&cache),
            Arc::clone(&router),
            DatasetEndpoints::default(),
        ));
        Self {
            kv,
            blobs,
            fetcher,
            clock,
            cache,
            router,
            orchestrator,
        }
    }
}
