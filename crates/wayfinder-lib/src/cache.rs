//! Two-tier resource cache for the campus dataset and its imagery.
//!
//! Durable storage is the source of truth. Each collection has an in-memory
//! mirror that is populated on the first read (read-through) and replaced
//! only after a durable write succeeded (write-after). The mirror slot is an
//! async mutex held across the durable operation, which also makes
//! concurrent cold reads single-flight.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::fetch::Fetch;
use crate::graph::GraphModel;
use crate::model::{Edge, Node, NodeId};
use crate::path::{find_path, SearchOptions};
use crate::routing::Router;
use crate::session::SessionFlag;
use crate::state::{SyncState, SYNC_STATE_KEY};
use crate::store::{AssetRef, BlobStore, KeyValueStore};

pub const NODES_KEY: &str = "wayfinder:nodes";
pub const EDGES_KEY: &str = "wayfinder:edges";
const NODES_META_KEY: &str = "wayfinder:meta:nodes";
const EDGES_META_KEY: &str = "wayfinder:meta:edges";

const NODE_IMAGE_PREFIX: &str = "node-image-";
const CAMPUS_MAP_PREFIX: &str = "campus-map-";

/// Hop bound for the self-check probe in [`ResourceCache::verify_pathfinding`].
const VERIFY_PROBE_HOPS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Hop radius around the current node for predictive image caching.
    pub prefetch_hops: usize,
    /// Delay before predictive caching starts after a navigation event.
    pub prefetch_delay_ms: u64,
    /// Quality transform applied to remote image URLs (e.g. `auto`, `60`).
    pub image_quality: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefetch_hops: 1,
            prefetch_delay_ms: 800,
            image_quality: Some("auto".to_string()),
        }
    }
}

/// Freshness bookkeeping stored next to each collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub updated_at: DateTime<Utc>,
    pub item_count: usize,
}

/// Where an image should be loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    Local { asset: AssetRef },
    Remote { url: String },
}

impl ImageSource {
    pub fn is_local(&self) -> bool {
        matches!(self, ImageSource::Local { .. })
    }
}

/// Aggregate view of what is available offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfflineStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub cached_images: usize,
    pub disk_bytes: u64,
    pub last_sync: Option<DateTime<Utc>>,
    pub nodes_updated_at: Option<DateTime<Utc>>,
    pub edges_updated_at: Option<DateTime<Utc>>,
}

/// Outcome of one predictive caching pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PrefetchReport {
    pub center: NodeId,
    pub candidates: usize,
    pub fetched: usize,
    pub already_cached: usize,
    pub failed: usize,
    /// Set when the pass was skipped or cut short by an active download.
    pub skipped: bool,
}

/// Probe query run by [`ResourceCache::verify_pathfinding`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub from: String,
    pub to: String,
    pub hops: usize,
    pub distance: f64,
}

/// Result of an offline pathfinding self-check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationReport {
    pub nodes: usize,
    pub edges: usize,
    pub arcs: usize,
    pub dangling_edges: usize,
    pub probe: Option<ProbeResult>,
    pub passed: bool,
    pub message: String,
}

pub fn node_image_key(node_id: NodeId) -> String {
    format!("{NODE_IMAGE_PREFIX}{node_id}")
}

pub fn campus_map_key(map_id: &str) -> String {
    format!("{CAMPUS_MAP_PREFIX}{map_id}")
}

/// Insert a delivery quality transform into CDN-style `/upload/` URLs.
pub fn apply_quality(url: &str, quality: Option<&str>) -> String {
    let Some(quality) = quality else {
        return url.to_string();
    };
    match url.split_once("/upload/") {
        Some((head, tail)) if !tail.starts_with("q_") => {
            format!("{head}/upload/q_{quality}/{tail}")
        }
        _ => url.to_string(),
    }
}

type Mirror<T> = Mutex<Option<Arc<Vec<T>>>>;

pub struct ResourceCache {
    kv: Arc<dyn KeyValueStore>,
    blobs: Arc<dyn BlobStore>,
    fetch: Arc<dyn Fetch>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    nodes: Mirror<Node>,
    edges: Mirror<Edge>,
    sync_state: Mutex<()>,
    downloads: SessionFlag,
}

impl ResourceCache {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        blobs: Arc<dyn BlobStore>,
        fetch: Arc<dyn Fetch>,
        clock: Arc<dyn Clock>,
        config: CacheConfig,
    ) -> Self {
        Self {
            kv,
            blobs,
            fetch,
            clock,
            config,
            nodes: Mutex::new(None),
            edges: Mutex::new(None),
            sync_state: Mutex::new(()),
            downloads: SessionFlag::new(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetch> {
        &self.fetch
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Flag marking an active download session; predictive caching yields to it.
    pub fn download_activity(&self) -> &SessionFlag {
        &self.downloads
    }

    // -------------------------------------------------------------------------
    // Collections
    // -------------------------------------------------------------------------

    pub async fn get_nodes(&self) -> Result<Arc<Vec<Node>>> {
        self.read_through(&self.nodes, NODES_KEY).await
    }

    pub async fn get_edges(&self) -> Result<Arc<Vec<Edge>>> {
        self.read_through(&self.edges, EDGES_KEY).await
    }

    pub async fn save_nodes(&self, nodes: Vec<Node>) -> Result<()> {
        self.write_after(&self.nodes, NODES_KEY, NODES_META_KEY, nodes)
            .await
    }

    pub async fn save_edges(&self, edges: Vec<Edge>) -> Result<()> {
        self.write_after(&self.edges, EDGES_KEY, EDGES_META_KEY, edges)
            .await
    }

    async fn read_through<T>(&self, slot: &Mirror<T>, key: &str) -> Result<Arc<Vec<T>>>
    where
        T: DeserializeOwned,
    {
        let mut mirror = slot.lock().await;
        if let Some(items) = mirror.as_ref() {
            return Ok(Arc::clone(items));
        }

        let items: Vec<T> = match self.kv.get(key).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                warn!(key, %err, "cached collection is corrupt");
                Error::read(key, err)
            })?,
            None => Vec::new(),
        };
        debug!(key, items = items.len(), "loaded collection from storage");

        let items = Arc::new(items);
        *mirror = Some(Arc::clone(&items));
        Ok(items)
    }

    async fn write_after<T>(
        &self,
        slot: &Mirror<T>,
        key: &str,
        meta_key: &str,
        items: Vec<T>,
    ) -> Result<()>
    where
        T: Serialize,
    {
        let mut mirror = slot.lock().await;
        let bytes = serde_json::to_vec(&items).map_err(|err| Error::write(key, err))?;
        self.kv.set(key, bytes).await?;

        let metadata = CacheMetadata {
            updated_at: self.clock.now(),
            item_count: items.len(),
        };
        match serde_json::to_vec(&metadata) {
            Ok(bytes) => {
                if let Err(err) = self.kv.set(meta_key, bytes).await {
                    warn!(key = meta_key, %err, "failed to record cache metadata");
                }
            }
            Err(err) => warn!(key = meta_key, %err, "failed to encode cache metadata"),
        }

        info!(key, items = items.len(), "collection saved");
        *mirror = Some(Arc::new(items));
        Ok(())
    }

    /// Persist a fresh dataset snapshot, returning whether anything changed.
    ///
    /// Unchanged collections are not rewritten. A collection whose cached
    /// copy cannot be read is treated as changed.
    pub async fn replace_dataset(&self, nodes: Vec<Node>, edges: Vec<Edge>) -> Result<bool> {
        let nodes_changed = match self.get_nodes().await {
            Ok(current) => *current != nodes,
            Err(_) => true,
        };
        let edges_changed = match self.get_edges().await {
            Ok(current) => *current != edges,
            Err(_) => true,
        };

        if nodes_changed {
            self.save_nodes(nodes).await?;
        }
        if edges_changed {
            self.save_edges(edges).await?;
        }
        Ok(nodes_changed || edges_changed)
    }

    /// Node with `node_id` from the cached collection.
    pub async fn node(&self, node_id: NodeId) -> Result<Option<Node>> {
        Ok(self
            .get_nodes()
            .await?
            .iter()
            .find(|node| node.id == node_id)
            .cloned())
    }

    // -------------------------------------------------------------------------
    // Binary assets
    // -------------------------------------------------------------------------

    pub async fn cached_image(&self, node_id: NodeId) -> Option<AssetRef> {
        let key = node_image_key(node_id);
        match self.blobs.locate(&key).await {
            Ok(asset) => asset,
            Err(err) => {
                warn!(key, %err, "failed to inspect cached image");
                None
            }
        }
    }

    pub async fn is_image_cached(&self, node_id: NodeId) -> bool {
        self.cached_image(node_id).await.is_some()
    }

    /// Serve `key` from the blob store, fetching `url` into it on a miss.
    pub async fn download_image(&self, url: &str, key: &str) -> Result<AssetRef> {
        match self.blobs.locate(key).await {
            Ok(Some(asset)) => return Ok(asset),
            Ok(None) => {}
            Err(err) => warn!(key, %err, "asset lookup failed, refetching"),
        }

        let bytes = self.fetch.get_bytes(url).await?;
        let asset = self.blobs.write(key, bytes).await?;
        debug!(key, size = asset.size, "asset cached");
        Ok(asset)
    }

    /// Cache the image of `node`, if it has one.
    pub async fn download_node_image(&self, node: &Node) -> Result<Option<AssetRef>> {
        match node.image.as_deref() {
            Some(url) if !url.is_empty() => self
                .download_image(url, &node_image_key(node.id))
                .await
                .map(Some),
            _ => Ok(None),
        }
    }

    /// Resolve where the image of `node` should be displayed from.
    ///
    /// A cached copy always wins, even when the network is available.
    pub async fn image_url(&self, node: &Node) -> Option<ImageSource> {
        let remote = node.image.as_deref().filter(|url| !url.is_empty())?;
        if let Some(asset) = self.cached_image(node.id).await {
            return Some(ImageSource::Local { asset });
        }
        Some(ImageSource::Remote {
            url: apply_quality(remote, self.config.image_quality.as_deref()),
        })
    }

    pub async fn campus_map_image_url(&self, url: &str, map_id: &str) -> ImageSource {
        let key = campus_map_key(map_id);
        match self.blobs.locate(&key).await {
            Ok(Some(asset)) => ImageSource::Local { asset },
            Ok(None) => ImageSource::Remote {
                url: apply_quality(url, self.config.image_quality.as_deref()),
            },
            Err(err) => {
                warn!(key, %err, "failed to inspect cached campus map");
                ImageSource::Remote {
                    url: apply_quality(url, self.config.image_quality.as_deref()),
                }
            }
        }
    }

    pub async fn download_campus_map(&self, url: &str, map_id: &str) -> Result<AssetRef> {
        self.download_image(url, &campus_map_key(map_id)).await
    }

    // -------------------------------------------------------------------------
    // Predictive caching
    // -------------------------------------------------------------------------

    /// Fetch uncached images of the nodes around `center`.
    ///
    /// Skipped outright while a download session is active, and abandoned
    /// between items if one starts.
    pub async fn predictive_cache(&self, router: &Router, center: NodeId) -> PrefetchReport {
        let mut report = PrefetchReport {
            center,
            ..PrefetchReport::default()
        };

        if self.downloads.is_active() {
            debug!(center, "download in progress, skipping predictive cache");
            report.skipped = true;
            return report;
        }

        // Downloads and syncs invalidate the router, so rebuild it from the
        // cached snapshot before looking for neighbours.
        let graph = match router.ensure_loaded(self).await {
            Ok(graph) => graph,
            Err(err) => {
                warn!(center, %err, "no routing graph, skipping predictive cache");
                report.skipped = true;
                return report;
            }
        };
        let nearby = graph.nearby_node_ids(center, self.config.prefetch_hops);
        let nodes = match self.get_nodes().await {
            Ok(nodes) => nodes,
            Err(err) => {
                warn!(center, %err, "predictive cache could not read nodes");
                return report;
            }
        };

        let wanted: HashSet<NodeId> = nearby.into_iter().collect();
        let candidates: Vec<&Node> = nodes
            .iter()
            .filter(|node| wanted.contains(&node.id) && node.has_image())
            .collect();
        report.candidates = candidates.len();

        for node in candidates {
            if self.downloads.is_active() {
                report.skipped = true;
                break;
            }
            if self.is_image_cached(node.id).await {
                report.already_cached += 1;
                continue;
            }
            match self.download_node_image(node).await {
                Ok(_) => report.fetched += 1,
                Err(err) => {
                    report.failed += 1;
                    debug!(node = node.id, %err, "predictive image fetch failed");
                }
            }
        }

        debug!(
            center,
            fetched = report.fetched,
            cached = report.already_cached,
            failed = report.failed,
            "predictive cache pass finished"
        );
        report
    }

    /// Run [`ResourceCache::predictive_cache`] in the background after the
    /// configured delay.
    pub fn schedule_predictive_cache(
        self: &Arc<Self>,
        router: Arc<Router>,
        center: NodeId,
    ) -> JoinHandle<PrefetchReport> {
        let cache = Arc::clone(self);
        let delay = Duration::from_millis(self.config.prefetch_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            cache.predictive_cache(&router, center).await
        })
    }

    // -------------------------------------------------------------------------
    // Availability and statistics
    // -------------------------------------------------------------------------

    /// True when both collections are cached and every edge endpoint resolves.
    pub async fn is_pathfinding_available(&self) -> bool {
        let (nodes, edges) = match (self.get_nodes().await, self.get_edges().await) {
            (Ok(nodes), Ok(edges)) => (nodes, edges),
            _ => return false,
        };
        if nodes.is_empty() || edges.is_empty() {
            return false;
        }
        let ids: HashSet<NodeId> = nodes.iter().map(|node| node.id).collect();
        edges
            .iter()
            .all(|edge| ids.contains(&edge.from) && ids.contains(&edge.to))
    }

    /// Inspect durable storage (never the mirrors) and summarize it.
    pub async fn offline_stats(&self) -> Result<OfflineStats> {
        let mut disk_bytes = 0u64;

        let (node_count, bytes) = self.count_stored(NODES_KEY).await?;
        disk_bytes += bytes;
        let (edge_count, bytes) = self.count_stored(EDGES_KEY).await?;
        disk_bytes += bytes;

        let nodes_meta = self.stored_metadata(NODES_META_KEY).await;
        let edges_meta = self.stored_metadata(EDGES_META_KEY).await;

        let state = match self.kv.get(SYNC_STATE_KEY).await? {
            Some(bytes) => {
                disk_bytes += bytes.len() as u64;
                serde_json::from_slice::<SyncState>(&bytes).unwrap_or_default()
            }
            None => SyncState::default(),
        };

        let assets = self.blobs.list().await?;
        let cached_images = assets
            .iter()
            .filter(|asset| asset.key.starts_with(NODE_IMAGE_PREFIX))
            .count();
        disk_bytes += assets.iter().map(|asset| asset.size).sum::<u64>();

        Ok(OfflineStats {
            node_count,
            edge_count,
            cached_images,
            disk_bytes,
            last_sync: state.last_sync,
            nodes_updated_at: nodes_meta.map(|meta| meta.updated_at),
            edges_updated_at: edges_meta.map(|meta| meta.updated_at),
        })
    }

    async fn count_stored(&self, key: &str) -> Result<(usize, u64)> {
        let Some(bytes) = self.kv.get(key).await? else {
            return Ok((0, 0));
        };
        let count = serde_json::from_slice::<Vec<IgnoredAny>>(&bytes)
            .map(|items| items.len())
            .map_err(|err| Error::read(key, err))?;
        Ok((count, bytes.len() as u64))
    }

    async fn stored_metadata(&self, key: &str) -> Option<CacheMetadata> {
        let bytes = self.kv.get(key).await.ok()??;
        serde_json::from_slice(&bytes).ok()
    }

    /// Build a transient graph from the cached snapshot and run a bounded
    /// path query to surface corruption before the user relies on it offline.
    pub async fn verify_pathfinding(&self) -> Result<VerificationReport> {
        let nodes = self.get_nodes().await?;
        let edges = self.get_edges().await?;
        let graph = GraphModel::build(&nodes, &edges);

        let mut report = VerificationReport {
            nodes: graph.node_count(),
            edges: edges.len(),
            arcs: graph.arc_count(),
            dangling_edges: graph.skipped_edges(),
            probe: None,
            passed: false,
            message: String::new(),
        };

        if graph.is_empty() {
            report.message = "no cached nodes".to_string();
            return Ok(report);
        }

        let origin = graph
            .nodes()
            .filter(|node| !graph.neighbours(node.id).is_empty())
            .min_by_key(|node| node.id);
        let Some(origin) = origin else {
            report.message = "no connected nodes in cached graph".to_string();
            return Ok(report);
        };

        let Some(target) = graph
            .nearby_node_ids(origin.id, VERIFY_PROBE_HOPS)
            .last()
            .and_then(|id| graph.node(*id))
        else {
            report.message = "probe origin has no reachable neighbours".to_string();
            return Ok(report);
        };

        match find_path(&graph, &origin.code, &target.code, &SearchOptions::default()) {
            Ok(path) => {
                report.probe = Some(ProbeResult {
                    from: origin.code.clone(),
                    to: target.code.clone(),
                    hops: path.hop_count(),
                    distance: path.total_distance,
                });
                report.passed = report.dangling_edges == 0;
                report.message = if report.passed {
                    "pathfinding verified".to_string()
                } else {
                    format!("{} edges reference unknown nodes", report.dangling_edges)
                };
            }
            Err(err) => {
                report.message = format!("probe query failed: {err}");
            }
        }

        info!(passed = report.passed, detail = %report.message, "pathfinding verification");
        Ok(report)
    }

    // -------------------------------------------------------------------------
    // Sync state and maintenance
    // -------------------------------------------------------------------------

    pub async fn sync_state(&self) -> Result<SyncState> {
        SyncState::load(self.kv.as_ref()).await
    }

    /// Read-modify-write the persisted sync state under a lock.
    pub async fn update_sync_state<F>(&self, update: F) -> Result<SyncState>
    where
        F: FnOnce(&mut SyncState) + Send,
    {
        let _guard = self.sync_state.lock().await;
        let mut state = SyncState::load(self.kv.as_ref()).await?;
        update(&mut state);
        state.save(self.kv.as_ref()).await?;
        Ok(state)
    }

    /// Record a successful sync completion at the current clock time.
    pub async fn record_sync(&self) -> Result<DateTime<Utc>> {
        let now = self.clock.now();
        self.update_sync_state(|state| state.last_sync = Some(now))
            .await?;
        Ok(now)
    }

    /// Remove cached collections and assets from both tiers. Sync policy
    /// flags are preserved.
    pub async fn clear(&self) -> Result<()> {
        let mut nodes = self.nodes.lock().await;
        let mut edges = self.edges.lock().await;

        for key in [NODES_KEY, EDGES_KEY, NODES_META_KEY, EDGES_META_KEY] {
            self.kv.remove(key).await?;
        }
        for asset in self.blobs.list().await? {
            self.blobs.remove(&asset.key).await?;
        }

        *nodes = None;
        *edges = None;
        info!("offline cache cleared");
        Ok(())
    }
}
