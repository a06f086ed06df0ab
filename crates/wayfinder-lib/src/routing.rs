//! Router handle that owns the current [`GraphModel`].
//!
//! The graph is held behind an `Arc` that is swapped atomically on rebuild.
//! Queries clone the `Arc` first and then search without holding any lock,
//! so a concurrent rebuild or invalidation never tears a running query.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::ResourceCache;
use crate::directions::Directions;
use crate::error::{Error, Result};
use crate::graph::GraphModel;
use crate::model::{Edge, Node, NodeId};
use crate::path::{find_path, PathResult, SearchOptions, DEFAULT_FLOOR_WEIGHT};

/// Tunables for the router.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Heuristic metres per floor of separation; zero disables the heuristic.
    pub floor_weight: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            floor_weight: DEFAULT_FLOOR_WEIGHT,
        }
    }
}

#[derive(Debug, Default)]
pub struct Router {
    current: RwLock<Option<Arc<GraphModel>>>,
    generation: AtomicU64,
    config: RouterConfig,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            current: RwLock::new(None),
            generation: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> RouterConfig {
        self.config
    }

    /// Build a graph from a snapshot and install it.
    pub fn load(&self, nodes: &[Node], edges: &[Edge]) -> Arc<GraphModel> {
        let graph = Arc::new(GraphModel::build(nodes, edges));
        self.install(Arc::clone(&graph));
        graph
    }

    fn install(&self, graph: Arc<GraphModel>) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Some(graph);
    }

    /// Drop the current graph so the next [`Router::ensure_loaded`] rebuilds.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if current.take().is_some() {
            info!("routing graph invalidated");
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.graph().is_some()
    }

    /// Snapshot of the installed graph, if any.
    pub fn graph(&self) -> Option<Arc<GraphModel>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn require_graph(&self) -> Result<Arc<GraphModel>> {
        self.graph().ok_or(Error::NotInitialized)
    }

    /// Return the installed graph, rebuilding it from the cache when missing.
    ///
    /// A rebuild that races with [`Router::invalidate`] is returned to the
    /// caller but not installed, so stale snapshots never outlive an
    /// invalidation.
    pub async fn ensure_loaded(&self, cache: &ResourceCache) -> Result<Arc<GraphModel>> {
        if let Some(graph) = self.graph() {
            return Ok(graph);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let nodes = cache.get_nodes().await?;
        let edges = cache.get_edges().await?;
        if nodes.is_empty() {
            return Err(Error::NotInitialized);
        }

        let graph = Arc::new(GraphModel::build(&nodes, &edges));
        if self.generation.load(Ordering::SeqCst) == generation {
            self.install(Arc::clone(&graph));
            debug!(nodes = graph.node_count(), "routing graph rebuilt from cache");
        }
        Ok(graph)
    }

    /// Shortest path between two node codes.
    pub fn find_path(&self, start: &str, goal: &str, avoid_stairs: bool) -> Result<PathResult> {
        let graph = self.require_graph()?;
        let options = SearchOptions {
            avoid_stairs,
            floor_weight: self.config.floor_weight,
        };
        find_path(&graph, start, goal, &options)
    }

    /// Shortest path plus a human-readable turn list.
    pub fn get_directions(&self, start: &str, goal: &str, avoid_stairs: bool) -> Result<Directions> {
        self.find_path(start, goal, avoid_stairs)
            .map(Directions::from_path)
    }

    /// Node ids within `hops` of `node_id`; empty when nothing is loaded.
    pub fn nearby_node_ids(&self, node_id: NodeId, hops: usize) -> Vec<NodeId> {
        self.graph()
            .map(|graph| graph.nearby_node_ids(node_id, hops))
            .unwrap_or_default()
    }
}
