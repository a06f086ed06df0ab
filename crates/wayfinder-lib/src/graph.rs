use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, warn};

use crate::model::{reverse_bearing, Edge, EdgeId, Node, NodeId};

/// Directed traversal derived from an [`Edge`]; every active edge yields two.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectedArc {
    pub to: NodeId,
    pub distance: f64,
    pub bearing: f64,
    pub is_staircase: bool,
    pub edge_id: EdgeId,
}

/// Graph structure used by the router.
///
/// Built from a node/edge snapshot and never mutated afterwards; a refreshed
/// snapshot produces a new model.
#[derive(Debug, Clone, Default)]
pub struct GraphModel {
    nodes: HashMap<NodeId, Node>,
    code_to_id: HashMap<String, NodeId>,
    adjacency: HashMap<NodeId, Vec<DirectedArc>>,
    skipped_edges: usize,
}

impl GraphModel {
    /// Build a model from a snapshot. Inactive edges are dropped entirely, as
    /// are edges whose endpoints are not part of the node set.
    pub fn build(nodes: &[Node], edges: &[Edge]) -> Self {
        let mut model = GraphModel {
            nodes: HashMap::with_capacity(nodes.len()),
            code_to_id: HashMap::with_capacity(nodes.len()),
            adjacency: HashMap::with_capacity(nodes.len()),
            skipped_edges: 0,
        };

        for node in nodes {
            model.code_to_id.insert(node.code.clone(), node.id);
            model.adjacency.entry(node.id).or_default();
            model.nodes.insert(node.id, node.clone());
        }

        for edge in edges {
            if !edge.is_active {
                continue;
            }
            if !model.nodes.contains_key(&edge.from) || !model.nodes.contains_key(&edge.to) {
                model.skipped_edges += 1;
                warn!(
                    edge = edge.id,
                    from = edge.from,
                    to = edge.to,
                    "edge references unknown node, skipping"
                );
                continue;
            }

            model.push_arc(
                edge.from,
                DirectedArc {
                    to: edge.to,
                    distance: edge.distance,
                    bearing: edge.bearing,
                    is_staircase: edge.is_staircase,
                    edge_id: edge.id,
                },
            );
            model.push_arc(
                edge.to,
                DirectedArc {
                    to: edge.from,
                    distance: edge.distance,
                    bearing: reverse_bearing(edge.bearing),
                    is_staircase: edge.is_staircase,
                    edge_id: edge.id,
                },
            );
        }

        debug!(
            nodes = model.nodes.len(),
            arcs = model.arc_count(),
            skipped = model.skipped_edges,
            "built graph model"
        );
        model
    }

    fn push_arc(&mut self, from: NodeId, arc: DirectedArc) {
        self.adjacency.entry(from).or_default().push(arc);
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_by_code(&self, code: &str) -> Option<&Node> {
        self.code_to_id.get(code).and_then(|id| self.nodes.get(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Return the outgoing arcs for a node.
    pub fn neighbours(&self, node: NodeId) -> &[DirectedArc] {
        self.adjacency
            .get(&node)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn arc_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum()
    }

    /// Number of active edges dropped because an endpoint was missing.
    pub fn skipped_edges(&self) -> usize {
        self.skipped_edges
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Codes closest to `code` by edit distance, best match first.
    pub fn similar_codes(&self, code: &str, limit: usize) -> Vec<String> {
        let needle = code.to_ascii_lowercase();
        let mut scored: Vec<(f64, &String)> = self
            .code_to_id
            .keys()
            .map(|candidate| {
                let score = strsim::jaro_winkler(&needle, &candidate.to_ascii_lowercase());
                (score, candidate)
            })
            .filter(|(score, _)| *score >= 0.8)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored
            .into_iter()
            .take(limit)
            .map(|(_, candidate)| candidate.clone())
            .collect()
    }

    /// Node ids reachable within `hops` arcs of `center`, excluding `center`
    /// itself, in breadth-first order. Unknown ids yield an empty list.
    pub fn nearby_node_ids(&self, center: NodeId, hops: usize) -> Vec<NodeId> {
        if !self.nodes.contains_key(&center) || hops == 0 {
            return Vec::new();
        }

        let mut visited = HashSet::from([center]);
        let mut queue = VecDeque::from([(center, 0usize)]);
        let mut nearby = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            if depth == hops {
                continue;
            }
            for arc in self.neighbours(current) {
                if visited.insert(arc.to) {
                    nearby.push(arc.to);
                    queue.push_back((arc.to, depth + 1));
                }
            }
        }

        nearby
    }
}
