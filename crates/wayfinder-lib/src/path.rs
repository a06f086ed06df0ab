use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::graph::{DirectedArc, GraphModel};
use crate::model::{EdgeId, Node, NodeId};

/// Default estimate of walking distance per floor of separation, in metres.
pub const DEFAULT_FLOOR_WEIGHT: f64 = 4.0;

/// Options applied during a path search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    /// Skip staircase arcs entirely when `true`.
    pub avoid_stairs: bool,
    /// Metres charged per floor of difference by the heuristic. Zero turns
    /// the search into plain Dijkstra.
    pub floor_weight: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            avoid_stairs: false,
            floor_weight: DEFAULT_FLOOR_WEIGHT,
        }
    }
}

impl SearchOptions {
    pub fn avoiding_stairs(avoid_stairs: bool) -> Self {
        Self {
            avoid_stairs,
            ..Self::default()
        }
    }

    fn allows(&self, arc: &DirectedArc) -> bool {
        !(self.avoid_stairs && arc.is_staircase)
    }
}

/// One node along a computed path.
///
/// Every step after the first carries the arc that reached it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathStep {
    pub node: Node,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    pub is_staircase: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edge_id: Option<EdgeId>,
}

/// Result of a successful path query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathResult {
    pub steps: Vec<PathStep>,
    pub total_distance: f64,
    pub avoid_stairs: bool,
}

impl PathResult {
    /// Number of arcs traversed.
    pub fn hop_count(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    pub fn uses_stairs(&self) -> bool {
        self.steps.iter().any(|step| step.is_staircase)
    }

    pub fn codes(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.node.code.as_str()).collect()
    }
}

/// Find the shortest path between two node codes using A*.
pub fn find_path(
    graph: &GraphModel,
    start_code: &str,
    goal_code: &str,
    options: &SearchOptions,
) -> Result<PathResult> {
    let start = resolve(graph, start_code)?;
    let goal = resolve(graph, goal_code)?;

    if start.id == goal.id {
        return Ok(PathResult {
            steps: vec![origin_step(start)],
            total_distance: 0.0,
            avoid_stairs: options.avoid_stairs,
        });
    }

    let Some(parents) = a_star(graph, start, goal, options) else {
        return Err(Error::NoPathFound {
            start: start_code.to_string(),
            goal: goal_code.to_string(),
            avoid_stairs: options.avoid_stairs,
        });
    };

    Ok(reconstruct_path(graph, &parents, start, goal, options))
}

fn resolve<'a>(graph: &'a GraphModel, code: &str) -> Result<&'a Node> {
    graph.node_by_code(code).ok_or_else(|| Error::UnknownNode {
        code: code.to_string(),
        suggestions: graph.similar_codes(code, 3),
    })
}

fn heuristic(graph: &GraphModel, from: NodeId, goal: &Node, weight: f64) -> f64 {
    if weight <= 0.0 {
        return 0.0;
    }
    graph
        .node(from)
        .map(|node| f64::from((node.floor_level - goal.floor_level).abs()) * weight)
        .unwrap_or(0.0)
}

type Parents = HashMap<NodeId, (NodeId, DirectedArc)>;

fn a_star(
    graph: &GraphModel,
    start: &Node,
    goal: &Node,
    options: &SearchOptions,
) -> Option<Parents> {
    let mut g_score: HashMap<NodeId, f64> = HashMap::new();
    let mut parents: Parents = HashMap::new();
    let mut queue = BinaryHeap::new();

    g_score.insert(start.id, 0.0);
    let start_estimate = heuristic(graph, start.id, goal, options.floor_weight);
    queue.push(AStarEntry::new(start.id, 0.0, start_estimate));

    while let Some(entry) = queue.pop() {
        let current_score = match g_score.get(&entry.node) {
            Some(score) if *score < entry.cost.0 => continue,
            Some(score) => *score,
            None => continue,
        };

        if entry.node == goal.id {
            return Some(parents);
        }

        for arc in graph.neighbours(entry.node) {
            if !options.allows(arc) {
                continue;
            }

            let tentative_g = current_score + arc.distance;
            if tentative_g < *g_score.get(&arc.to).unwrap_or(&f64::INFINITY) {
                g_score.insert(arc.to, tentative_g);
                parents.insert(arc.to, (entry.node, arc.clone()));
                let estimate = heuristic(graph, arc.to, goal, options.floor_weight);
                queue.push(AStarEntry::new(arc.to, tentative_g, estimate));
            }
        }
    }

    None
}

fn origin_step(node: &Node) -> PathStep {
    PathStep {
        node: node.clone(),
        distance: None,
        bearing: None,
        is_staircase: false,
        edge_id: None,
    }
}

fn reconstruct_path(
    graph: &GraphModel,
    parents: &Parents,
    start: &Node,
    goal: &Node,
    options: &SearchOptions,
) -> PathResult {
    let mut steps = Vec::new();
    let mut total_distance = 0.0;
    let mut current = goal.id;

    while current != start.id {
        let Some((previous, arc)) = parents.get(&current) else {
            break;
        };
        if let Some(node) = graph.node(current) {
            steps.push(PathStep {
                node: node.clone(),
                distance: Some(arc.distance),
                bearing: Some(arc.bearing),
                is_staircase: arc.is_staircase,
                edge_id: Some(arc.edge_id),
            });
        }
        total_distance += arc.distance;
        current = *previous;
    }
    steps.push(origin_step(start));
    steps.reverse();

    PathResult {
        steps,
        total_distance,
        avoid_stairs: options.avoid_stairs,
    }
}

#[derive(Copy, Clone, Debug, Default)]
struct FloatOrd(f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq(&other.0)
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct AStarEntry {
    node: NodeId,
    cost: FloatOrd,
    estimate: FloatOrd,
}

impl AStarEntry {
    fn new(node: NodeId, cost: f64, heuristic: f64) -> Self {
        Self {
            node,
            cost: FloatOrd(cost),
            estimate: FloatOrd(cost + heuristic),
        }
    }
}

impl Ord for AStarEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering so BinaryHeap becomes a min-heap; equal estimates
        // fall back to the lower node id so results are deterministic.
        other
            .estimate
            .cmp(&self.estimate)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for AStarEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
