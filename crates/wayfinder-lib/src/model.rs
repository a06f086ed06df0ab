use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric identifier for a node.
pub type NodeId = i64;

/// Numeric identifier for an edge.
pub type EdgeId = i64;

/// Classification for a place in the building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Room,
    Hallway,
    Entrance,
    Staircase,
    Elevator,
    Landmark,
    Junction,
    Directory,
    Exit,
}

impl NodeKind {
    /// Parse a kind label as it appears in remote datasets.
    pub fn parse(raw: &str) -> Option<Self> {
        let kind = match raw.trim().to_ascii_lowercase().as_str() {
            "room" | "classroom" | "office" => NodeKind::Room,
            "hallway" | "corridor" => NodeKind::Hallway,
            "entrance" => NodeKind::Entrance,
            "staircase" | "stairs" | "stair" => NodeKind::Staircase,
            "elevator" | "lift" => NodeKind::Elevator,
            "landmark" => NodeKind::Landmark,
            "junction" | "intersection" => NodeKind::Junction,
            "directory" => NodeKind::Directory,
            "exit" => NodeKind::Exit,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            NodeKind::Room => "room",
            NodeKind::Hallway => "hallway",
            NodeKind::Entrance => "entrance",
            NodeKind::Staircase => "staircase",
            NodeKind::Elevator => "elevator",
            NodeKind::Landmark => "landmark",
            NodeKind::Junction => "junction",
            NodeKind::Directory => "directory",
            NodeKind::Exit => "exit",
        };
        f.write_str(value)
    }
}

/// Position on the floor-plan image, in percent of width/height (0–100).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapPosition {
    pub x: f64,
    pub y: f64,
}

impl MapPosition {
    /// Build a position, rejecting coordinates outside the 0–100 range.
    pub fn new(x: f64, y: f64) -> Option<Self> {
        let valid = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);
        if valid(x) && valid(y) {
            Some(Self { x, y })
        } else {
            None
        }
    }
}

/// A place in the building.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub code: String,
    pub name: String,
    pub building: String,
    pub floor_level: i32,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<MapPosition>,
    /// Remote reference to the node's panoramic image, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Node {
    pub fn has_image(&self) -> bool {
        self.image.as_deref().is_some_and(|url| !url.is_empty())
    }
}

/// Canonical undirected connection between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub from: NodeId,
    pub to: NodeId,
    /// Walking distance in metres.
    pub distance: f64,
    /// Compass bearing in degrees from `from` toward `to`.
    pub bearing: f64,
    pub is_staircase: bool,
    pub is_active: bool,
}

/// Rotate a bearing by 180° and normalize it into `[0, 360)`.
pub fn reverse_bearing(bearing: f64) -> f64 {
    normalize_bearing(bearing + 180.0)
}

/// Normalize any bearing into `[0, 360)`.
pub fn normalize_bearing(bearing: f64) -> f64 {
    let normalized = bearing.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs.
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}
