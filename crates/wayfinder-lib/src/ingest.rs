//! Normalization of remote dataset payloads into canonical records.
//!
//! Remote sources are not consistent about shape: collections may arrive as a
//! bare array or wrapped under `data`/`nodes`/`edges`/`results`, numeric
//! columns may be serialized as decimal strings, and edge endpoints may be
//! raw ids or nested node objects. All of that is resolved here, once, so the
//! cache and the graph builder only ever see [`Node`] and [`Edge`].

use std::collections::HashSet;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{Edge, EdgeId, MapPosition, Node, NodeId, NodeKind};

const WRAPPER_KEYS: &[&str] = &["data", "results", "nodes", "edges", "items"];

#[derive(Debug, Deserialize)]
struct RawNode {
    #[serde(alias = "node_id", alias = "nodeId")]
    id: NodeId,
    #[serde(alias = "node_code", alias = "nodeCode")]
    code: String,
    name: String,
    #[serde(default, alias = "building_name", alias = "buildingName")]
    building: Option<String>,
    #[serde(default, alias = "floor", alias = "floorLevel")]
    floor_level: i32,
    #[serde(default, alias = "node_type", alias = "nodeType", alias = "type")]
    kind: Option<String>,
    #[serde(
        default,
        alias = "mapX",
        alias = "x_coordinate",
        deserialize_with = "lenient_f64"
    )]
    map_x: Option<f64>,
    #[serde(
        default,
        alias = "mapY",
        alias = "y_coordinate",
        deserialize_with = "lenient_f64"
    )]
    map_y: Option<f64>,
    #[serde(
        default,
        alias = "image360",
        alias = "image_360",
        alias = "image_url",
        alias = "imageUrl"
    )]
    image: Option<String>,
}

impl RawNode {
    fn into_node(self) -> Node {
        let kind = match self.kind.as_deref() {
            Some(raw) => NodeKind::parse(raw).unwrap_or_else(|| {
                debug!(code = %self.code, kind = raw, "unrecognized node kind, treating as room");
                NodeKind::Room
            }),
            None => NodeKind::Room,
        };

        let position = match (self.map_x, self.map_y) {
            (Some(x), Some(y)) => MapPosition::new(x, y),
            _ => None,
        };

        Node {
            id: self.id,
            code: self.code.trim().to_string(),
            name: self.name,
            building: self.building.unwrap_or_default(),
            floor_level: self.floor_level,
            kind,
            position,
            image: self.image.filter(|url| !url.trim().is_empty()),
        }
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number))
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn truthy(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Unwrap a collection payload into its records.
fn records(value: Value, kind: &'static str) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for key in WRAPPER_KEYS {
                if let Some(Value::Array(items)) = map.remove(*key) {
                    return Ok(items);
                }
            }
            Err(Error::InvalidRecord {
                kind,
                message: "expected an array or an object wrapping one".to_string(),
            })
        }
        other => Err(Error::InvalidRecord {
            kind,
            message: format!("expected an array, found {}", type_name(&other)),
        }),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parse a node collection payload.
///
/// Fails when a record is malformed or when ids or codes repeat, since the
/// graph indexes rely on both being unique.
pub fn parse_nodes(value: Value) -> Result<Vec<Node>> {
    let items = records(value, "node")?;
    let mut nodes = Vec::with_capacity(items.len());
    let mut ids = HashSet::new();
    let mut codes = HashSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let raw: RawNode = serde_json::from_value(item).map_err(|err| Error::InvalidRecord {
            kind: "node",
            message: format!("record {index}: {err}"),
        })?;
        let node = raw.into_node();

        if !ids.insert(node.id) {
            return Err(Error::InvalidRecord {
                kind: "node",
                message: format!("duplicate node id {}", node.id),
            });
        }
        if !codes.insert(node.code.clone()) {
            return Err(Error::InvalidRecord {
                kind: "node",
                message: format!("duplicate node code {}", node.code),
            });
        }
        nodes.push(node);
    }

    Ok(nodes)
}

/// Parse an edge collection payload.
pub fn parse_edges(value: Value) -> Result<Vec<Edge>> {
    let items = records(value, "edge")?;
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(map) => parse_edge(&map).map_err(|message| Error::InvalidRecord {
                kind: "edge",
                message: format!("record {index}: {message}"),
            }),
            other => Err(Error::InvalidRecord {
                kind: "edge",
                message: format!("record {index}: expected object, found {}", type_name(&other)),
            }),
        })
        .collect()
}

fn lookup<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find(|value| !value.is_null())
}

/// Resolve an endpoint that is either an id (number or numeric string) or a
/// nested node object carrying an `id`.
fn endpoint(value: &Value) -> Option<NodeId> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(node) => lookup(node, &["id", "node_id", "nodeId"]).and_then(endpoint),
        _ => None,
    }
}

fn parse_edge(map: &Map<String, Value>) -> std::result::Result<Edge, String> {
    let id: EdgeId = lookup(map, &["id", "edge_id", "edgeId"])
        .and_then(endpoint)
        .ok_or("missing edge id")?;

    let from = lookup(
        map,
        &["from_node_id", "fromNodeId", "from_node", "fromNode", "from", "source"],
    )
    .and_then(endpoint)
    .ok_or_else(|| format!("edge {id} has no resolvable from endpoint"))?;

    let to = lookup(
        map,
        &["to_node_id", "toNodeId", "to_node", "toNode", "to", "target"],
    )
    .and_then(endpoint)
    .ok_or_else(|| format!("edge {id} has no resolvable to endpoint"))?;

    let distance = lookup(map, &["distance", "distance_meters", "length"])
        .and_then(number)
        .ok_or_else(|| format!("edge {id} has no distance"))?;
    if !distance.is_finite() || distance <= 0.0 {
        return Err(format!("edge {id} has non-positive distance {distance}"));
    }

    let bearing = lookup(map, &["compass_angle", "compassAngle", "bearing", "angle"])
        .and_then(number)
        .unwrap_or(0.0);

    let is_staircase = lookup(map, &["is_staircase", "isStaircase", "staircase"])
        .and_then(truthy)
        .unwrap_or(false);
    let is_active = lookup(map, &["is_active", "isActive", "active"])
        .and_then(truthy)
        .unwrap_or(true);

    Ok(Edge {
        id,
        from,
        to,
        distance,
        bearing,
        is_staircase,
        is_active,
    })
}
