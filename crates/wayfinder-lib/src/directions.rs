//! Compass labels and human-readable turn lists for computed paths.

use std::fmt;

use serde::Serialize;

use crate::model::normalize_bearing;
use crate::path::{PathResult, PathStep};

/// One of the sixteen compass points.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CompassDirection {
    N,
    NNE,
    NE,
    ENE,
    E,
    ESE,
    SE,
    SSE,
    S,
    SSW,
    SW,
    WSW,
    W,
    WNW,
    NW,
    NNW,
}

const POINTS: [CompassDirection; 16] = [
    CompassDirection::N,
    CompassDirection::NNE,
    CompassDirection::NE,
    CompassDirection::ENE,
    CompassDirection::E,
    CompassDirection::ESE,
    CompassDirection::SE,
    CompassDirection::SSE,
    CompassDirection::S,
    CompassDirection::SSW,
    CompassDirection::SW,
    CompassDirection::WSW,
    CompassDirection::W,
    CompassDirection::WNW,
    CompassDirection::NW,
    CompassDirection::NNW,
];

const SECTOR: f64 = 22.5;

impl CompassDirection {
    /// Abbreviated label such as `NNE`.
    pub fn label(self) -> &'static str {
        match self {
            CompassDirection::N => "N",
            CompassDirection::NNE => "NNE",
            CompassDirection::NE => "NE",
            CompassDirection::ENE => "ENE",
            CompassDirection::E => "E",
            CompassDirection::ESE => "ESE",
            CompassDirection::SE => "SE",
            CompassDirection::SSE => "SSE",
            CompassDirection::S => "S",
            CompassDirection::SSW => "SSW",
            CompassDirection::SW => "SW",
            CompassDirection::WSW => "WSW",
            CompassDirection::W => "W",
            CompassDirection::WNW => "WNW",
            CompassDirection::NW => "NW",
            CompassDirection::NNW => "NNW",
        }
    }

    /// Spelled-out name such as `north-northeast`.
    pub fn name(self) -> &'static str {
        match self {
            CompassDirection::N => "north",
            CompassDirection::NNE => "north-northeast",
            CompassDirection::NE => "northeast",
            CompassDirection::ENE => "east-northeast",
            CompassDirection::E => "east",
            CompassDirection::ESE => "east-southeast",
            CompassDirection::SE => "southeast",
            CompassDirection::SSE => "south-southeast",
            CompassDirection::S => "south",
            CompassDirection::SSW => "south-southwest",
            CompassDirection::SW => "southwest",
            CompassDirection::WSW => "west-southwest",
            CompassDirection::W => "west",
            CompassDirection::WNW => "west-northwest",
            CompassDirection::NW => "northwest",
            CompassDirection::NNW => "north-northwest",
        }
    }
}

impl fmt::Display for CompassDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Map a bearing in degrees to its compass point.
///
/// Sectors are 22.5° wide and centred on each point, so `N` covers
/// `[348.75, 360)` and `[0, 11.25)`.
pub fn compass_to_direction(angle: f64) -> CompassDirection {
    let normalized = normalize_bearing(angle);
    let index = ((normalized + SECTOR / 2.0) / SECTOR).floor() as usize % POINTS.len();
    POINTS[index]
}

/// How a single instruction moves the walker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Movement {
    Walk,
    Stairs,
    Elevator,
}

/// One line of a turn list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instruction {
    pub from_code: String,
    pub to_code: String,
    pub movement: Movement,
    pub direction: CompassDirection,
    pub distance: f64,
    pub floor_change: i32,
    pub text: String,
}

/// Path plus its rendered turn list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Directions {
    pub path: PathResult,
    pub instructions: Vec<Instruction>,
}

impl Directions {
    pub fn from_path(path: PathResult) -> Self {
        let instructions = path
            .steps
            .windows(2)
            .map(|pair| instruction(&pair[0], &pair[1]))
            .collect();
        Self { path, instructions }
    }
}

fn instruction(previous: &PathStep, step: &PathStep) -> Instruction {
    let bearing = step.bearing.unwrap_or(0.0);
    let distance = step.distance.unwrap_or(0.0);
    let direction = compass_to_direction(bearing);
    let floor_change = step.node.floor_level - previous.node.floor_level;

    let movement = if step.is_staircase {
        Movement::Stairs
    } else if floor_change != 0 {
        Movement::Elevator
    } else {
        Movement::Walk
    };

    let target = &step.node.name;
    let text = match movement {
        Movement::Walk => format!(
            "Head {} for {:.0} m to {}",
            direction.name(),
            distance,
            target
        ),
        Movement::Stairs if floor_change == 0 => {
            format!("Take the stairs {} to {}", direction.name(), target)
        }
        Movement::Stairs => format!(
            "Take the stairs {} to {} (floor {})",
            vertical(floor_change),
            target,
            step.node.floor_level
        ),
        Movement::Elevator => format!(
            "Take the elevator {} to {} (floor {})",
            vertical(floor_change),
            target,
            step.node.floor_level
        ),
    };

    Instruction {
        from_code: previous.node.code.clone(),
        to_code: step.node.code.clone(),
        movement,
        direction,
        distance,
        floor_change,
        text,
    }
}

fn vertical(floor_change: i32) -> &'static str {
    if floor_change > 0 {
        "up"
    } else {
        "down"
    }
}
