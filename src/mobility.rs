//! Kinematic state of the drones: positions, velocities and the bounded integration
//! step the scenario applies on every mobility tick.
use slog::{Key, Record, Serializer, Value};
use std::num::ParseFloatError;
use std::str::FromStr;

/// The default update period for the mobility thread, in milliseconds
pub const DEFAULT_MOBILITY_PERIOD: u64 = 100;

///Struct to encapsule the 2D position of a node
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Default, Copy)]
pub struct Position {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
}

impl Position {
    /// Euclidean distance to another position
    pub fn distance(&self, other: &Position) -> f64 {
        (self.distance_squared(other)).sqrt()
    }

    /// Squared distance to another position. Used for range tests to avoid the square root.
    pub fn distance_squared(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

impl FromStr for Position {
    type Err = ParseFloatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = parse_pair(s)?;
        Ok(Position { x, y })
    }
}

impl Value for Position {
    fn serialize(&self, _rec: &Record, key: Key, serializer: &mut dyn Serializer) -> slog::Result {
        let val = format!("({},{})", self.x, self.y);
        serializer.emit_str(key, &val)
    }
}

///Struct to encapsule the velocity vector of a node, in units per second
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy, Default)]
pub struct Velocity {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
}

impl Velocity {
    /// Speed of the node
    pub fn magnitude(&self) -> f64 {
        (self.x.powi(2) + self.y.powi(2)).sqrt()
    }
}

impl Value for Velocity {
    fn serialize(&self, _rec: &Record, key: Key, serializer: &mut dyn Serializer) -> slog::Result {
        let val = format!("({},{})", self.x, self.y);
        serializer.emit_str(key, &val)
    }
}

/// Rectangular area the nodes are confined to
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone, Copy)]
pub struct Bounds {
    /// Left edge (minimum x)
    pub left: f64,
    /// Right edge (maximum x)
    pub right: f64,
    /// Bottom edge (minimum y)
    pub bottom: f64,
    /// Top edge (maximum y)
    pub top: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Bounds {
            left: 0.0,
            right: 550.0,
            bottom: 0.0,
            top: 550.0,
        }
    }
}

/// Moves a node by `vel * delta_secs`. When the new position crosses one of the bounds, the
/// velocity component on that axis is inverted and the position is clamped back inside the area.
pub fn update_location(pos: &mut Position, vel: &mut Velocity, delta_secs: f64, bounds: &Bounds) {
    pos.x += vel.x * delta_secs;
    pos.y += vel.y * delta_secs;

    if pos.x < bounds.left || pos.x > bounds.right {
        vel.x = -vel.x;
        pos.x = pos.x.max(bounds.left).min(bounds.right);
    }
    if pos.y < bounds.bottom || pos.y > bounds.top {
        vel.y = -vel.y;
        pos.y = pos.y.max(bounds.bottom).min(bounds.top);
    }
}

fn parse_pair(s: &str) -> Result<(f64, f64), ParseFloatError> {
    let coords: Vec<&str> = s
        .trim_matches(|p| p == '(' || p == ')' || p == '"')
        .split(',')
        .collect();

    let x = coords[0].trim().parse::<f64>()?;
    let y = coords.get(1).unwrap_or(&"").trim().parse::<f64>()?;
    Ok((x, y))
}
