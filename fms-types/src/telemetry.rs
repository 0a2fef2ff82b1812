//! Telemetry stream messages published by the fleet manager.
//!
//! These are the high-frequency state topics the orchestration core
//! subscribes to: fleet states (one message per fleet, carrying every
//! robot of that fleet), door and lift states (one message per entity),
//! the building map singleton, and dynamic-event-begin notices.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Fleet & Robot State
// ============================================================================

/// Operational status of a robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotStatus {
    Uninitialized,
    Offline,
    Shutdown,
    Idle,
    Charging,
    Working,
    Error,
}

/// A robot pose on a named map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotLocation {
    pub map: String,
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

/// State of one robot, as embedded in a [`FleetState`] message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RobotStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unix_millis_time: Option<i64>,
    /// Battery state of charge as a fraction in `[0, 1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<RobotLocation>,
}

/// State of one fleet: its name plus the latest state of each robot,
/// keyed by robot name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetState {
    pub name: String,
    #[serde(default)]
    pub robots: HashMap<String, RobotState>,
}

// ============================================================================
// Doors & Lifts
// ============================================================================

/// Door mode as a raw mode value, matching the wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorMode {
    pub value: u32,
}

impl DoorMode {
    pub const CLOSED: u32 = 0;
    pub const MOVING: u32 = 1;
    pub const OPEN: u32 = 2;
    pub const OFFLINE: u32 = 3;
    pub const UNKNOWN: u32 = 4;
}

/// State of one door.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoorState {
    pub door_name: String,
    pub current_mode: DoorMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub door_time: Option<i64>,
}

/// State of one lift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiftState {
    pub lift_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_floor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_floor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub door_state: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion_state: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub available_floors: Vec<String>,
}

// ============================================================================
// Building Map
// ============================================================================

/// One vertex of a navigation graph. Vertices without a name are
/// waypoints the planner uses internally; only named vertices are
/// meaningful destinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub name: String,
}

/// A navigation graph of one level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavGraph {
    pub name: String,
    #[serde(default)]
    pub vertices: Vec<GraphNode>,
}

/// One level of the building.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Level {
    pub name: String,
    #[serde(default)]
    pub elevation: f64,
    #[serde(default)]
    pub nav_graphs: Vec<NavGraph>,
}

/// The building map singleton: levels, each with its navigation graphs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingMap {
    pub name: String,
    #[serde(default)]
    pub levels: Vec<Level>,
}

// ============================================================================
// Dynamic Event Begin Notices
// ============================================================================

/// Notice that a dynamic event phase has begun for a robot. Published
/// once per task reaching its dynamic-event phase, so unlike the state
/// streams above it is not subject to throttling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicEventBegin {
    pub fleet: String,
    pub robot: String,
    /// Sequence number scoping this task's dynamic events.
    pub dynamic_event_seq: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fleet_state_parses_robots_map() {
        let state: FleetState = serde_json::from_value(json!({
            "name": "tinyRobot",
            "robots": {
                "tinyRobot1": {
                    "status": "idle",
                    "battery": 0.95,
                    "location": {"map": "L1", "x": 10.2, "y": -3.1, "yaw": 1.57}
                }
            }
        }))
        .unwrap();

        let robot = &state.robots["tinyRobot1"];
        assert_eq!(robot.status, Some(RobotStatus::Idle));
        assert_eq!(robot.battery, Some(0.95));
        assert_eq!(robot.location.as_ref().unwrap().map, "L1");
    }

    #[test]
    fn door_state_round_trips_mode_value() {
        let state: DoorState = serde_json::from_value(json!({
            "door_name": "coe_door",
            "current_mode": {"value": 2}
        }))
        .unwrap();
        assert_eq!(state.current_mode.value, DoorMode::OPEN);
    }

    #[test]
    fn building_map_defaults_missing_collections() {
        let map: BuildingMap = serde_json::from_value(json!({
            "name": "office",
            "levels": [{"name": "L1"}]
        }))
        .unwrap();
        assert!(map.levels[0].nav_graphs.is_empty());
    }
}
