//! Latest-message-wins telemetry caches and the folded stores exposed
//! to callers.
//!
//! The capture maps are written unconditionally on every message
//! arrival; the throttle in the ingestion engine only decides *when*
//! their contents are folded into the exposed stores, never *whether*
//! the newest value is retained.

use dashmap::DashMap;
use fms_types::telemetry::{BuildingMap, DoorState, FleetState, LiftState};
use tokio::sync::RwLock;

/// A named destination extracted from the building map.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedWaypoint {
    pub name: String,
    pub level: String,
    pub x: f64,
    pub y: f64,
}

/// Capture maps plus folded stores for every telemetry stream.
#[derive(Default)]
pub struct TelemetryCache {
    // Capture side: overwritten on every arrival.
    fleet_states: DashMap<String, FleetState>,
    doors: DashMap<String, DoorState>,
    lifts: DashMap<String, LiftState>,
    building_map: RwLock<Option<BuildingMap>>,

    // Folded side: refreshed by throttle ticks.
    door_states: DashMap<String, DoorState>,
    lift_states: DashMap<String, LiftState>,
    locations: RwLock<Vec<NamedWaypoint>>,
}

impl TelemetryCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Capture (unconditional, latest wins)
    // ------------------------------------------------------------------

    pub fn capture_fleet_state(&self, state: FleetState) {
        self.fleet_states.insert(state.name.clone(), state);
    }

    pub fn capture_door_state(&self, state: DoorState) {
        self.doors.insert(state.door_name.clone(), state);
    }

    pub fn capture_lift_state(&self, state: LiftState) {
        self.lifts.insert(state.lift_name.clone(), state);
    }

    pub async fn capture_building_map(&self, map: BuildingMap) {
        *self.building_map.write().await = Some(map);
    }

    // ------------------------------------------------------------------
    // Capture-side accessors, used by the fold pass
    // ------------------------------------------------------------------

    pub fn cached_fleet_states(&self) -> Vec<FleetState> {
        self.fleet_states.iter().map(|e| e.value().clone()).collect()
    }

    pub fn cached_door_states(&self) -> Vec<DoorState> {
        self.doors.iter().map(|e| e.value().clone()).collect()
    }

    pub fn cached_lift_states(&self) -> Vec<LiftState> {
        self.lifts.iter().map(|e| e.value().clone()).collect()
    }

    pub async fn cached_building_map(&self) -> Option<BuildingMap> {
        self.building_map.read().await.clone()
    }

    // ------------------------------------------------------------------
    // Folded stores
    // ------------------------------------------------------------------

    pub fn fold_door_states(&self) {
        for entry in self.doors.iter() {
            self.door_states
                .insert(entry.key().clone(), entry.value().clone());
        }
    }

    pub fn fold_lift_states(&self) {
        for entry in self.lifts.iter() {
            self.lift_states
                .insert(entry.key().clone(), entry.value().clone());
        }
    }

    pub async fn fold_locations(&self) {
        let Some(map) = self.cached_building_map().await else {
            return;
        };

        let mut waypoints = Vec::new();
        for level in &map.levels {
            for graph in &level.nav_graphs {
                for vertex in &graph.vertices {
                    if vertex.name.is_empty() {
                        continue;
                    }
                    waypoints.push(NamedWaypoint {
                        name: vertex.name.clone(),
                        level: level.name.clone(),
                        x: vertex.x,
                        y: vertex.y,
                    });
                }
            }
        }

        *self.locations.write().await = waypoints;
    }

    pub fn door_state(&self, door_name: &str) -> Option<DoorState> {
        self.door_states.get(door_name).map(|e| e.value().clone())
    }

    pub fn door_states(&self) -> Vec<DoorState> {
        self.door_states.iter().map(|e| e.value().clone()).collect()
    }

    pub fn lift_state(&self, lift_name: &str) -> Option<LiftState> {
        self.lift_states.get(lift_name).map(|e| e.value().clone())
    }

    pub fn lift_states(&self) -> Vec<LiftState> {
        self.lift_states.iter().map(|e| e.value().clone()).collect()
    }

    pub async fn locations(&self) -> Vec<NamedWaypoint> {
        self.locations.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fms_types::telemetry::{DoorMode, GraphNode, Level, NavGraph};

    fn door(name: &str, mode: u32) -> DoorState {
        DoorState {
            door_name: name.to_string(),
            current_mode: DoorMode { value: mode },
            door_time: None,
        }
    }

    #[test]
    fn capture_overwrites_per_key() {
        let cache = TelemetryCache::new();
        cache.capture_door_state(door("D1", DoorMode::CLOSED));
        cache.capture_door_state(door("D1", DoorMode::OPEN));
        cache.capture_door_state(door("D2", DoorMode::MOVING));

        let cached = cache.cached_door_states();
        assert_eq!(cached.len(), 2);
        let d1 = cached.iter().find(|d| d.door_name == "D1").unwrap();
        assert_eq!(d1.current_mode.value, DoorMode::OPEN);
    }

    #[test]
    fn fold_is_idempotent() {
        let cache = TelemetryCache::new();
        cache.capture_door_state(door("D1", DoorMode::OPEN));

        cache.fold_door_states();
        let first = cache.door_state("D1").unwrap();
        cache.fold_door_states();
        let second = cache.door_state("D1").unwrap();
        assert_eq!(first.current_mode, second.current_mode);
        assert_eq!(cache.door_states().len(), 1);
    }

    #[tokio::test]
    async fn locations_drop_unnamed_vertices() {
        let cache = TelemetryCache::new();
        cache
            .capture_building_map(BuildingMap {
                name: "office".to_string(),
                levels: vec![Level {
                    name: "L1".to_string(),
                    elevation: 0.0,
                    nav_graphs: vec![NavGraph {
                        name: "0".to_string(),
                        vertices: vec![
                            GraphNode {
                                x: 1.0,
                                y: 2.0,
                                name: "pantry".to_string(),
                            },
                            GraphNode {
                                x: 3.0,
                                y: 4.0,
                                name: String::new(),
                            },
                        ],
                    }],
                }],
            })
            .await;

        cache.fold_locations().await;
        let locations = cache.locations().await;
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].name, "pantry");
        assert_eq!(locations[0].level, "L1");
    }
}
