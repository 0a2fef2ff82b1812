//! Throttled telemetry ingestion.
//!
//! Every message is captured into the latest-wins cache unconditionally;
//! a per-stream throttle then decides when the cached state is folded
//! into the robot context store and the exposed door/lift/location
//! stores. Bursty input therefore costs one cache write per message but
//! at most one fold per interval, and the next fold always sees the
//! freshest state.

use crate::config::ThrottleConfig;
use crate::events::{ContextEvent, ContextEventBus};
use crate::store::{RobotContextStore, RobotUpdate, TelemetryCache};
use fms_types::telemetry::{BuildingMap, DoorState, DynamicEventBegin, FleetState, LiftState};
use fms_types::DynamicEventStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// The telemetry streams subject to throttled folding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    FleetState,
    DoorState,
    LiftState,
    BuildingMap,
}

/// Per-stream throttle record.
struct Throttle {
    interval: Duration,
    last_processed: Mutex<Option<Instant>>,
}

impl Throttle {
    fn new(interval_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            last_processed: Mutex::new(None),
        }
    }

    /// Whether enough time has elapsed for another fold; stamps the
    /// throttle when it has.
    async fn should_fold(&self) -> bool {
        let mut last = self.last_processed.lock().await;
        let now = Instant::now();
        match *last {
            Some(at) if now.duration_since(at) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    async fn reset(&self) {
        *self.last_processed.lock().await = Some(Instant::now());
    }
}

/// Folds telemetry streams into the shared stores.
pub struct IngestionEngine {
    store: Arc<RobotContextStore>,
    cache: Arc<TelemetryCache>,
    bus: Arc<ContextEventBus>,
    fleet_throttle: Throttle,
    door_throttle: Throttle,
    lift_throttle: Throttle,
    map_throttle: Throttle,
}

impl IngestionEngine {
    pub fn new(
        store: Arc<RobotContextStore>,
        cache: Arc<TelemetryCache>,
        bus: Arc<ContextEventBus>,
        throttle: &ThrottleConfig,
    ) -> Self {
        Self {
            store,
            cache,
            bus,
            fleet_throttle: Throttle::new(throttle.fleet_state_ms),
            door_throttle: Throttle::new(throttle.door_state_ms),
            lift_throttle: Throttle::new(throttle.lift_state_ms),
            map_throttle: Throttle::new(throttle.building_map_ms),
        }
    }

    // ------------------------------------------------------------------
    // Message entry points
    // ------------------------------------------------------------------

    pub async fn ingest_fleet_state(&self, state: FleetState) {
        self.cache.capture_fleet_state(state);
        if self.fleet_throttle.should_fold().await {
            self.fold_fleet_states().await;
        }
    }

    pub async fn ingest_door_state(&self, state: DoorState) {
        self.cache.capture_door_state(state);
        if self.door_throttle.should_fold().await {
            self.fold_door_states().await;
        }
    }

    pub async fn ingest_lift_state(&self, state: LiftState) {
        self.cache.capture_lift_state(state);
        if self.lift_throttle.should_fold().await {
            self.fold_lift_states().await;
        }
    }

    pub async fn ingest_building_map(&self, map: BuildingMap) {
        self.cache.capture_building_map(map).await;
        if self.map_throttle.should_fold().await {
            self.fold_building_map().await;
        }
    }

    /// Dynamic-event-begin notices are low-frequency and time-critical,
    /// so they bypass throttling and apply immediately. A notice for an
    /// unseen robot inserts its record.
    pub async fn ingest_event_begin(&self, notice: DynamicEventBegin) {
        tracing::debug!(
            "Dynamic event phase began for {}/{} (seq {})",
            notice.fleet,
            notice.robot,
            notice.dynamic_event_seq
        );

        let mut update = RobotUpdate::default()
            .with_event_seq(notice.dynamic_event_seq)
            .with_event_status(DynamicEventStatus::Standby);
        if let Some(task_id) = notice.task_id {
            update = update.with_task_id(task_id);
        }
        self.store.upsert(&notice.robot, &notice.fleet, update).await;
    }

    /// Fold every cache immediately, regardless of elapsed time.
    pub async fn force_flush(&self) {
        self.fold_fleet_states().await;
        self.fold_door_states().await;
        self.fold_lift_states().await;
        self.fold_building_map().await;
        self.fleet_throttle.reset().await;
        self.door_throttle.reset().await;
        self.lift_throttle.reset().await;
        self.map_throttle.reset().await;
    }

    // ------------------------------------------------------------------
    // Fold passes
    // ------------------------------------------------------------------

    async fn fold_fleet_states(&self) {
        for fleet in self.cache.cached_fleet_states() {
            for (robot_name, robot) in &fleet.robots {
                // The fleet-state stream knows nothing about dynamic
                // events; the merge leaves those fields alone.
                let update = RobotUpdate {
                    location: robot.location.clone(),
                    battery_percent: robot.battery.map(|b| b * 100.0),
                    general_status: robot.status,
                    task_id: robot.task_id.clone().filter(|id| !id.is_empty()),
                    ..Default::default()
                };
                self.store.upsert(robot_name, &fleet.name, update).await;
            }
        }

        self.bus
            .publish(ContextEvent::DataUpdated {
                stream: StreamKind::FleetState,
            })
            .await;
    }

    async fn fold_door_states(&self) {
        self.cache.fold_door_states();
        self.bus
            .publish(ContextEvent::DataUpdated {
                stream: StreamKind::DoorState,
            })
            .await;
    }

    async fn fold_lift_states(&self) {
        self.cache.fold_lift_states();
        self.bus
            .publish(ContextEvent::DataUpdated {
                stream: StreamKind::LiftState,
            })
            .await;
    }

    async fn fold_building_map(&self) {
        self.cache.fold_locations().await;
        self.bus
            .publish(ContextEvent::DataUpdated {
                stream: StreamKind::BuildingMap,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fms_types::telemetry::{DoorMode, RobotState, RobotStatus};
    use std::collections::HashMap;

    fn engine_with(throttle: ThrottleConfig) -> (IngestionEngine, Arc<RobotContextStore>) {
        let bus = Arc::new(ContextEventBus::new(256));
        let store = Arc::new(RobotContextStore::new(bus.clone()));
        let cache = Arc::new(TelemetryCache::new());
        let engine = IngestionEngine::new(store.clone(), cache, bus, &throttle);
        (engine, store)
    }

    fn door(name: &str, mode: u32) -> DoorState {
        DoorState {
            door_name: name.to_string(),
            current_mode: DoorMode { value: mode },
            door_time: None,
        }
    }

    fn fleet_state(fleet: &str, robot: &str, battery: f64) -> FleetState {
        let mut robots = HashMap::new();
        robots.insert(
            robot.to_string(),
            RobotState {
                name: Some(robot.to_string()),
                status: Some(RobotStatus::Idle),
                task_id: None,
                unix_millis_time: None,
                battery: Some(battery),
                location: None,
            },
        );
        FleetState {
            name: fleet.to_string(),
            robots,
        }
    }

    #[tokio::test]
    async fn burst_within_interval_keeps_only_last_mode() {
        // A long interval so only the first message folds on its own.
        let (engine, _store) = engine_with(ThrottleConfig {
            door_state_ms: 60_000,
            ..Default::default()
        });

        for mode in [
            DoorMode::CLOSED,
            DoorMode::MOVING,
            DoorMode::OPEN,
            DoorMode::MOVING,
            DoorMode::OFFLINE,
        ] {
            engine.ingest_door_state(door("D1", mode)).await;
        }

        engine.force_flush().await;
        let folded = engine.cache.door_state("D1").unwrap();
        assert_eq!(folded.current_mode.value, DoorMode::OFFLINE);
    }

    #[tokio::test]
    async fn fleet_fold_preserves_dynamic_event_fields() {
        let (engine, store) = engine_with(ThrottleConfig::default());

        store
            .upsert(
                "r1",
                "f1",
                RobotUpdate {
                    dynamic_event_seq: Some(4),
                    dynamic_event_id: Some(9),
                    dynamic_event_status: Some(DynamicEventStatus::Underway),
                    ..Default::default()
                },
            )
            .await;

        engine.ingest_fleet_state(fleet_state("f1", "r1", 0.5)).await;
        engine.force_flush().await;

        let record = store.get("r1", "f1").unwrap();
        assert_eq!(record.battery_percent, Some(50.0));
        assert_eq!(record.dynamic_event_seq, Some(4));
        assert_eq!(record.dynamic_event_id, Some(9));
        assert_eq!(
            record.dynamic_event_status,
            Some(DynamicEventStatus::Underway)
        );
    }

    #[tokio::test]
    async fn folding_twice_is_idempotent() {
        let (engine, store) = engine_with(ThrottleConfig::default());
        engine.ingest_fleet_state(fleet_state("f1", "r1", 0.8)).await;

        engine.force_flush().await;
        let first = store.get("r1", "f1").unwrap();
        engine.force_flush().await;
        let second = store.get("r1", "f1").unwrap();

        assert_eq!(first.battery_percent, second.battery_percent);
        assert_eq!(first.general_status, second.general_status);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn event_begin_inserts_unseen_robot() {
        let (engine, store) = engine_with(ThrottleConfig::default());

        engine
            .ingest_event_begin(DynamicEventBegin {
                fleet: "f1".to_string(),
                robot: "r9".to_string(),
                dynamic_event_seq: 12,
                task_id: Some("task_1".to_string()),
                description: None,
            })
            .await;

        let record = store.get("r9", "f1").unwrap();
        assert_eq!(record.dynamic_event_seq, Some(12));
        assert_eq!(record.task_id.as_deref(), Some("task_1"));
        assert_eq!(
            record.dynamic_event_status,
            Some(DynamicEventStatus::Standby)
        );
    }
}
