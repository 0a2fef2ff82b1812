//! The per-robot context store.
//!
//! One record per `(fleet, name)` pair, merged additively from three
//! independent sources: telemetry folds, goal feedback, and the task
//! creation protocol. Records are never removed individually; the store
//! lives and dies with its owning context.

use crate::events::{ContextEvent, ContextEventBus};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use fms_types::telemetry::{RobotLocation, RobotStatus};
use fms_types::DynamicEventStatus;
use std::sync::Arc;

/// Namespaced store key for a robot.
pub fn robot_key(fleet: &str, name: &str) -> String {
    format!("{fleet}/{name}")
}

/// Everything the orchestrator knows about one robot.
#[derive(Debug, Clone)]
pub struct RobotRecord {
    pub name: String,
    pub fleet: String,
    pub location: Option<RobotLocation>,
    pub battery_percent: Option<f64>,
    pub general_status: Option<RobotStatus>,
    pub task_id: Option<String>,
    /// Sequence number assigned by the task system, scoping this task's
    /// dynamic events.
    pub dynamic_event_seq: Option<u64>,
    /// Identifier of the currently open dynamic event. Assigned
    /// asynchronously via goal feedback, so it may lag behind
    /// `dynamic_event_seq`.
    pub dynamic_event_id: Option<u64>,
    /// `None` means no dynamic event is open for this robot.
    pub dynamic_event_status: Option<DynamicEventStatus>,
    pub last_updated: DateTime<Utc>,
}

impl RobotRecord {
    fn new(name: &str, fleet: &str) -> Self {
        Self {
            name: name.to_string(),
            fleet: fleet.to_string(),
            location: None,
            battery_percent: None,
            general_status: None,
            task_id: None,
            dynamic_event_seq: None,
            dynamic_event_id: None,
            dynamic_event_status: None,
            last_updated: Utc::now(),
        }
    }

    /// Whether the robot currently has an open dynamic event.
    pub fn has_open_event(&self) -> bool {
        matches!(
            self.dynamic_event_status,
            Some(DynamicEventStatus::Standby | DynamicEventStatus::Underway)
        )
    }
}

/// A typed partial update. `None` fields leave the record untouched;
/// clearing the dynamic event fields goes through
/// [`RobotContextStore::clear_dynamic_event`] instead, so a merge can
/// never drop them by accident.
#[derive(Debug, Clone, Default)]
pub struct RobotUpdate {
    pub location: Option<RobotLocation>,
    pub battery_percent: Option<f64>,
    pub general_status: Option<RobotStatus>,
    pub task_id: Option<String>,
    pub dynamic_event_seq: Option<u64>,
    pub dynamic_event_id: Option<u64>,
    pub dynamic_event_status: Option<DynamicEventStatus>,
}

impl RobotUpdate {
    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_event_seq(mut self, seq: u64) -> Self {
        self.dynamic_event_seq = Some(seq);
        self
    }

    pub fn with_event_status(mut self, status: DynamicEventStatus) -> Self {
        self.dynamic_event_status = Some(status);
        self
    }
}

/// In-memory table of per-robot state, keyed by `"{fleet}/{name}"`.
pub struct RobotContextStore {
    robots: DashMap<String, RobotRecord>,
    bus: Arc<ContextEventBus>,
}

impl RobotContextStore {
    pub fn new(bus: Arc<ContextEventBus>) -> Self {
        Self {
            robots: DashMap::new(),
            bus,
        }
    }

    /// Merge a partial update into the record for `(fleet, name)`,
    /// creating it on first sight. Returns the record after the merge.
    pub async fn upsert(&self, name: &str, fleet: &str, update: RobotUpdate) -> RobotRecord {
        let key = robot_key(fleet, name);
        let mut emitted = Vec::new();

        let merged = {
            let mut entry = self.robots.entry(key).or_insert_with(|| {
                emitted.push(ContextEvent::RobotDiscovered {
                    fleet: fleet.to_string(),
                    robot: name.to_string(),
                });
                RobotRecord::new(name, fleet)
            });
            let record = entry.value_mut();

            if let Some(location) = update.location {
                record.location = Some(location);
            }
            if let Some(battery) = update.battery_percent {
                record.battery_percent = Some(battery);
            }
            if let Some(status) = update.general_status {
                if record.general_status != Some(status) {
                    emitted.push(ContextEvent::RobotModeChanged {
                        fleet: fleet.to_string(),
                        robot: name.to_string(),
                        status,
                    });
                }
                record.general_status = Some(status);
            }
            if let Some(task_id) = update.task_id {
                record.task_id = Some(task_id);
            }
            if let Some(seq) = update.dynamic_event_seq {
                record.dynamic_event_seq = Some(seq);
            }
            // Sticky: an update that omits the event id never clears the
            // one learned from earlier feedback.
            if let Some(id) = update.dynamic_event_id {
                record.dynamic_event_id = Some(id);
            }
            if let Some(status) = update.dynamic_event_status {
                if record.dynamic_event_status != Some(status) {
                    emitted.push(ContextEvent::RobotDynamicEventStatusChanged {
                        fleet: fleet.to_string(),
                        robot: name.to_string(),
                        status: Some(status),
                    });
                }
                record.dynamic_event_status = Some(status);
            }
            record.last_updated = Utc::now();
            record.clone()
        };

        // Publish outside the map guard so a slow subscriber cannot hold
        // the shard lock.
        for event in emitted {
            self.bus.publish(event).await;
        }

        merged
    }

    /// Look up one robot. `None` is "never seen", distinct from a record
    /// with no open event.
    pub fn get(&self, name: &str, fleet: &str) -> Option<RobotRecord> {
        self.robots
            .get(&robot_key(fleet, name))
            .map(|r| r.value().clone())
    }

    /// Recover which robot a feedback message belongs to when it carries
    /// only a sequence number. Linear scan; this is an edge-case path.
    pub fn find_by_event_seq(&self, seq: u64, fleet: Option<&str>) -> Option<RobotRecord> {
        self.robots
            .iter()
            .filter(|entry| fleet.map_or(true, |f| entry.value().fleet == f))
            .find(|entry| entry.value().dynamic_event_seq == Some(seq))
            .map(|entry| entry.value().clone())
    }

    /// All known robots.
    pub fn all(&self) -> Vec<RobotRecord> {
        self.robots.iter().map(|r| r.value().clone()).collect()
    }

    /// Explicitly close the robot's dynamic event: the only path that
    /// regresses `dynamic_event_id` and `dynamic_event_status`.
    pub async fn clear_dynamic_event(&self, name: &str, fleet: &str) {
        let key = robot_key(fleet, name);
        let mut changed = false;

        if let Some(mut entry) = self.robots.get_mut(&key) {
            let record = entry.value_mut();
            changed = record.dynamic_event_id.is_some() || record.dynamic_event_status.is_some();
            record.dynamic_event_id = None;
            record.dynamic_event_status = None;
            record.last_updated = Utc::now();
        }

        if changed {
            self.bus
                .publish(ContextEvent::RobotDynamicEventStatusChanged {
                    fleet: fleet.to_string(),
                    robot: name.to_string(),
                    status: None,
                })
                .await;
        }
    }

    pub fn len(&self) -> usize {
        self.robots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.robots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RobotContextStore {
        RobotContextStore::new(Arc::new(ContextEventBus::new(64)))
    }

    #[tokio::test]
    async fn get_unknown_robot_returns_none() {
        let store = store();
        assert!(store.get("r1", "f1").is_none());

        store.upsert("r1", "f1", RobotUpdate::default()).await;
        let record = store.get("r1", "f1").unwrap();
        assert_eq!(record.name, "r1");
        assert_eq!(record.fleet, "f1");
    }

    #[tokio::test]
    async fn dynamic_event_id_is_sticky_across_merges() {
        let store = store();
        store
            .upsert(
                "r1",
                "f1",
                RobotUpdate {
                    dynamic_event_id: Some(17),
                    ..Default::default()
                },
            )
            .await;

        // A later merge that omits the id must not drop it.
        let record = store
            .upsert(
                "r1",
                "f1",
                RobotUpdate {
                    battery_percent: Some(88.0),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(record.dynamic_event_id, Some(17));

        // The last non-absent value supplied wins.
        let record = store
            .upsert(
                "r1",
                "f1",
                RobotUpdate {
                    dynamic_event_id: Some(18),
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(record.dynamic_event_id, Some(18));

        let record = store.upsert("r1", "f1", RobotUpdate::default()).await;
        assert_eq!(record.dynamic_event_id, Some(18));
    }

    #[tokio::test]
    async fn clear_dynamic_event_is_the_only_regression_path() {
        let store = store();
        store
            .upsert(
                "r1",
                "f1",
                RobotUpdate {
                    dynamic_event_id: Some(5),
                    dynamic_event_status: Some(DynamicEventStatus::Underway),
                    ..Default::default()
                },
            )
            .await;

        store.clear_dynamic_event("r1", "f1").await;
        let record = store.get("r1", "f1").unwrap();
        assert!(record.dynamic_event_id.is_none());
        assert!(record.dynamic_event_status.is_none());
    }

    #[tokio::test]
    async fn find_by_event_seq_scopes_to_fleet() {
        let store = store();
        store
            .upsert("r1", "f1", RobotUpdate::default().with_event_seq(3))
            .await;
        store
            .upsert("r2", "f2", RobotUpdate::default().with_event_seq(3))
            .await;

        let found = store.find_by_event_seq(3, Some("f2")).unwrap();
        assert_eq!(found.name, "r2");
        assert!(store.find_by_event_seq(4, None).is_none());
    }

    #[tokio::test]
    async fn status_change_emits_notification() {
        let bus = Arc::new(ContextEventBus::new(64));
        let store = RobotContextStore::new(bus.clone());
        let (_id, mut rx) = bus.subscribe().await;

        store
            .upsert(
                "r1",
                "f1",
                RobotUpdate::default().with_event_status(DynamicEventStatus::Underway),
            )
            .await;

        let discovered = rx.recv().await.unwrap();
        assert!(matches!(discovered, ContextEvent::RobotDiscovered { .. }));
        let changed = rx.recv().await.unwrap();
        assert!(matches!(
            changed,
            ContextEvent::RobotDynamicEventStatusChanged {
                status: Some(DynamicEventStatus::Underway),
                ..
            }
        ));

        // Same status again: no further notification.
        store
            .upsert(
                "r1",
                "f1",
                RobotUpdate::default().with_event_status(DynamicEventStatus::Underway),
            )
            .await;
        assert!(rx.try_recv().is_err());
    }
}
