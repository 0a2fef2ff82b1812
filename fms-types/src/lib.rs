//! # Fleet-Management-System Wire Types
//!
//! This crate provides the Rust data structures exchanged with a
//! fleet-management service: task dispatch requests and responses, task
//! states, per-fleet telemetry (robot, door and lift states, building
//! maps), and the dynamic-event goal channel vocabulary. The types are
//! designed for serialization and deserialization with `serde` and follow
//! the JSON shapes the fleet manager publishes.
//!
//! The three concerns map to the three modules:
//! - the crate root: task API objects (dispatch, booking, state),
//! - [`telemetry`]: high-frequency state streams,
//! - [`dynamic_event`]: the per-robot goal channel messages.

use serde::{Deserialize, Serialize};

pub mod dynamic_event;
pub mod telemetry;

pub use dynamic_event::{
    DynamicEventFeedback, DynamicEventGoal, DynamicEventStatus, DynamicEventType, EventId,
    GoalTerminalStatus,
};
pub use telemetry::{
    BuildingMap, DoorMode, DoorState, DynamicEventBegin, FleetState, GraphNode, Level, LiftState,
    NavGraph, RobotLocation, RobotState, RobotStatus,
};

// ============================================================================
// Task Requests
// ============================================================================

/// A task request description submitted to the fleet manager.
///
/// The `description` payload is deliberately opaque (`serde_json::Value`):
/// its schema depends on the request category (`compose`, `patrol`,
/// `delivery`, ...) and is interpreted by the fleet manager, not by this
/// crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Request category, e.g. `compose`.
    pub category: String,
    /// Category-specific description payload.
    pub description: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unix_millis_earliest_start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unix_millis_request_time: Option<i64>,
    /// Entity that is requesting this task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester: Option<String>,
    /// Fleet the request is scoped to, for fleet-dispatch requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fleet_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

impl TaskRequest {
    /// Creates a `compose` category request around the given description.
    pub fn compose(description: serde_json::Value) -> Self {
        Self {
            category: "compose".to_string(),
            description,
            unix_millis_earliest_start_time: None,
            unix_millis_request_time: None,
            requester: None,
            fleet_name: None,
            priority: None,
            labels: Vec::new(),
        }
    }

    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = Some(requester.into());
        self
    }

    pub fn with_fleet_name(mut self, fleet: impl Into<String>) -> Self {
        self.fleet_name = Some(fleet.into());
        self
    }

    pub fn with_earliest_start_time(mut self, unix_millis: i64) -> Self {
        self.unix_millis_earliest_start_time = Some(unix_millis);
        self
    }
}

/// A task request targeted at one specific robot of one fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotTaskRequest {
    /// Always `robot_task_request`.
    #[serde(rename = "type")]
    pub request_type: String,
    pub robot: String,
    pub fleet: String,
    pub request: TaskRequest,
}

impl RobotTaskRequest {
    pub fn new(robot: impl Into<String>, fleet: impl Into<String>, request: TaskRequest) -> Self {
        Self {
            request_type: "robot_task_request".to_string(),
            robot: robot.into(),
            fleet: fleet.into(),
            request,
        }
    }
}

/// A task request left to the fleet manager's dispatcher to assign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchTaskRequest {
    /// Always `dispatch_task_request`.
    #[serde(rename = "type")]
    pub request_type: String,
    pub request: TaskRequest,
}

impl DispatchTaskRequest {
    pub fn new(request: TaskRequest) -> Self {
        Self {
            request_type: "dispatch_task_request".to_string(),
            request,
        }
    }
}

// ============================================================================
// Task Responses & State
// ============================================================================

/// Response envelope returned by the task dispatch endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDispatchResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiErrorDetail>,
}

/// One error entry in a failed API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Lifecycle status of a task as reported by the fleet manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Uninitialized,
    Blocked,
    Error,
    Failed,
    Queued,
    Standby,
    Underway,
    Delayed,
    Skipped,
    Canceled,
    Killed,
    Completed,
}

impl TaskStatus {
    /// Whether this status means the task will never reach `standby`.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Canceled | Self::Killed)
    }
}

/// Booking metadata assigned when the fleet manager accepts a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskBooking {
    /// The booking identifier; all further task operations are keyed on it.
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unix_millis_earliest_start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unix_millis_request_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

/// The fleet and robot a task has been assigned to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignedTo {
    /// Fleet name.
    pub group: String,
    /// Robot name.
    pub name: String,
}

/// Snapshot of a task's state, delivered both by the state endpoint and
/// over the per-task notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<TaskBooking>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<AssignedTo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unix_millis_start_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unix_millis_finish_time: Option<i64>,
    /// Phase breakdown, kept opaque; the orchestration core never reads it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phases: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<serde_json::Value>,
}

impl TaskState {
    /// The booking id, if the fleet manager has issued one.
    pub fn booking_id(&self) -> Option<&str> {
        self.booking.as_ref().map(|b| b.id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn robot_task_request_serializes_with_type_tag() {
        let request = RobotTaskRequest::new(
            "r1",
            "f1",
            TaskRequest::compose(json!({"phases": []})).with_requester("fleetkit"),
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["type"], "robot_task_request");
        assert_eq!(value["robot"], "r1");
        assert_eq!(value["fleet"], "f1");
        assert_eq!(value["request"]["category"], "compose");
        assert_eq!(value["request"]["requester"], "fleetkit");
    }

    #[test]
    fn task_state_parses_standby_payload() {
        let state: TaskState = serde_json::from_value(json!({
            "booking": {"id": "task_abc123"},
            "status": "standby",
            "assigned_to": {"group": "f1", "name": "r1"}
        }))
        .unwrap();

        assert_eq!(state.booking_id(), Some("task_abc123"));
        assert_eq!(state.status, Some(TaskStatus::Standby));
        assert_eq!(state.assigned_to.unwrap().name, "r1");
    }

    #[test]
    fn terminal_failure_statuses() {
        assert!(TaskStatus::Failed.is_terminal_failure());
        assert!(TaskStatus::Canceled.is_terminal_failure());
        assert!(TaskStatus::Killed.is_terminal_failure());
        assert!(!TaskStatus::Standby.is_terminal_failure());
        assert!(!TaskStatus::Underway.is_terminal_failure());
    }

    #[test]
    fn dispatch_response_collects_errors() {
        let response: TaskDispatchResponse = serde_json::from_value(json!({
            "success": false,
            "errors": [{"code": 42, "detail": "no fleet available"}]
        }))
        .unwrap();

        assert!(!response.success);
        assert!(response.state.is_none());
        assert_eq!(response.errors[0].detail.as_deref(), Some("no fleet available"));
    }
}
