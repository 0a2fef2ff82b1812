//! Dynamic event goal channel messages.
//!
//! A dynamic event is a single navigation/action directive issued to a
//! robot mid-task over its per-robot command channel. The channel speaks
//! three goal kinds over the same message: a new request, a cancellation
//! of the currently open event, and an end of the dynamic-event phase.

use serde::{Deserialize, Serialize};

/// The kind of goal sent over the dynamic event channel.
///
/// Encoded on the wire as an integer: new request = 1, cancel = 2,
/// end = 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicEventType {
    NewRequest,
    Cancel,
    End,
}

impl From<DynamicEventType> for u8 {
    fn from(value: DynamicEventType) -> Self {
        match value {
            DynamicEventType::NewRequest => 1,
            DynamicEventType::Cancel => 2,
            DynamicEventType::End => 3,
        }
    }
}

impl TryFrom<u8> for DynamicEventType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::NewRequest),
            2 => Ok(Self::Cancel),
            3 => Ok(Self::End),
            other => Err(other),
        }
    }
}

impl Serialize for DynamicEventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*self))
    }
}

impl<'de> Deserialize<'de> for DynamicEventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        Self::try_from(raw)
            .map_err(|v| serde::de::Error::custom(format!("invalid dynamic event type: {v}")))
    }
}

/// A goal submitted on a robot's dynamic event channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicEventGoal {
    pub event_type: DynamicEventType,
    /// Activity category, e.g. `go_to_place` or `perform_action`.
    pub category: String,
    /// Opaque structured payload, JSON-encoded; interpreted by the
    /// robot-side controller.
    pub description: String,
    /// Sequence number scoping the owning task's dynamic events.
    pub dynamic_event_seq: u64,
    /// The open event to act on; required for cancellations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// How long the robot should keep retrying before giving up, in
    /// seconds. Zero means the controller's default.
    pub stubborn_period: f64,
}

/// Identifier of one specific open dynamic event.
///
/// Some transports deliver this as a wide integer, others as a decimal
/// string; consumers should normalize through [`EventId::as_u64`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventId {
    Integer(u64),
    Text(String),
}

impl EventId {
    /// Normalizes the identifier to a `u64`, parsing the string form.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// Execution status carried by dynamic event feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicEventStatus {
    Active,
    Standby,
    Underway,
    Completed,
}

/// One feedback message streamed while a goal is executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicEventFeedback {
    pub status: DynamicEventStatus,
    /// Identifier of the event this feedback belongs to. Assigned
    /// asynchronously by the robot-side controller; early feedback may
    /// not carry it yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<EventId>,
}

/// Terminal outcome of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalTerminalStatus {
    Succeeded,
    Canceled,
    Aborted,
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_type_encodes_as_integer() {
        let goal = DynamicEventGoal {
            event_type: DynamicEventType::Cancel,
            category: String::new(),
            description: "{}".to_string(),
            dynamic_event_seq: 7,
            id: Some(3),
            stubborn_period: 0.0,
        };
        let value = serde_json::to_value(&goal).unwrap();
        assert_eq!(value["event_type"], 2);
        assert_eq!(value["dynamic_event_seq"], 7);
    }

    #[test]
    fn event_type_rejects_unknown_values() {
        let result: Result<DynamicEventType, _> = serde_json::from_value(json!(9));
        assert!(result.is_err());
    }

    #[test]
    fn event_id_normalizes_both_wire_forms() {
        let numeric: EventId = serde_json::from_value(json!(42)).unwrap();
        let text: EventId = serde_json::from_value(json!("42")).unwrap();
        assert_eq!(numeric.as_u64(), Some(42));
        assert_eq!(text.as_u64(), Some(42));

        let garbage = EventId::Text("not-a-number".to_string());
        assert_eq!(garbage.as_u64(), None);
    }

    #[test]
    fn feedback_parses_without_id() {
        let feedback: DynamicEventFeedback =
            serde_json::from_value(json!({"status": "underway"})).unwrap();
        assert_eq!(feedback.status, DynamicEventStatus::Underway);
        assert!(feedback.id.is_none());
    }
}
