//! The per-robot command channel seam.
//!
//! The navigation middleware's wire encoding is not this crate's
//! concern; the orchestration core only needs the operations below. A
//! transport implements [`CommandChannelFactory`] to mint one transient
//! client per goal — the client is owned by the goal submission scope
//! and its `Drop` is its destruction, so a client can never outlive the
//! goal it was created for.

use crate::errors::FleetResult;
use async_trait::async_trait;
use fms_types::{DynamicEventFeedback, DynamicEventGoal, GoalTerminalStatus};
use futures_core::Stream;
use std::pin::Pin;
use std::time::Duration;

/// One protocol event observed while a goal is in flight.
#[derive(Debug, Clone)]
pub enum GoalEvent {
    /// The robot-side controller accepted the goal.
    Accepted,
    /// The controller refused the goal; no feedback or result follows.
    Rejected,
    /// Progress feedback for the accepted goal.
    Feedback(DynamicEventFeedback),
    /// The terminal result; always the last event of the stream.
    Completed(GoalTerminalStatus),
}

/// The ordered stream of events for one goal submission.
pub type GoalEventStream = Pin<Box<dyn Stream<Item = GoalEvent> + Send>>;

/// A transient client bound to one robot's command channel address.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Whether a command endpoint is reachable at this address, giving
    /// up after `timeout`.
    async fn endpoint_ready(&self, timeout: Duration) -> bool;

    /// Send a goal and observe its lifecycle. The returned stream
    /// yields accept/reject, then zero or more feedback messages, then
    /// exactly one terminal result.
    async fn send_goal(&self, goal: DynamicEventGoal) -> FleetResult<GoalEventStream>;
}

/// Mints command-channel clients, one per `(fleet, robot)` address.
pub trait CommandChannelFactory: Send + Sync {
    fn connect(&self, fleet: &str, robot: &str) -> FleetResult<Box<dyn CommandChannel>>;
}
