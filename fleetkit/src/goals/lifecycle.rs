//! The goal submission lifecycle.
//!
//! One transient command-channel client is created per goal and owned by
//! the submission scope; Rust's ownership guarantees the client is
//! destroyed on every exit path, including errors. Feedback is delivered
//! over a channel and opportunistically merged into the robot context
//! store as it arrives.

use crate::command::{CommandChannelFactory, GoalEvent};
use crate::errors::{FleetError, FleetResult};
use crate::goals::end_guard::EndEventGuard;
use crate::store::{robot_key, RobotContextStore, RobotRecord, RobotUpdate};
use dashmap::DashSet;
use fms_types::{
    DynamicEventFeedback, DynamicEventGoal, DynamicEventType, EventId, GoalTerminalStatus,
};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Parameters of one dynamic event goal submission.
#[derive(Debug, Clone)]
pub struct GoalSubmission {
    pub robot: String,
    pub fleet: String,
    pub event_type: DynamicEventType,
    /// Activity category, e.g. `go_to_place`.
    pub category: String,
    /// Opaque structured payload forwarded to the robot-side controller.
    pub description: serde_json::Value,
    /// Caller-supplied sequence number; the store's value, when present,
    /// takes precedence over this.
    pub sequence: Option<u64>,
    /// The open event to act on; set for cancellations.
    pub target_id: Option<u64>,
    pub stubborn_period: f64,
}

impl GoalSubmission {
    /// A new-request goal for the given activity.
    pub fn new_request(
        robot: impl Into<String>,
        fleet: impl Into<String>,
        category: impl Into<String>,
        description: serde_json::Value,
    ) -> Self {
        Self {
            robot: robot.into(),
            fleet: fleet.into(),
            event_type: DynamicEventType::NewRequest,
            category: category.into(),
            description,
            sequence: None,
            target_id: None,
            stubborn_period: 0.0,
        }
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    pub fn with_stubborn_period(mut self, seconds: f64) -> Self {
        self.stubborn_period = seconds;
        self
    }
}

/// Successful terminal outcome of a goal.
#[derive(Debug, Clone)]
pub struct GoalCompletion {
    pub status: GoalTerminalStatus,
    /// The event id last reported by feedback, if any was.
    pub dynamic_event_id: Option<u64>,
}

/// The two control goals sent over the same channel as new requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Cancel,
    End,
}

/// The robot fields a control goal needs; usually taken from a
/// [`RobotRecord`] read just before the call.
#[derive(Debug, Clone)]
pub struct RobotSnapshot {
    pub name: String,
    pub fleet: String,
    pub dynamic_event_seq: Option<u64>,
    pub dynamic_event_id: Option<u64>,
}

impl From<&RobotRecord> for RobotSnapshot {
    fn from(record: &RobotRecord) -> Self {
        Self {
            name: record.name.clone(),
            fleet: record.fleet.clone(),
            dynamic_event_seq: record.dynamic_event_seq,
            dynamic_event_id: record.dynamic_event_id,
        }
    }
}

/// Executes the send/await-accept/stream-feedback/await-result protocol
/// for dynamic event goals.
pub struct GoalLifecycleManager {
    factory: Arc<dyn CommandChannelFactory>,
    store: Arc<RobotContextStore>,
    end_guard: Arc<EndEventGuard>,
    /// Robots with a cancel issued by this orchestrator whose victim
    /// goal has not yet reached a terminal state.
    pending_cancels: Arc<DashSet<String>>,
    endpoint_timeout: Duration,
}

impl GoalLifecycleManager {
    pub fn new(
        factory: Arc<dyn CommandChannelFactory>,
        store: Arc<RobotContextStore>,
        end_guard: Arc<EndEventGuard>,
        pending_cancels: Arc<DashSet<String>>,
        endpoint_timeout: Duration,
    ) -> Self {
        Self {
            factory,
            store,
            end_guard,
            pending_cancels,
            endpoint_timeout,
        }
    }

    /// Submit one goal and drive it to its terminal state.
    ///
    /// Feedback messages are forwarded into `feedback` (when given) and
    /// merged into the robot context store as they arrive.
    pub async fn submit_goal(
        &self,
        submission: GoalSubmission,
        feedback: Option<mpsc::Sender<DynamicEventFeedback>>,
    ) -> FleetResult<GoalCompletion> {
        if submission.robot.is_empty() {
            return Err(FleetError::Validation {
                field: "robot".to_string(),
                reason: "robot name must not be empty".to_string(),
            });
        }
        if submission.fleet.is_empty() {
            return Err(FleetError::Validation {
                field: "fleet".to_string(),
                reason: "fleet name must not be empty".to_string(),
            });
        }

        // One client per goal; owning it here means it is destroyed on
        // every exit path below.
        let client = self.factory.connect(&submission.fleet, &submission.robot)?;

        if !client.endpoint_ready(self.endpoint_timeout).await {
            return Err(FleetError::EndpointUnavailable {
                fleet: submission.fleet,
                robot: submission.robot,
            });
        }

        // The store's sequence number is authoritative over whatever the
        // caller passed in; a stale caller value must not supersede it.
        let sequence = self
            .store
            .get(&submission.robot, &submission.fleet)
            .and_then(|record| record.dynamic_event_seq)
            .or(submission.sequence)
            .unwrap_or(0);

        let goal = DynamicEventGoal {
            event_type: submission.event_type,
            category: submission.category.clone(),
            description: submission.description.to_string(),
            dynamic_event_seq: sequence,
            id: submission.target_id,
            stubborn_period: submission.stubborn_period,
        };

        tracing::debug!(
            "Sending goal (type {:?}, seq {}) to {}/{}",
            submission.event_type,
            sequence,
            submission.fleet,
            submission.robot
        );

        let mut stream = client.send_goal(goal).await?;
        let mut last_event_id = None;

        while let Some(event) = stream.next().await {
            match event {
                GoalEvent::Accepted => {
                    tracing::debug!(
                        "Goal accepted by {}/{}",
                        submission.fleet,
                        submission.robot
                    );
                }
                GoalEvent::Rejected => {
                    return Err(FleetError::GoalRejected {
                        fleet: submission.fleet,
                        robot: submission.robot,
                    });
                }
                GoalEvent::Feedback(message) => {
                    // Wire ids may arrive as wide integers or strings;
                    // normalize before the merge.
                    let id = message.id.as_ref().and_then(EventId::as_u64);
                    if id.is_some() {
                        last_event_id = id;
                    }
                    self.store
                        .upsert(
                            &submission.robot,
                            &submission.fleet,
                            RobotUpdate {
                                dynamic_event_status: Some(message.status),
                                dynamic_event_id: id,
                                ..Default::default()
                            },
                        )
                        .await;

                    if let Some(sender) = &feedback {
                        if sender.try_send(message).is_err() {
                            tracing::warn!(
                                "Feedback channel for {}/{} full or closed; dropping message",
                                submission.fleet,
                                submission.robot
                            );
                        }
                    }
                }
                GoalEvent::Completed(status) => {
                    return self.map_terminal(&submission, status, last_event_id);
                }
            }
        }

        Err(FleetError::Protocol {
            reason: format!(
                "goal stream for {}/{} ended without a terminal result",
                submission.fleet, submission.robot
            ),
        })
    }

    /// Map a terminal status onto the submission outcome.
    ///
    /// An aborted goal counts as success only when this orchestrator
    /// itself issued a cancel for the robot. That causality is inferred
    /// from local state, not signalled by the remote side; it is an
    /// approximation carried over from the deployed behavior.
    fn map_terminal(
        &self,
        submission: &GoalSubmission,
        status: GoalTerminalStatus,
        last_event_id: Option<u64>,
    ) -> FleetResult<GoalCompletion> {
        let key = robot_key(&submission.fleet, &submission.robot);
        let canceled_by_us = if submission.event_type == DynamicEventType::NewRequest {
            // Any terminal of the victim goal consumes the mark, so a
            // stale mark cannot excuse an unrelated abort later.
            self.pending_cancels.remove(&key).is_some()
        } else {
            false
        };

        match status {
            GoalTerminalStatus::Succeeded => Ok(GoalCompletion {
                status,
                dynamic_event_id: last_event_id,
            }),
            // A cancellation landing through the channel is an expected,
            // non-error termination.
            GoalTerminalStatus::Canceled => Ok(GoalCompletion {
                status,
                dynamic_event_id: last_event_id,
            }),
            GoalTerminalStatus::Aborted if canceled_by_us => {
                tracing::debug!(
                    "Goal for {}/{} aborted after our cancel; treating as settled",
                    submission.fleet,
                    submission.robot
                );
                Ok(GoalCompletion {
                    status,
                    dynamic_event_id: last_event_id,
                })
            }
            GoalTerminalStatus::Aborted => Err(FleetError::GoalAborted {
                fleet: submission.fleet.clone(),
                robot: submission.robot.clone(),
            }),
            GoalTerminalStatus::Unknown => Err(FleetError::GoalFailed {
                status: "unknown".to_string(),
            }),
        }
    }

    /// Send a cancel or end goal for the robot described by `snapshot`.
    ///
    /// Validation happens before any client is created: both kinds need
    /// identity and a sequence number, and a cancel needs the open event
    /// id it targets. An end does not need an event id.
    pub async fn send_control(
        &self,
        kind: ControlKind,
        snapshot: &RobotSnapshot,
        feedback: Option<mpsc::Sender<DynamicEventFeedback>>,
    ) -> FleetResult<GoalCompletion> {
        if snapshot.name.is_empty() {
            return Err(FleetError::Validation {
                field: "robot".to_string(),
                reason: "robot name must not be empty".to_string(),
            });
        }
        if snapshot.fleet.is_empty() {
            return Err(FleetError::Validation {
                field: "fleet".to_string(),
                reason: "fleet name must not be empty".to_string(),
            });
        }
        let sequence = snapshot
            .dynamic_event_seq
            .ok_or_else(|| FleetError::Validation {
                field: "dynamic_event_seq".to_string(),
                reason: "control goals require the task's sequence number".to_string(),
            })?;

        match kind {
            ControlKind::Cancel => {
                // The id is only ever learned from goal feedback; under
                // contention it can lag the sequence number, so a cancel
                // without it is refused rather than guessed.
                let target_id = snapshot
                    .dynamic_event_id
                    .ok_or_else(|| FleetError::Validation {
                        field: "dynamic_event_id".to_string(),
                        reason: "cancel requires the currently open event id".to_string(),
                    })?;

                let key = robot_key(&snapshot.fleet, &snapshot.name);
                self.pending_cancels.insert(key.clone());

                let submission = GoalSubmission {
                    robot: snapshot.name.clone(),
                    fleet: snapshot.fleet.clone(),
                    event_type: DynamicEventType::Cancel,
                    category: String::new(),
                    description: serde_json::json!({ "id": target_id }),
                    sequence: Some(sequence),
                    target_id: Some(target_id),
                    stubborn_period: 0.0,
                };

                let result = self.submit_goal(submission, feedback).await;
                match &result {
                    Ok(_) => {
                        self.store
                            .clear_dynamic_event(&snapshot.name, &snapshot.fleet)
                            .await;
                    }
                    Err(_) => {
                        // The cancel never landed; do not excuse a later
                        // abort with it.
                        self.pending_cancels.remove(&key);
                    }
                }
                result
            }
            ControlKind::End => {
                let Some(_permit) = self.end_guard.try_acquire(&snapshot.fleet, &snapshot.name)
                else {
                    return Err(FleetError::EndEventInFlight {
                        fleet: snapshot.fleet.clone(),
                        robot: snapshot.name.clone(),
                    });
                };

                let submission = GoalSubmission {
                    robot: snapshot.name.clone(),
                    fleet: snapshot.fleet.clone(),
                    event_type: DynamicEventType::End,
                    category: String::new(),
                    description: serde_json::json!({}),
                    sequence: Some(sequence),
                    target_id: None,
                    stubborn_period: 0.0,
                };

                let result = self.submit_goal(submission, feedback).await;
                if result.is_ok() {
                    self.store
                        .clear_dynamic_event(&snapshot.name, &snapshot.fleet)
                        .await;
                }
                // _permit drops here, releasing the guard on every path.
                result
            }
        }
    }
}
