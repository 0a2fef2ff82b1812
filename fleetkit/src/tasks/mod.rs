//! Task creation against the external task-management API, and the wait
//! for the created task to become assignable.

pub mod http;

pub use http::HttpTaskApi;

use crate::errors::{FleetError, FleetResult};
use crate::store::{RobotContextStore, RobotUpdate};
use async_trait::async_trait;
use fms_types::{AssignedTo, TaskRequest, TaskState, TaskStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// The operations this core needs from the task-management API.
///
/// `subscribe_task_state` joins the per-task notification channel;
/// `get_task_state` is the polling fallback for transports that do not
/// deliver the subscribed events reliably.
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn dispatch_robot_task(
        &self,
        fleet: &str,
        robot: &str,
        request: &TaskRequest,
    ) -> FleetResult<TaskState>;

    async fn dispatch_fleet_task(&self, request: &TaskRequest) -> FleetResult<TaskState>;

    async fn get_task_state(&self, task_id: &str) -> FleetResult<TaskState>;

    async fn subscribe_task_state(&self, task_id: &str) -> FleetResult<mpsc::Receiver<TaskState>>;

    async fn unsubscribe_task_state(&self, task_id: &str);
}

/// Result of a successful task creation.
#[derive(Debug, Clone)]
pub struct CreatedTask {
    pub task_id: String,
    pub state: TaskState,
}

/// Result of a task reaching its assignable state.
#[derive(Debug, Clone)]
pub struct StandbyInfo {
    pub task_id: String,
    /// The robot context store's sequence number for the assigned robot
    /// at the instant standby was observed.
    pub dynamic_event_seq: Option<u64>,
    pub assigned_robot: Option<AssignedTo>,
}

/// Receive from the notification channel, or park forever once the
/// subscription is gone so the poll branch carries the wait alone.
async fn next_subscribed(
    subscription: &mut Option<mpsc::Receiver<TaskState>>,
) -> Option<TaskState> {
    match subscription {
        Some(receiver) => receiver.recv().await,
        None => futures_util::future::pending().await,
    }
}

/// Creates tasks and waits for them to reach standby.
pub struct TaskCreationProtocol {
    api: Arc<dyn TaskApi>,
    store: Arc<RobotContextStore>,
    poll_interval: Duration,
    standby_timeout: Duration,
}

impl TaskCreationProtocol {
    pub fn new(
        api: Arc<dyn TaskApi>,
        store: Arc<RobotContextStore>,
        poll_interval: Duration,
        standby_timeout: Duration,
    ) -> Self {
        Self {
            api,
            store,
            poll_interval,
            standby_timeout,
        }
    }

    /// Issue a task creation request.
    ///
    /// With both `robot` and `fleet` the robot-specific endpoint is
    /// used; with only `fleet` the dispatcher picks a robot; anything
    /// else is a caller error. A response without a booking id is a
    /// protocol error.
    pub async fn create_task(
        &self,
        robot: Option<&str>,
        fleet: Option<&str>,
        request: TaskRequest,
    ) -> FleetResult<CreatedTask> {
        let state = match (robot, fleet) {
            (Some(robot), Some(fleet)) => {
                self.api.dispatch_robot_task(fleet, robot, &request).await?
            }
            (None, Some(fleet)) => {
                let request = request.with_fleet_name(fleet);
                self.api.dispatch_fleet_task(&request).await?
            }
            (Some(_), None) => {
                return Err(FleetError::Validation {
                    field: "fleet".to_string(),
                    reason: "a robot-specific request also needs its fleet".to_string(),
                });
            }
            (None, None) => {
                return Err(FleetError::Validation {
                    field: "fleet".to_string(),
                    reason: "task creation needs at least a fleet".to_string(),
                });
            }
        };

        let task_id = state
            .booking_id()
            .map(str::to_string)
            .ok_or_else(|| FleetError::Protocol {
                reason: "task creation response carried no booking id".to_string(),
            })?;

        tracing::info!("Created task {task_id}");

        if let (Some(robot), Some(fleet)) = (robot, fleet) {
            self.store
                .upsert(robot, fleet, RobotUpdate::default().with_task_id(&task_id))
                .await;
        }

        Ok(CreatedTask { task_id, state })
    }

    /// Wait for `task_id` to reach `standby`.
    ///
    /// Races the notification channel against a fixed-interval poll of
    /// the state endpoint, bounded by a deadline. Whatever the exit
    /// path, the subscription is left and the poll interval dropped.
    pub async fn await_standby(
        &self,
        task_id: &str,
        robot: Option<&str>,
        fleet: Option<&str>,
        timeout: Option<Duration>,
    ) -> FleetResult<StandbyInfo> {
        let timeout = timeout.unwrap_or(self.standby_timeout);

        // The subscription is best-effort: if the transport cannot
        // deliver it, polling still covers us.
        let mut subscription = match self.api.subscribe_task_state(task_id).await {
            Ok(receiver) => Some(receiver),
            Err(error) => {
                tracing::warn!("State subscription for {task_id} failed ({error}); polling only");
                None
            }
        };

        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        let outcome = loop {
            tokio::select! {
                () = &mut deadline => {
                    break Err(FleetError::Timeout {
                        operation: format!("await_standby({task_id})"),
                        duration_ms: timeout.as_millis() as u64,
                    });
                }
                update = next_subscribed(&mut subscription) => {
                    match update {
                        Some(state) => match self.judge(task_id, robot, fleet, state).await {
                            Ok(Some(info)) => break Ok(info),
                            Ok(None) => {}
                            Err(error) => break Err(error),
                        },
                        None => {
                            tracing::debug!("State subscription for {task_id} closed; polling only");
                            subscription = None;
                        }
                    }
                }
                _ = poll.tick() => {
                    match self.api.get_task_state(task_id).await {
                        Ok(state) => match self.judge(task_id, robot, fleet, state).await {
                            Ok(Some(info)) => break Ok(info),
                            Ok(None) => {}
                            Err(error) => break Err(error),
                        },
                        Err(error) => {
                            // Transient; the next tick retries.
                            tracing::warn!("Polling task {task_id} failed: {error}");
                        }
                    }
                }
            }
        };

        self.api.unsubscribe_task_state(task_id).await;
        outcome
    }

    /// Decide whether a state snapshot resolves the standby wait.
    async fn judge(
        &self,
        task_id: &str,
        robot: Option<&str>,
        fleet: Option<&str>,
        state: TaskState,
    ) -> FleetResult<Option<StandbyInfo>> {
        let Some(status) = state.status else {
            return Ok(None);
        };

        if status == TaskStatus::Standby {
            let assigned = state.assigned_to.clone().or_else(|| {
                match (robot, fleet) {
                    (Some(robot), Some(fleet)) => Some(AssignedTo {
                        group: fleet.to_string(),
                        name: robot.to_string(),
                    }),
                    _ => None,
                }
            });

            let mut dynamic_event_seq = None;
            if let Some(assigned) = &assigned {
                let record = self
                    .store
                    .upsert(
                        &assigned.name,
                        &assigned.group,
                        RobotUpdate::default().with_task_id(task_id),
                    )
                    .await;
                dynamic_event_seq = record.dynamic_event_seq;
            }

            return Ok(Some(StandbyInfo {
                task_id: task_id.to_string(),
                dynamic_event_seq,
                assigned_robot: assigned,
            }));
        }

        if status.is_terminal_failure() {
            return Err(FleetError::TaskNotAssignable {
                task_id: task_id.to_string(),
                status: format!("{status:?}").to_lowercase(),
            });
        }

        Ok(None)
    }
}
