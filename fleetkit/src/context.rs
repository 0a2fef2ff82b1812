//! The explicitly-owned orchestrator context and the upward-facing
//! facade.
//!
//! There is no ambient global: every component receives the context by
//! `Arc` at construction time, and a full teardown is dropping the
//! orchestrator — all stores and caches go with it.

use crate::command::CommandChannelFactory;
use crate::config::FleetKitConfig;
use crate::errors::{FleetError, FleetResult};
use crate::events::{ContextEvent, ContextEventBus};
use crate::goals::{
    ControlKind, EndEventGuard, GoalCompletion, GoalLifecycleManager, GoalSubmission,
    ParallelBehavior, RobotSnapshot,
};
use crate::ingest::IngestionEngine;
use crate::store::{NamedWaypoint, RobotContextStore, RobotRecord, TelemetryCache};
use crate::tasks::{CreatedTask, StandbyInfo, TaskApi, TaskCreationProtocol};
use dashmap::DashSet;
use fms_types::telemetry::{DoorState, FleetState, LiftState};
use fms_types::{DynamicEventFeedback, DynamicEventStatus, TaskRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// The single shared-state owner: every component reads and writes
/// through this context, never through a private copy.
pub struct OrchestratorContext {
    pub store: Arc<RobotContextStore>,
    pub telemetry: Arc<TelemetryCache>,
    pub bus: Arc<ContextEventBus>,
    pub end_guard: Arc<EndEventGuard>,
    pub pending_cancels: Arc<DashSet<String>>,
    pub config: FleetKitConfig,
}

impl OrchestratorContext {
    pub fn new(config: FleetKitConfig) -> Arc<Self> {
        let bus = Arc::new(ContextEventBus::new(config.event_buffer));
        Arc::new(Self {
            store: Arc::new(RobotContextStore::new(bus.clone())),
            telemetry: Arc::new(TelemetryCache::new()),
            bus,
            end_guard: Arc::new(EndEventGuard::new()),
            pending_cancels: Arc::new(DashSet::new()),
            config,
        })
    }
}

/// Parameters for starting one dynamic event through the conflict
/// policy.
#[derive(Debug, Clone)]
pub struct EventRequest {
    pub robot: String,
    pub fleet: String,
    pub category: String,
    pub description: serde_json::Value,
    pub stubborn_period: f64,
    /// What to do when the robot already has an open event.
    pub parallel: ParallelBehavior,
    /// Task request used when `parallel` is [`ParallelBehavior::Queue`];
    /// queueing creates an entirely new task before submitting.
    pub queue_request: Option<TaskRequest>,
}

impl EventRequest {
    pub fn new(
        robot: impl Into<String>,
        fleet: impl Into<String>,
        category: impl Into<String>,
        description: serde_json::Value,
    ) -> Self {
        Self {
            robot: robot.into(),
            fleet: fleet.into(),
            category: category.into(),
            description,
            stubborn_period: 0.0,
            parallel: ParallelBehavior::Ignore,
            queue_request: None,
        }
    }

    pub fn with_parallel(mut self, parallel: ParallelBehavior) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_queue_request(mut self, request: TaskRequest) -> Self {
        self.queue_request = Some(request);
        self
    }
}

/// Outcome of [`FleetOrchestrator::begin_event`]. `NotStarted` is a
/// deliberate policy outcome, not a failure.
#[derive(Debug, Clone)]
pub enum EventStart {
    Started(GoalCompletion),
    Reused {
        task_id: Option<String>,
        dynamic_event_seq: Option<u64>,
    },
    NotStarted,
}

/// The upward-facing facade wiring ingestion, goal lifecycle and task
/// creation over one shared context.
pub struct FleetOrchestrator {
    ctx: Arc<OrchestratorContext>,
    ingestion: IngestionEngine,
    lifecycle: GoalLifecycleManager,
    tasks: TaskCreationProtocol,
}

impl FleetOrchestrator {
    pub fn new(
        config: FleetKitConfig,
        factory: Arc<dyn CommandChannelFactory>,
        task_api: Arc<dyn TaskApi>,
    ) -> Self {
        let ctx = OrchestratorContext::new(config);

        let ingestion = IngestionEngine::new(
            ctx.store.clone(),
            ctx.telemetry.clone(),
            ctx.bus.clone(),
            &ctx.config.throttle,
        );
        let lifecycle = GoalLifecycleManager::new(
            factory,
            ctx.store.clone(),
            ctx.end_guard.clone(),
            ctx.pending_cancels.clone(),
            ctx.config.endpoint_timeout(),
        );
        let tasks = TaskCreationProtocol::new(
            task_api,
            ctx.store.clone(),
            ctx.config.task_poll_interval(),
            ctx.config.standby_timeout(),
        );

        Self {
            ctx,
            ingestion,
            lifecycle,
            tasks,
        }
    }

    pub fn context(&self) -> &Arc<OrchestratorContext> {
        &self.ctx
    }

    /// Telemetry entry points for wiring transport subscriptions.
    pub fn ingestion(&self) -> &IngestionEngine {
        &self.ingestion
    }

    // ------------------------------------------------------------------
    // Cached data accessors
    // ------------------------------------------------------------------

    pub fn get_robot(&self, name: &str, fleet: &str) -> Option<RobotRecord> {
        self.ctx.store.get(name, fleet)
    }

    pub fn all_robots(&self) -> Vec<RobotRecord> {
        self.ctx.store.all()
    }

    pub async fn locations(&self) -> Vec<NamedWaypoint> {
        self.ctx.telemetry.locations().await
    }

    pub fn fleet_states(&self) -> Vec<FleetState> {
        self.ctx.telemetry.cached_fleet_states()
    }

    pub fn door_states(&self) -> Vec<DoorState> {
        self.ctx.telemetry.door_states()
    }

    pub fn lift_states(&self) -> Vec<LiftState> {
        self.ctx.telemetry.lift_states()
    }

    pub async fn subscribe_events(&self) -> (String, mpsc::Receiver<ContextEvent>) {
        self.ctx.bus.subscribe().await
    }

    pub async fn unsubscribe_events(&self, subscription_id: &str) {
        self.ctx.bus.unsubscribe(subscription_id).await;
    }

    pub async fn force_flush(&self) {
        self.ingestion.force_flush().await;
    }

    // ------------------------------------------------------------------
    // Task creation
    // ------------------------------------------------------------------

    pub async fn create_task(
        &self,
        robot: Option<&str>,
        fleet: Option<&str>,
        request: TaskRequest,
    ) -> FleetResult<CreatedTask> {
        self.tasks.create_task(robot, fleet, request).await
    }

    pub async fn await_standby(
        &self,
        task_id: &str,
        robot: Option<&str>,
        fleet: Option<&str>,
        timeout: Option<Duration>,
    ) -> FleetResult<StandbyInfo> {
        self.tasks.await_standby(task_id, robot, fleet, timeout).await
    }

    // ------------------------------------------------------------------
    // Goal operations
    // ------------------------------------------------------------------

    pub async fn submit_goal(
        &self,
        submission: GoalSubmission,
        feedback: Option<mpsc::Sender<DynamicEventFeedback>>,
    ) -> FleetResult<GoalCompletion> {
        self.lifecycle.submit_goal(submission, feedback).await
    }

    pub async fn send_control(
        &self,
        kind: ControlKind,
        snapshot: &RobotSnapshot,
        feedback: Option<mpsc::Sender<DynamicEventFeedback>>,
    ) -> FleetResult<GoalCompletion> {
        self.lifecycle.send_control(kind, snapshot, feedback).await
    }

    /// Start a dynamic event, resolving conflicts with any open event
    /// according to the request's parallel behavior.
    pub async fn begin_event(
        &self,
        request: EventRequest,
        feedback: Option<mpsc::Sender<DynamicEventFeedback>>,
    ) -> FleetResult<EventStart> {
        let record = self.ctx.store.get(&request.robot, &request.fleet);
        let open = record.as_ref().map_or(false, RobotRecord::has_open_event);

        if open {
            // `open` implies the record exists.
            let Some(record) = record else {
                return Err(FleetError::Internal {
                    component: "begin_event".to_string(),
                    reason: "open event without a robot record".to_string(),
                });
            };

            match request.parallel {
                ParallelBehavior::Ignore => {
                    tracing::debug!(
                        "Event for {}/{} ignored; one is already open",
                        request.fleet,
                        request.robot
                    );
                    return Ok(EventStart::NotStarted);
                }
                ParallelBehavior::Continue => {
                    return Ok(EventStart::Reused {
                        task_id: record.task_id.clone(),
                        dynamic_event_seq: record.dynamic_event_seq,
                    });
                }
                ParallelBehavior::Overwrite => {
                    // A standby robot has no event underway yet; there is
                    // nothing to cancel.
                    if record.dynamic_event_status == Some(DynamicEventStatus::Underway) {
                        let snapshot = RobotSnapshot::from(&record);
                        self.lifecycle
                            .send_control(ControlKind::Cancel, &snapshot, None)
                            .await?;
                    }
                    tokio::time::sleep(self.ctx.config.overwrite_settle()).await;
                }
                ParallelBehavior::Queue => {
                    let task_request =
                        request
                            .queue_request
                            .clone()
                            .ok_or_else(|| FleetError::Validation {
                                field: "queue_request".to_string(),
                                reason: "queue behavior requires a task request".to_string(),
                            })?;
                    let created = self
                        .tasks
                        .create_task(Some(&request.robot), Some(&request.fleet), task_request)
                        .await?;
                    self.tasks
                        .await_standby(
                            &created.task_id,
                            Some(&request.robot),
                            Some(&request.fleet),
                            None,
                        )
                        .await?;
                }
            }
        }

        let submission = GoalSubmission::new_request(
            request.robot,
            request.fleet,
            request.category,
            request.description,
        )
        .with_stubborn_period(request.stubborn_period);

        let completion = self.lifecycle.submit_goal(submission, feedback).await?;
        Ok(EventStart::Started(completion))
    }
}
