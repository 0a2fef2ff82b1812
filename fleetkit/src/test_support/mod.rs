//! Shared fixtures and helpers for fleetkit tests.
//!
//! These fakes are intentionally lightweight: scripted responses seeded
//! up-front, recorded calls for assertions, and counters for resource
//! accounting. They are available when the `test-support` feature is
//! enabled or when running tests, to keep the public surface minimal
//! while giving tests convenient doubles.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::command::{CommandChannel, CommandChannelFactory, GoalEvent, GoalEventStream};
use crate::errors::{FleetError, FleetResult};
use crate::tasks::TaskApi;
use async_trait::async_trait;
use fms_types::{
    AssignedTo, DynamicEventGoal, GoalTerminalStatus, TaskBooking, TaskRequest, TaskState,
    TaskStatus,
};
use tokio::sync::mpsc;

// ============================================================================
// Command channel fakes
// ============================================================================

/// Create/destroy accounting for mock command clients.
///
/// Every [`MockCommandFactory::connect`] increments `created`; every
/// client drop increments `destroyed`. A balanced pair after a
/// submission proves no client leaked.
#[derive(Debug, Default)]
pub struct ChannelCounters {
    created: AtomicUsize,
    destroyed: AtomicUsize,
}

impl ChannelCounters {
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn balanced(&self) -> bool {
        self.created() == self.destroyed()
    }
}

/// A command-channel factory that mints scripted clients.
///
/// Scripts are consumed per `connect` in FIFO order; when the queue is
/// empty the default script (accept then succeed) is used. Goals sent
/// through any minted client are recorded for inspection.
pub struct MockCommandFactory {
    scripts: Mutex<VecDeque<Vec<GoalEvent>>>,
    counters: Arc<ChannelCounters>,
    sent_goals: Arc<Mutex<Vec<(String, DynamicEventGoal)>>>,
    ready: AtomicBool,
    goal_delay: Mutex<Option<Duration>>,
    refuse_connect: AtomicBool,
}

impl Default for MockCommandFactory {
    fn default() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            counters: Arc::new(ChannelCounters::default()),
            sent_goals: Arc::new(Mutex::new(Vec::new())),
            ready: AtomicBool::new(true),
            goal_delay: Mutex::new(None),
            refuse_connect: AtomicBool::new(false),
        }
    }
}

impl MockCommandFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the event script the next minted client will play back.
    pub fn push_script(&self, script: Vec<GoalEvent>) {
        self.scripts
            .lock()
            .expect("mock factory scripts mutex poisoned")
            .push_back(script);
    }

    /// Make `endpoint_ready` report the given availability.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Hold each `send_goal` for `delay` before yielding its script,
    /// to widen race windows in concurrency tests.
    pub fn set_goal_delay(&self, delay: Duration) {
        *self
            .goal_delay
            .lock()
            .expect("mock factory delay mutex poisoned") = Some(delay);
    }

    /// Make `connect` itself fail.
    pub fn refuse_connections(&self) {
        self.refuse_connect.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn counters(&self) -> Arc<ChannelCounters> {
        self.counters.clone()
    }

    /// The goals sent so far, with their `"{fleet}/{robot}"` keys.
    #[must_use]
    pub fn sent_goals(&self) -> Vec<(String, DynamicEventGoal)> {
        self.sent_goals
            .lock()
            .expect("mock factory goals mutex poisoned")
            .clone()
    }

    /// Convenience script: accepted, then the given terminal status.
    #[must_use]
    pub fn terminal_script(status: GoalTerminalStatus) -> Vec<GoalEvent> {
        vec![GoalEvent::Accepted, GoalEvent::Completed(status)]
    }
}

impl CommandChannelFactory for MockCommandFactory {
    fn connect(&self, fleet: &str, robot: &str) -> FleetResult<Box<dyn CommandChannel>> {
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(FleetError::Network {
                operation: "connect".to_string(),
                reason: "mock factory refusing connections".to_string(),
            });
        }

        self.counters.created.fetch_add(1, Ordering::SeqCst);

        let script = self
            .scripts
            .lock()
            .expect("mock factory scripts mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| Self::terminal_script(GoalTerminalStatus::Succeeded));

        Ok(Box::new(MockCommandChannel {
            key: format!("{fleet}/{robot}"),
            script,
            ready: self.ready.load(Ordering::SeqCst),
            delay: *self
                .goal_delay
                .lock()
                .expect("mock factory delay mutex poisoned"),
            sent_goals: self.sent_goals.clone(),
            counters: self.counters.clone(),
        }))
    }
}

/// One scripted client minted by [`MockCommandFactory`].
pub struct MockCommandChannel {
    key: String,
    script: Vec<GoalEvent>,
    ready: bool,
    delay: Option<Duration>,
    sent_goals: Arc<Mutex<Vec<(String, DynamicEventGoal)>>>,
    counters: Arc<ChannelCounters>,
}

impl Drop for MockCommandChannel {
    fn drop(&mut self) {
        self.counters.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CommandChannel for MockCommandChannel {
    async fn endpoint_ready(&self, _timeout: Duration) -> bool {
        self.ready
    }

    async fn send_goal(&self, goal: DynamicEventGoal) -> FleetResult<GoalEventStream> {
        self.sent_goals
            .lock()
            .expect("mock channel goals mutex poisoned")
            .push((self.key.clone(), goal));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        Ok(Box::pin(futures_util::stream::iter(self.script.clone())))
    }
}

// ============================================================================
// Task API fake
// ============================================================================

/// A task API double with scripted dispatch results and a push channel
/// per subscription, so tests can play the notification side.
pub struct MockTaskApi {
    dispatch_results: Mutex<VecDeque<FleetResult<TaskState>>>,
    current_state: Mutex<Option<TaskState>>,
    push_senders: Mutex<HashMap<String, mpsc::Sender<TaskState>>>,
    subscriptions: Mutex<Vec<String>>,
    unsubscriptions: Mutex<Vec<String>>,
    refuse_subscribe: AtomicBool,
}

impl Default for MockTaskApi {
    fn default() -> Self {
        Self {
            dispatch_results: Mutex::new(VecDeque::new()),
            current_state: Mutex::new(None),
            push_senders: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(Vec::new()),
            unsubscriptions: Mutex::new(Vec::new()),
            refuse_subscribe: AtomicBool::new(false),
        }
    }
}

impl MockTaskApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next dispatch call.
    pub fn push_dispatch_result(&self, result: FleetResult<TaskState>) {
        self.dispatch_results
            .lock()
            .expect("mock api dispatch mutex poisoned")
            .push_back(result);
    }

    /// Set the state returned by `get_task_state`.
    pub fn set_state(&self, state: TaskState) {
        *self
            .current_state
            .lock()
            .expect("mock api state mutex poisoned") = Some(state);
    }

    /// Make `subscribe_task_state` fail, forcing the polling fallback.
    pub fn refuse_subscriptions(&self) {
        self.refuse_subscribe.store(true, Ordering::SeqCst);
    }

    /// Deliver a state update over the subscription for `task_id`.
    ///
    /// # Panics
    ///
    /// Panics if nothing is subscribed to `task_id`; that is a test
    /// setup error.
    pub async fn push_state(&self, task_id: &str, state: TaskState) {
        let sender = self
            .push_senders
            .lock()
            .expect("mock api senders mutex poisoned")
            .get(task_id)
            .cloned()
            .expect("no subscription for task id");
        sender.send(state).await.expect("subscription receiver dropped");
    }

    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions
            .lock()
            .expect("mock api subscriptions mutex poisoned")
            .clone()
    }

    #[must_use]
    pub fn unsubscriptions(&self) -> Vec<String> {
        self.unsubscriptions
            .lock()
            .expect("mock api unsubscriptions mutex poisoned")
            .clone()
    }

    /// A minimal state snapshot with a booking id and status.
    #[must_use]
    pub fn state(task_id: &str, status: TaskStatus) -> TaskState {
        TaskState {
            booking: Some(TaskBooking {
                id: task_id.to_string(),
                unix_millis_earliest_start_time: None,
                unix_millis_request_time: None,
                requester: None,
                labels: Vec::new(),
            }),
            category: None,
            status: Some(status),
            assigned_to: None,
            unix_millis_start_time: None,
            unix_millis_finish_time: None,
            phases: None,
            dispatch: None,
        }
    }

    /// Like [`MockTaskApi::state`], with an assignment.
    #[must_use]
    pub fn assigned_state(
        task_id: &str,
        status: TaskStatus,
        fleet: &str,
        robot: &str,
    ) -> TaskState {
        let mut state = Self::state(task_id, status);
        state.assigned_to = Some(AssignedTo {
            group: fleet.to_string(),
            name: robot.to_string(),
        });
        state
    }

    fn next_dispatch(&self) -> FleetResult<TaskState> {
        self.dispatch_results
            .lock()
            .expect("mock api dispatch mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| {
                Ok(Self::state(
                    &format!("task_{}", uuid::Uuid::new_v4()),
                    TaskStatus::Queued,
                ))
            })
    }
}

#[async_trait]
impl TaskApi for MockTaskApi {
    async fn dispatch_robot_task(
        &self,
        _fleet: &str,
        _robot: &str,
        _request: &TaskRequest,
    ) -> FleetResult<TaskState> {
        self.next_dispatch()
    }

    async fn dispatch_fleet_task(&self, _request: &TaskRequest) -> FleetResult<TaskState> {
        self.next_dispatch()
    }

    async fn get_task_state(&self, task_id: &str) -> FleetResult<TaskState> {
        let current = self
            .current_state
            .lock()
            .expect("mock api state mutex poisoned")
            .clone();
        Ok(current.unwrap_or_else(|| Self::state(task_id, TaskStatus::Queued)))
    }

    async fn subscribe_task_state(&self, task_id: &str) -> FleetResult<mpsc::Receiver<TaskState>> {
        if self.refuse_subscribe.load(Ordering::SeqCst) {
            return Err(FleetError::Network {
                operation: "subscribe".to_string(),
                reason: "mock api refusing subscriptions".to_string(),
            });
        }

        let (sender, receiver) = mpsc::channel(16);
        self.push_senders
            .lock()
            .expect("mock api senders mutex poisoned")
            .insert(task_id.to_string(), sender);
        self.subscriptions
            .lock()
            .expect("mock api subscriptions mutex poisoned")
            .push(task_id.to_string());
        Ok(receiver)
    }

    async fn unsubscribe_task_state(&self, task_id: &str) {
        self.push_senders
            .lock()
            .expect("mock api senders mutex poisoned")
            .remove(task_id);
        self.unsubscriptions
            .lock()
            .expect("mock api unsubscriptions mutex poisoned")
            .push(task_id.to_string());
    }
}
