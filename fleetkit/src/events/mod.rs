//! Change notifications emitted by the orchestration core.
//!
//! The context event bus is an explicit observer registry: callers
//! subscribe to receive [`ContextEvent`]s over a bounded channel and must
//! unsubscribe when done. Publishing never blocks on a slow subscriber.

use fms_types::telemetry::RobotStatus;
use fms_types::DynamicEventStatus;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::ingest::StreamKind;

/// Events describing changes to the shared robot/telemetry state.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextEvent {
    /// A robot was seen for the first time.
    RobotDiscovered { fleet: String, robot: String },
    /// A robot's general status changed.
    RobotModeChanged {
        fleet: String,
        robot: String,
        status: RobotStatus,
    },
    /// A robot's dynamic event moved to a new lifecycle status.
    RobotDynamicEventStatusChanged {
        fleet: String,
        robot: String,
        status: Option<DynamicEventStatus>,
    },
    /// A telemetry fold refreshed one of the exposed stores.
    DataUpdated { stream: StreamKind },
}

/// Subscription handle for one registered observer.
#[derive(Debug)]
struct Subscription {
    id: String,
    sender: mpsc::Sender<ContextEvent>,
}

/// In-memory pub/sub for context events, using tokio channels.
pub struct ContextEventBus {
    subscribers: Arc<tokio::sync::RwLock<Vec<Subscription>>>,
    buffer: usize,
}

impl ContextEventBus {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: Arc::new(tokio::sync::RwLock::new(Vec::new())),
            buffer,
        }
    }

    /// Clean up closed subscribers
    async fn cleanup_closed_subscribers(&self) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|sub| !sub.sender.is_closed());
    }

    /// Publish an event to all subscribers.
    pub async fn publish(&self, event: ContextEvent) {
        self.cleanup_closed_subscribers().await;

        let subscribers = self.subscribers.read().await;
        for subscription in subscribers.iter() {
            // Use try_send to avoid blocking if a subscriber is slow; the
            // cleanup will remove closed channels on the next operation.
            if subscription.sender.try_send(event.clone()).is_err() {
                continue;
            }
        }
    }

    /// Register an observer. Returns the subscription id (needed for
    /// [`ContextEventBus::unsubscribe`]) and the event receiver.
    pub async fn subscribe(&self) -> (String, mpsc::Receiver<ContextEvent>) {
        self.cleanup_closed_subscribers().await;

        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = uuid::Uuid::new_v4().to_string();

        let mut subscribers = self.subscribers.write().await;
        subscribers.push(Subscription {
            id: id.clone(),
            sender,
        });

        (id, receiver)
    }

    /// Remove one observer by its subscription id.
    pub async fn unsubscribe(&self, subscription_id: &str) {
        let mut subscribers = self.subscribers.write().await;
        let initial_count = subscribers.len();
        subscribers.retain(|sub| sub.id != subscription_id);

        if subscribers.len() < initial_count {
            tracing::debug!("Removed subscription {subscription_id}");
        }
    }

    /// Get subscriber count (useful for debugging/monitoring)
    pub async fn subscriber_count(&self) -> usize {
        self.cleanup_closed_subscribers().await;
        self.subscribers.read().await.len()
    }
}
