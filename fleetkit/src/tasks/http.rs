//! HTTP implementation of the task API seam over `fms-client`.

use crate::errors::FleetResult;
use crate::tasks::TaskApi;
use async_trait::async_trait;
use dashmap::DashMap;
use fms_client::FmsClient;
use fms_types::{TaskRequest, TaskState};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Task API backed by the fleet manager's HTTP endpoints, with SSE
/// state subscriptions pumped into per-task channels.
pub struct HttpTaskApi {
    client: FmsClient,
    /// One pump task per subscribed task id.
    pumps: DashMap<String, JoinHandle<()>>,
    buffer: usize,
}

impl HttpTaskApi {
    pub fn new(client: FmsClient) -> Self {
        Self {
            client,
            pumps: DashMap::new(),
            buffer: 64,
        }
    }
}

impl Drop for HttpTaskApi {
    fn drop(&mut self) {
        for entry in self.pumps.iter() {
            entry.value().abort();
        }
    }
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn dispatch_robot_task(
        &self,
        fleet: &str,
        robot: &str,
        request: &TaskRequest,
    ) -> FleetResult<TaskState> {
        Ok(self.client.dispatch_robot_task(fleet, robot, request).await?)
    }

    async fn dispatch_fleet_task(&self, request: &TaskRequest) -> FleetResult<TaskState> {
        Ok(self.client.dispatch_task(request).await?)
    }

    async fn get_task_state(&self, task_id: &str) -> FleetResult<TaskState> {
        Ok(self.client.get_task_state(task_id).await?)
    }

    async fn subscribe_task_state(&self, task_id: &str) -> FleetResult<mpsc::Receiver<TaskState>> {
        let mut stream = self.client.subscribe_task_state(task_id).await?;
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = task_id.to_string();

        let pump = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(state) => {
                        if sender.send(state).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::warn!("State stream for {id} yielded an error: {error}");
                    }
                }
            }
        });

        if let Some(previous) = self.pumps.insert(task_id.to_string(), pump) {
            previous.abort();
        }

        Ok(receiver)
    }

    async fn unsubscribe_task_state(&self, task_id: &str) {
        if let Some((_, pump)) = self.pumps.remove(task_id) {
            pump.abort();
            tracing::debug!("Left state subscription for {task_id}");
        }
    }
}
