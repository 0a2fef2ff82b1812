//! Client for the fleet-management-system task API.
//!
//! Task dispatch and state retrieval are plain JSON-over-HTTP; the
//! per-task notification channel is a Server-Sent Events stream of
//! `TaskState` snapshots.

use crate::constants::{
    task_state_path, task_state_stream_path, DISPATCH_TASK_PATH, ROBOT_TASK_PATH,
};
use crate::error::{FmsError, FmsResult};
use fms_types::{
    DispatchTaskRequest, RobotTaskRequest, TaskDispatchResponse, TaskRequest, TaskState,
};
use futures_core::Stream;
use reqwest::Client;
use std::pin::Pin;

/// Client for a fleet manager's task API.
#[derive(Clone)]
pub struct FmsClient {
    /// HTTP client for making requests
    client: Client,
    /// Base URL of the fleet manager, without a trailing slash
    base_url: String,
    /// Optional authentication token
    auth_token: Option<String>,
}

impl FmsClient {
    /// Create a new client against the given base URL.
    ///
    /// Uses a default `reqwest::Client`. For custom HTTP configuration
    /// (timeouts, proxies, TLS), use [`FmsClient::with_http_client`].
    pub fn new(base_url: impl AsRef<str>) -> FmsResult<Self> {
        Self::with_http_client(base_url, Client::new())
    }

    /// Create a new client with a pre-configured `reqwest::Client`.
    pub fn with_http_client(base_url: impl AsRef<str>, http_client: Client) -> FmsResult<Self> {
        let base_url = base_url.as_ref().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(FmsError::InvalidParameter {
                message: "Fleet manager base URL must not be empty".to_string(),
            });
        }

        Ok(Self {
            client: http_client,
            base_url: base_url.to_string(),
            auth_token: None,
        })
    }

    /// Set authentication token (builder pattern)
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// The base URL this client targets.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Helper for JSON POST requests against the task API.
    async fn post_json<TBody, TResponse>(&self, path: &str, body: &TBody) -> FmsResult<TResponse>
    where
        TBody: serde::Serialize,
        TResponse: for<'de> serde::Deserialize<'de>,
    {
        let mut req = self
            .client
            .post(self.url(path))
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(body);

        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await.map_err(|e| FmsError::NetworkError {
            message: format!("Failed to send request to {path}: {e}"),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(FmsError::NetworkError {
                message: format!("HTTP error {status}: {error_text}"),
            });
        }

        response
            .json()
            .await
            .map_err(|e| FmsError::SerializationError {
                message: format!("Failed to parse response from {path}: {e}"),
            })
    }

    fn unwrap_dispatch_response(response: TaskDispatchResponse) -> FmsResult<TaskState> {
        if !response.success {
            let message = response
                .errors
                .iter()
                .filter_map(|e| e.detail.as_deref())
                .collect::<Vec<_>>()
                .join("; ");
            let code = response.errors.first().and_then(|e| e.code);
            return Err(FmsError::ApiError {
                message: if message.is_empty() {
                    "Task dispatch rejected".to_string()
                } else {
                    message
                },
                code,
            });
        }

        response.state.ok_or_else(|| FmsError::SerializationError {
            message: "Dispatch response succeeded but carried no task state".to_string(),
        })
    }

    /// Dispatch a task to one specific robot of a fleet.
    pub async fn dispatch_robot_task(
        &self,
        fleet: impl Into<String>,
        robot: impl Into<String>,
        request: &TaskRequest,
    ) -> FmsResult<TaskState> {
        let body = RobotTaskRequest::new(robot, fleet, request.clone());
        let response: TaskDispatchResponse = self.post_json(ROBOT_TASK_PATH, &body).await?;
        Self::unwrap_dispatch_response(response)
    }

    /// Dispatch a task and let the fleet manager pick a robot.
    pub async fn dispatch_task(&self, request: &TaskRequest) -> FmsResult<TaskState> {
        let body = DispatchTaskRequest::new(request.clone());
        let response: TaskDispatchResponse = self.post_json(DISPATCH_TASK_PATH, &body).await?;
        Self::unwrap_dispatch_response(response)
    }

    /// Get the current state of a task.
    pub async fn get_task_state(&self, task_id: &str) -> FmsResult<TaskState> {
        let path = task_state_path(task_id);
        let mut req = self
            .client
            .get(self.url(&path))
            .header("Accept", "application/json");

        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await.map_err(|e| FmsError::NetworkError {
            message: format!("Failed to fetch task state for {task_id}: {e}"),
        })?;

        if !response.status().is_success() {
            return Err(FmsError::NetworkError {
                message: format!("Failed to fetch task state: HTTP {}", response.status()),
            });
        }

        response
            .json()
            .await
            .map_err(|e| FmsError::SerializationError {
                message: format!("Failed to parse task state: {e}"),
            })
    }

    /// Subscribe to state updates for one task.
    ///
    /// Returns a stream of `TaskState` snapshots parsed from the SSE
    /// channel. The subscription ends when the server closes the stream
    /// or the returned stream is dropped.
    pub async fn subscribe_task_state(
        &self,
        task_id: &str,
    ) -> FmsResult<Pin<Box<dyn Stream<Item = FmsResult<TaskState>> + Send>>> {
        let path = task_state_stream_path(task_id);
        let mut req = self
            .client
            .get(self.url(&path))
            .header("Accept", "text/event-stream");

        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }

        let response = req.send().await.map_err(|e| FmsError::NetworkError {
            message: format!("Failed to open state stream for {task_id}: {e}"),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(FmsError::NetworkError {
                message: format!("HTTP error {status}: {error_text}"),
            });
        }

        let content_type = response
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !content_type.starts_with("text/event-stream") {
            return Err(FmsError::NetworkError {
                message: format!(
                    "Invalid response Content-Type for SSE stream. Expected 'text/event-stream', got '{content_type}'"
                ),
            });
        }

        Ok(Box::pin(Self::parse_sse_stream(response.bytes_stream())))
    }

    /// Parse a Server-Sent Events byte stream into task states.
    fn parse_sse_stream(
        byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
    ) -> impl Stream<Item = FmsResult<TaskState>> + Send {
        use std::task::{Context, Poll};

        struct SseParser {
            inner: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
            buffer: String,
            event_data_buffer: String,
            pending_results: Vec<FmsResult<TaskState>>,
        }

        impl SseParser {
            fn new(
                inner: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
            ) -> Self {
                Self {
                    inner: Box::pin(inner),
                    buffer: String::new(),
                    event_data_buffer: String::new(),
                    pending_results: Vec::new(),
                }
            }

            fn process_chunk(&mut self, chunk: bytes::Bytes) -> Vec<FmsResult<TaskState>> {
                self.buffer.push_str(&String::from_utf8_lossy(&chunk));

                let mut results = Vec::new();

                // Process complete lines
                while let Some(newline_pos) = self.buffer.find('\n') {
                    let line = self.buffer[..newline_pos]
                        .trim_end_matches('\r')
                        .to_string();
                    self.buffer = self.buffer[newline_pos + 1..].to_string();

                    if line.is_empty() {
                        // Empty line signals end of event
                        if !self.event_data_buffer.is_empty() {
                            results.push(FmsClient::process_sse_event(&self.event_data_buffer));
                            self.event_data_buffer.clear();
                        }
                    } else if let Some(data) = line.strip_prefix("data:") {
                        // Accumulate data lines
                        if !self.event_data_buffer.is_empty() {
                            self.event_data_buffer.push('\n');
                        }
                        self.event_data_buffer.push_str(data.trim_start());
                    } else if line.starts_with(':') {
                        // Comment line, ignore
                    }
                    // Ignore other SSE fields (event:, id:, retry:)
                }

                results
            }
        }

        impl Stream for SseParser {
            type Item = FmsResult<TaskState>;

            fn poll_next(
                mut self: Pin<&mut Self>,
                cx: &mut Context<'_>,
            ) -> Poll<Option<Self::Item>> {
                // First, return any pending results
                if let Some(result) = self.pending_results.pop() {
                    return Poll::Ready(Some(result));
                }

                match self.inner.as_mut().poll_next(cx) {
                    Poll::Ready(Some(Ok(chunk))) => {
                        let mut results = self.process_chunk(chunk);

                        if results.is_empty() {
                            // No complete events yet, wake up and try again
                            cx.waker().wake_by_ref();
                            Poll::Pending
                        } else {
                            // Store results in reverse order (we pop from the end)
                            results.reverse();
                            self.pending_results = results;

                            Poll::Ready(self.pending_results.pop())
                        }
                    }
                    Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(FmsError::NetworkError {
                        message: format!("Stream error: {e}"),
                    }))),
                    Poll::Ready(None) => Poll::Ready(None),
                    Poll::Pending => Poll::Pending,
                }
            }
        }

        SseParser::new(byte_stream)
    }

    /// Process a single SSE event's data.
    fn process_sse_event(json_data: &str) -> FmsResult<TaskState> {
        if json_data.trim().is_empty() {
            return Err(FmsError::SerializationError {
                message: "Empty SSE event data".to_string(),
            });
        }

        serde_json::from_str(json_data).map_err(|e| FmsError::SerializationError {
            message: format!("Failed to parse SSE event data: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fms_types::TaskStatus;

    #[test]
    fn client_rejects_empty_base_url() {
        assert!(FmsClient::new("").is_err());
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = FmsClient::new("https://fleet.example.com/").unwrap();
        assert_eq!(client.base_url(), "https://fleet.example.com");
        assert_eq!(
            client.url(&task_state_path("task_1")),
            "https://fleet.example.com/tasks/task_1/state"
        );
    }

    #[test]
    fn sse_event_parses_task_state() {
        let state = FmsClient::process_sse_event(
            r#"{"booking": {"id": "task_1"}, "status": "standby"}"#,
        )
        .unwrap();
        assert_eq!(state.booking_id(), Some("task_1"));
        assert_eq!(state.status, Some(TaskStatus::Standby));
    }

    #[test]
    fn sse_event_rejects_empty_data() {
        assert!(FmsClient::process_sse_event("  ").is_err());
    }

    #[test]
    fn unwrap_dispatch_response_surfaces_errors() {
        let response: TaskDispatchResponse = serde_json::from_str(
            r#"{"success": false, "errors": [{"code": 7, "detail": "fleet offline"}]}"#,
        )
        .unwrap();

        match FmsClient::unwrap_dispatch_response(response) {
            Err(FmsError::ApiError { message, code }) => {
                assert!(message.contains("fleet offline"));
                assert_eq!(code, Some(7));
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }
}
