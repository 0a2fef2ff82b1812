//! Paths of the fleet-management-system task API.

/// Endpoint for robot-specific task requests.
pub const ROBOT_TASK_PATH: &str = "tasks/robot_task";

/// Endpoint for fleet-dispatch task requests.
pub const DISPATCH_TASK_PATH: &str = "tasks/dispatch_task";

/// Path of the state endpoint for one task.
pub fn task_state_path(task_id: &str) -> String {
    format!("tasks/{task_id}/state")
}

/// Path of the SSE state stream for one task.
pub fn task_state_stream_path(task_id: &str) -> String {
    format!("tasks/{task_id}/state/stream")
}
