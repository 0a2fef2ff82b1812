/// Main error type for the orchestration core
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    // === Command Channel Errors ===
    #[error("Command endpoint unavailable for {fleet}/{robot}")]
    EndpointUnavailable { fleet: String, robot: String },

    #[error("Goal rejected by {fleet}/{robot}")]
    GoalRejected { fleet: String, robot: String },

    #[error("Goal aborted by {fleet}/{robot}")]
    GoalAborted { fleet: String, robot: String },

    #[error("Goal ended with unexpected status: {status}")]
    GoalFailed { status: String },

    // === Task API Errors ===
    #[error("Task dispatch rejected: {reason}")]
    TaskRejected { reason: String },

    #[error("Task {task_id} reached terminal status {status} before standby")]
    TaskNotAssignable { task_id: String, status: String },

    #[error("Protocol error: {reason}")]
    Protocol { reason: String },

    // === Conflict Errors ===
    #[error("End event already in progress for {fleet}/{robot}")]
    EndEventInFlight { fleet: String, robot: String },

    // === Validation Errors ===
    #[error("Validation error: {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Invalid parallel behavior: {value}")]
    InvalidParallelBehavior { value: String },

    #[error("Invalid configuration: {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // === Network/IO Errors ===
    #[error("Network error: {operation}: {reason}")]
    Network { operation: String, reason: String },

    #[error("Serialization error: {format}: {reason}")]
    Serialization { format: String, reason: String },

    // === Timeout Errors ===
    #[error("Operation timed out: {operation} after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    // === General System Errors ===
    #[error("Internal error: {component}: {reason}")]
    Internal { component: String, reason: String },
}

/// Convenience type alias
pub type FleetResult<T> = std::result::Result<T, FleetError>;

impl FleetError {
    /// Whether this error is a conflict outcome rather than a genuine
    /// failure: the request was deliberately not started because another
    /// operation holds the robot.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::EndEventInFlight { .. })
    }
}

/// Convert common errors to `FleetError`
impl From<serde_json::Error> for FleetError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            format: "json".to_string(),
            reason: error.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for FleetError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization {
            format: "yaml".to_string(),
            reason: error.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for FleetError {
    fn from(error: tokio::task::JoinError) -> Self {
        let reason = if error.is_cancelled() {
            "task cancelled".to_string()
        } else if error.is_panic() {
            "task panicked".to_string()
        } else {
            error.to_string()
        };

        Self::Internal {
            component: "task".to_string(),
            reason,
        }
    }
}

impl From<fms_client::FmsError> for FleetError {
    fn from(error: fms_client::FmsError) -> Self {
        use fms_client::FmsError;
        match error {
            FmsError::NetworkError { message } => Self::Network {
                operation: "task_api".to_string(),
                reason: message,
            },
            FmsError::SerializationError { message } => Self::Serialization {
                format: "json".to_string(),
                reason: message,
            },
            FmsError::ApiError { message, .. } => Self::TaskRejected { reason: message },
            FmsError::InvalidParameter { message } => Self::Validation {
                field: "task_api".to_string(),
                reason: message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_to_string_contains_context() {
        let err = FleetError::Validation {
            field: "dynamic_event_id".into(),
            reason: "missing".into(),
        };
        let message = err.to_string();
        assert!(message.contains("dynamic_event_id"));
        assert!(message.contains("missing"));
    }

    #[test]
    fn conflict_errors_are_distinguishable() {
        let conflict = FleetError::EndEventInFlight {
            fleet: "f1".into(),
            robot: "r1".into(),
        };
        let failure = FleetError::GoalRejected {
            fleet: "f1".into(),
            robot: "r1".into(),
        };
        assert!(conflict.is_conflict());
        assert!(!failure.is_conflict());
    }
}
