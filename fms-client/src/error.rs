//! Error types for fleet-management API operations.

use thiserror::Error;

/// Main error type for fleet-management API operations.
#[derive(Debug, Error)]
pub enum FmsError {
    /// Network communication error
    #[error("Network error: {message}")]
    NetworkError { message: String },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {message}")]
    SerializationError { message: String },

    /// The fleet manager refused the request
    #[error("Fleet manager error: {message}")]
    ApiError { message: String, code: Option<i64> },

    /// Invalid configuration or parameters
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },
}

/// Convenience type alias for Results with FmsError
pub type FmsResult<T> = std::result::Result<T, FmsError>;

impl From<reqwest::Error> for FmsError {
    fn from(error: reqwest::Error) -> Self {
        FmsError::NetworkError {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for FmsError {
    fn from(error: serde_json::Error) -> Self {
        FmsError::SerializationError {
            message: error.to_string(),
        }
    }
}
