//! # Fleet-Management-System API Client
//!
//! This crate provides a client for the fleet manager's task API over
//! HTTP/HTTPS. It supports task dispatch (robot-specific and
//! fleet-dispatch variants), task state retrieval, and a streaming
//! subscription to per-task state updates via Server-Sent Events.
//!
//! ## Example
//!
//! ```rust,no_run
//! use fms_client::FmsClient;
//! use fms_types::TaskRequest;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = FmsClient::new("https://fleet.example.com")?
//!     .with_auth_token("your_api_key");
//!
//! let request = TaskRequest::compose(json!({"category": "go_to_place", "phases": []}))
//!     .with_requester("fleetkit");
//!
//! let state = client.dispatch_robot_task("f1", "r1", &request).await?;
//! println!("booked: {:?}", state.booking_id());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod constants;
pub mod error;

pub use client::FmsClient;
pub use error::{FmsError, FmsResult};
