//! Shared in-memory state: the per-robot context store and the
//! telemetry caches. This is the only state shared across components;
//! everything reads and writes through these accessors.

pub mod robots;
pub mod telemetry;

pub use robots::{robot_key, RobotContextStore, RobotRecord, RobotUpdate};
pub use telemetry::{NamedWaypoint, TelemetryCache};
