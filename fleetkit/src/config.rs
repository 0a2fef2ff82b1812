//! Orchestrator configuration.
//!
//! All knobs are serde-deserializable with defaults, so a config file
//! only needs to name what it changes. Use [`FleetKitConfig::from_yaml`]
//! or [`FleetKitConfig::from_json`] to load, then [`FleetKitConfig::validate`]
//! before wiring components.

use crate::errors::{FleetError, FleetResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-stream fold intervals for telemetry ingestion, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_fleet_state_ms")]
    pub fleet_state_ms: u64,
    #[serde(default = "default_door_state_ms")]
    pub door_state_ms: u64,
    #[serde(default = "default_lift_state_ms")]
    pub lift_state_ms: u64,
    #[serde(default = "default_building_map_ms")]
    pub building_map_ms: u64,
}

fn default_fleet_state_ms() -> u64 {
    1000
}

fn default_door_state_ms() -> u64 {
    1000
}

fn default_lift_state_ms() -> u64 {
    1000
}

fn default_building_map_ms() -> u64 {
    5000
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            fleet_state_ms: default_fleet_state_ms(),
            door_state_ms: default_door_state_ms(),
            lift_state_ms: default_lift_state_ms(),
            building_map_ms: default_building_map_ms(),
        }
    }
}

/// Configuration of the orchestration core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetKitConfig {
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// How long `await_standby` waits for a task to become assignable.
    #[serde(default = "default_standby_timeout_ms")]
    pub standby_timeout_ms: u64,

    /// Task-state polling fallback interval while awaiting standby.
    #[serde(default = "default_task_poll_interval_ms")]
    pub task_poll_interval_ms: u64,

    /// Settle delay between a cancel and its replacement goal when the
    /// parallel behavior is `overwrite`.
    #[serde(default = "default_overwrite_settle_ms")]
    pub overwrite_settle_ms: u64,

    /// How long the command-endpoint reachability check may take.
    #[serde(default = "default_endpoint_timeout_ms")]
    pub endpoint_timeout_ms: u64,

    /// Buffer size of each context-event subscription channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_standby_timeout_ms() -> u64 {
    60_000
}

fn default_task_poll_interval_ms() -> u64 {
    2_000
}

fn default_overwrite_settle_ms() -> u64 {
    100
}

fn default_endpoint_timeout_ms() -> u64 {
    5_000
}

fn default_event_buffer() -> usize {
    1000
}

impl Default for FleetKitConfig {
    fn default() -> Self {
        Self {
            throttle: ThrottleConfig::default(),
            standby_timeout_ms: default_standby_timeout_ms(),
            task_poll_interval_ms: default_task_poll_interval_ms(),
            overwrite_settle_ms: default_overwrite_settle_ms(),
            endpoint_timeout_ms: default_endpoint_timeout_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl FleetKitConfig {
    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> FleetResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> FleetResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> FleetResult<()> {
        let intervals = [
            ("throttle.fleet_state_ms", self.throttle.fleet_state_ms),
            ("throttle.door_state_ms", self.throttle.door_state_ms),
            ("throttle.lift_state_ms", self.throttle.lift_state_ms),
            ("throttle.building_map_ms", self.throttle.building_map_ms),
            ("standby_timeout_ms", self.standby_timeout_ms),
            ("task_poll_interval_ms", self.task_poll_interval_ms),
            ("endpoint_timeout_ms", self.endpoint_timeout_ms),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(FleetError::InvalidConfiguration {
                    field: field.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        if self.task_poll_interval_ms >= self.standby_timeout_ms {
            return Err(FleetError::InvalidConfiguration {
                field: "task_poll_interval_ms".to_string(),
                reason: "must be shorter than standby_timeout_ms".to_string(),
            });
        }

        if self.event_buffer == 0 {
            return Err(FleetError::InvalidConfiguration {
                field: "event_buffer".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    pub fn standby_timeout(&self) -> Duration {
        Duration::from_millis(self.standby_timeout_ms)
    }

    pub fn task_poll_interval(&self) -> Duration {
        Duration::from_millis(self.task_poll_interval_ms)
    }

    pub fn overwrite_settle(&self) -> Duration {
        Duration::from_millis(self.overwrite_settle_ms)
    }

    pub fn endpoint_timeout(&self) -> Duration {
        Duration::from_millis(self.endpoint_timeout_ms)
    }
}
