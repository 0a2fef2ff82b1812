pub mod command;
pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod goals;
pub mod ingest;
pub mod store;
pub mod tasks;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

// Re-export key types for easier access
pub use fms_types as fms;
pub use config::FleetKitConfig;
pub use context::{FleetOrchestrator, OrchestratorContext};
pub use errors::{FleetError, FleetResult};
