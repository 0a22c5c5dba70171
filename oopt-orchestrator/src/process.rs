//! The seam between the agent and whatever runs the device processes.

use std::time::Duration;

use crate::error::OrchestratorError;

/// Starts, stops and reports on the device-management processes.
///
/// Every process runs as one pod named after it; manifests are passed in
/// already rendered.
pub trait ProcessOrchestrator {
    /// Create or replace the config map `name` from `manifest`.
    fn apply_config_map(&mut self, name: &str, manifest: &str) -> Result<(), OrchestratorError>;

    /// Delete `pod` if it is running, then create it from `manifest`.
    fn restart(&mut self, pod: &str, manifest: &str) -> Result<(), OrchestratorError>;

    /// Block until `pod` reports ready, or fail after `timeout`.
    fn wait_ready(&mut self, pod: &str, timeout: Duration) -> Result<(), OrchestratorError>;

    /// Delete `pod` if it is running.
    fn stop(&mut self, pod: &str) -> Result<(), OrchestratorError>;

    /// Human-readable listing of the running pods.
    fn status(&mut self) -> Result<String, OrchestratorError>;
}
