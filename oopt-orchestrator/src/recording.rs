//! In-memory [`ProcessOrchestrator`] that records what it was asked to do.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::OrchestratorError;
use crate::process::ProcessOrchestrator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ConfigMap { name: String, manifest: String },
    Restart { pod: String, manifest: String },
    WaitReady { pod: String },
    Stop { pod: String },
}

impl Event {
    /// Short form used when comparing sequences: `"restart redis"`.
    pub fn label(&self) -> String {
        match self {
            Event::ConfigMap { name, .. } => format!("config-map {name}"),
            Event::Restart { pod, .. } => format!("restart {pod}"),
            Event::WaitReady { pod } => format!("wait {pod}"),
            Event::Stop { pod } => format!("stop {pod}"),
        }
    }
}

/// Keeps the set of running pods; `stop` only records pods in it. Pods
/// named in `never_ready` fail `wait_ready`.
#[derive(Debug, Default)]
pub struct RecordingOrchestrator {
    pub events: Vec<Event>,
    pub running: BTreeSet<String>,
    pub never_ready: BTreeSet<String>,
}

impl RecordingOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.events.iter().map(Event::label).collect()
    }
}

impl ProcessOrchestrator for RecordingOrchestrator {
    fn apply_config_map(&mut self, name: &str, manifest: &str) -> Result<(), OrchestratorError> {
        self.events.push(Event::ConfigMap {
            name: name.to_owned(),
            manifest: manifest.to_owned(),
        });
        Ok(())
    }

    fn restart(&mut self, pod: &str, manifest: &str) -> Result<(), OrchestratorError> {
        self.running.insert(pod.to_owned());
        self.events.push(Event::Restart {
            pod: pod.to_owned(),
            manifest: manifest.to_owned(),
        });
        Ok(())
    }

    fn wait_ready(&mut self, pod: &str, timeout: Duration) -> Result<(), OrchestratorError> {
        self.events.push(Event::WaitReady { pod: pod.to_owned() });
        if self.never_ready.contains(pod) || !self.running.contains(pod) {
            return Err(OrchestratorError::NotReady {
                pod: pod.to_owned(),
                timeout_secs: timeout.as_secs(),
            });
        }
        Ok(())
    }

    fn stop(&mut self, pod: &str) -> Result<(), OrchestratorError> {
        if self.running.remove(pod) {
            self.events.push(Event::Stop { pod: pod.to_owned() });
        }
        Ok(())
    }

    fn status(&mut self) -> Result<String, OrchestratorError> {
        let mut out = String::from("NAME STATUS\n");
        for pod in &self.running {
            out.push_str(&format!("{pod} Running\n"));
        }
        Ok(out)
    }
}
