//! Process orchestration for the transponder agent: the
//! [`ProcessOrchestrator`] seam, its `kubectl` implementation, and the full
//! reboot and stop sequences.

mod error;
pub mod kubectl;
pub mod logging;
pub mod paths;
pub mod process;
pub mod reboot;
pub mod recording;

pub use error::OrchestratorError;
pub use kubectl::KubectlOrchestrator;
pub use logging::{init_tracing, LogFormat};
pub use process::ProcessOrchestrator;
pub use reboot::{reboot_system, stop_system, RebootReport};
pub use recording::RecordingOrchestrator;
