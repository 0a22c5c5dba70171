use std::path::PathBuf;

use thiserror::Error;

/// Error surface for process management and the reboot sequence.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed (status {status}): {stdout} {stderr}")]
    Command {
        program: String,
        status: String,
        stdout: String,
        stderr: String,
    },

    #[error("pod {pod} not ready after {timeout_secs}s")]
    NotReady { pod: String, timeout_secs: u64 },

    #[error("render error: {0}")]
    Render(#[from] oopt_renderer::RenderError),

    #[error("backend error: {0}")]
    Backend(#[from] oopt_sync::BackendError),

    #[error("reconcile error: {0}")]
    Reconcile(#[from] oopt_sync::ReconcileError),

    #[error(transparent)]
    Config(#[from] oopt_core::ConfigError),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> OrchestratorError {
    OrchestratorError::Io {
        path: path.into(),
        source,
    }
}
