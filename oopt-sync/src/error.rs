//! Error types for oopt-sync.

use std::path::PathBuf;

use thiserror::Error;

use oopt_core::{ConfigError, RevisionError};

/// Failures of the device-state table store.
#[derive(Debug, Error)]
pub enum BackendError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("table store JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse table store {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A stored field does not have the expected shape.
    #[error("{key}: unexpected value for {field}: '{value}'")]
    InvalidField {
        key: String,
        field: String,
        value: String,
    },
}

/// Failures while applying change records to the backend.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors from the commit and rollback pipeline.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("revision store error: {0}")]
    Revision(#[from] RevisionError),

    #[error("reconcile failed: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Convenience constructor for [`BackendError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> BackendError {
    BackendError::Io {
        path: path.into(),
        source,
    }
}
