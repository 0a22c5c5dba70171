//! Error types for oopt-renderer.

use std::path::PathBuf;

use thiserror::Error;

use oopt_core::ConfigError;

/// All errors that can arise from template rendering operations.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Tera template engine error.
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// The tree could not be turned into a rendering context.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Filesystem error while loading user templates.
    #[error("template io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
