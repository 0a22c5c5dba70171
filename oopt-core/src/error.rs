//! Error types for oopt-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::names::ModuleChannel;
use crate::validate::Violation;

/// Errors raised by tree edits, validation, defaulting and queries.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("port {0} doesn't exist")]
    UnknownPort(String),

    #[error("interface {0} doesn't exist")]
    UnknownInterface(String),

    #[error("optical-module {0} doesn't exist")]
    UnknownOpticalModule(String),

    /// An entity name that does not follow the `<Prefix><index>` convention.
    #[error("invalid {kind} name: {name}")]
    InvalidName { kind: &'static str, name: String },

    #[error("unknown {kind} '{value}', expected one of: {expected}")]
    UnknownEnumName {
        kind: &'static str,
        value: String,
        expected: String,
    },

    /// Two entries of one name table spell the same name or map the same variant.
    #[error("name table {kind} is not bijective at '{name}'")]
    NameTable { kind: &'static str, name: String },

    #[error("supported num-channels: 1, 2 or 4 (got {0})")]
    InvalidNumChannels(u8),

    #[error("num-channels is already set to {0}")]
    NumChannelsUnchanged(u8),

    #[error("id must be between 100 and 4000 (got {0})")]
    ConnectionIdOutOfRange(u32),

    #[error("interval can't be less than 5 seconds (got {0})")]
    BerIntervalTooShort(u32),

    #[error("frequency channel can't be 0")]
    ZeroFrequencyChannel,

    #[error("{module} channel {channel}: assigned to channel with no capacity, check modulation format")]
    NoCapacity {
        module: String,
        channel: ModuleChannel,
    },

    /// Final or structural validation rejected the tree.
    #[error("invalid configuration: {}", join_violations(.0))]
    Invalid(Vec<Violation>),

    #[error("path '{0}' not found in configuration")]
    PathNotFound(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors from the revision store and the settings file.
#[derive(Debug, Error)]
pub enum RevisionError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A stored document failed to parse; carries the offending file.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse settings at {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("configuration repository not initialized at {path}; run `oopt init`")]
    NotInitialized { path: PathBuf },

    #[error("configuration repository already initialized at {path}; use --force to re-provision")]
    AlreadyInitialized { path: PathBuf },

    #[error("no revision {offset} steps before HEAD ({available} revisions recorded)")]
    NoSuchRevision { offset: usize, available: usize },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RevisionError {
    RevisionError::Io {
        path: path.into(),
        source,
    }
}
