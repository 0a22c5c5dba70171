//! # oopt-sync
//!
//! Everything between a committed configuration and the device-state
//! backend: the table store, change records, incremental reconcile, full
//! derivation for reconfiguration, state reads, and the commit pipeline.
//!
//! Call [`commit_candidate`] to commit and apply a candidate tree, or
//! [`rollback`] to re-commit an earlier revision.

pub mod derived;
pub mod diff;
pub mod error;
pub mod mutation;
pub mod pipeline;
pub mod reconcile;
pub mod state;
pub mod table_store;

pub use derived::{resync, switch_config, SwitchConfig};
pub use diff::{diff, document_diff, ChangeRecord, ChangeType, EntityKind};
pub use error::{BackendError, ReconcileError, SyncError};
pub use mutation::Mutation;
pub use pipeline::{commit_candidate, rollback, CommitOutcome};
pub use reconcile::{reconcile, ReconcileOutcome};
pub use table_store::{Database, FieldValue, FileTableStore, MemoryTableStore, Row, TableStore};
