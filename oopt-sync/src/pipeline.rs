//! Commit and rollback.
//!
//! A commit validates the candidate, appends it to the revision store, diffs
//! the two newest revisions and reconciles the difference into the backend.
//! Whether the device then has to be reconfigured as a whole is reported
//! back; performing the reboot is up to the caller.

use chrono::{SecondsFormat, Utc};
use tracing::info;

use oopt_core::validate::ensure_valid;
use oopt_core::{ConfigStore, ConfigTree, RevisionError, RevisionId};

use crate::diff::{diff, document_diff, ChangeRecord};
use crate::error::SyncError;
use crate::reconcile::{reconcile, ReconcileOutcome};
use crate::table_store::TableStore;

#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub revision: RevisionId,
    /// Records between the previous HEAD and the new one. Empty when the
    /// diff was skipped for a forced reboot.
    pub records: Vec<ChangeRecord>,
    pub reconcile: ReconcileOutcome,
    pub must_reboot: bool,
}

/// Message used when none is given.
pub fn default_commit_message() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Commit `candidate` and apply it to `backend`.
///
/// With `force_reboot`, nothing is diffed or reconciled and the outcome
/// always asks for a reboot.
pub fn commit_candidate(
    store: &mut dyn ConfigStore,
    backend: &mut dyn TableStore,
    candidate: &ConfigTree,
    message: Option<&str>,
    force_reboot: bool,
) -> Result<CommitOutcome, SyncError> {
    ensure_valid(candidate)?;
    let message = message.map_or_else(default_commit_message, str::to_owned);
    let revision = store.commit_revision(candidate, &message)?;
    info!(revision = revision.short(), %message, "committed");

    if force_reboot {
        return Ok(CommitOutcome {
            revision,
            records: Vec::new(),
            reconcile: ReconcileOutcome::default(),
            must_reboot: true,
        });
    }

    let old = store.revision_at(1)?;
    let new = store.revision_at(0)?;
    let records = diff(&old, &new)?;
    let outcome = reconcile(&old, &new, &records, backend)?;
    info!(
        records = records.len(),
        mutations = outcome.mutations.len(),
        must_reboot = outcome.must_reboot,
        "reconciled"
    );
    Ok(CommitOutcome {
        revision,
        must_reboot: outcome.must_reboot,
        records,
        reconcile: outcome,
    })
}

/// Re-commit the tree `n + 1` revisions before HEAD. Returns the restored
/// tree, which becomes the new candidate.
pub fn rollback(
    store: &mut dyn ConfigStore,
    backend: &mut dyn TableStore,
    n: usize,
    message: Option<&str>,
    force_reboot: bool,
) -> Result<(ConfigTree, CommitOutcome), SyncError> {
    let Some(offset) = n.checked_add(1) else {
        let available = store.list_revisions()?.len();
        return Err(RevisionError::NoSuchRevision { offset: n, available }.into());
    };
    let tree = store.revision_at(offset)?;
    let message = match message {
        Some(m) => m.to_owned(),
        None => format!("rollback({n}) {}", default_commit_message()),
    };
    let outcome = commit_candidate(store, backend, &tree, Some(&message), force_reboot)?;
    Ok((tree, outcome))
}

/// Change records the candidate would produce against HEAD.
pub fn pending_changes(
    store: &dyn ConfigStore,
    candidate: &ConfigTree,
) -> Result<Vec<ChangeRecord>, SyncError> {
    let head = store.current_revision()?;
    Ok(diff(&head, candidate)?)
}

/// Unified diff of the HEAD document against the candidate.
pub fn pending_document_diff(store: &dyn ConfigStore, candidate: &ConfigTree) -> Result<String, SyncError> {
    let head = store.current_revision()?;
    Ok(document_diff(&head, candidate)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table_store::{Database, MemoryTableStore, VLAN_TABLE};
    use oopt_core::{ChannelSpeed, ConfigError, MemoryConfigStore, ModuleChannel};

    fn connected() -> ConfigTree {
        let mut tree = ConfigTree::provisioned();
        tree.set_connection_id("Ethernet1", 100).expect("id");
        tree.set_connection_module("Ethernet1", "Opt1").expect("module");
        tree.set_connection_channel("Ethernet1", ModuleChannel::A).expect("channel");
        tree
    }

    fn fresh() -> (MemoryConfigStore, MemoryTableStore) {
        let store = MemoryConfigStore::with_initial(&ConfigTree::provisioned()).expect("store");
        (store, MemoryTableStore::new())
    }

    #[test]
    fn commit_reconciles_against_previous_head() {
        let (mut store, mut backend) = fresh();
        let outcome = commit_candidate(&mut store, &mut backend, &connected(), Some("connect"), false)
            .expect("commit");
        assert!(!outcome.must_reboot);
        assert_eq!(outcome.records.len(), 3);
        assert!(backend.get_entry(Database::Config, VLAN_TABLE, "Vlan100").expect("get").is_some());
        let log = store.list_revisions().expect("log");
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].message, "connect");
    }

    #[test]
    fn invalid_candidate_is_not_committed() {
        let (mut store, mut backend) = fresh();
        let mut candidate = ConfigTree::provisioned();
        candidate.set_connection_id("Ethernet1", 100).expect("id");
        let err = commit_candidate(&mut store, &mut backend, &candidate, None, false).expect_err("invalid");
        assert!(matches!(err, SyncError::Config(ConfigError::Invalid(_))), "{err}");
        assert_eq!(store.list_revisions().expect("log").len(), 1);
    }

    #[test]
    fn breakout_commit_asks_for_reboot() {
        let (mut store, mut backend) = fresh();
        let mut candidate = ConfigTree::provisioned();
        candidate.set_num_channels("Port1", 4).expect("breakout");
        candidate.set_channel_speed("Port1", ChannelSpeed::Speed25Gb).expect("speed");
        let outcome = commit_candidate(&mut store, &mut backend, &candidate, None, false).expect("commit");
        assert!(outcome.must_reboot);
        assert!(outcome.reconcile.mutations.is_empty());
    }

    #[test]
    fn forced_reboot_skips_reconcile() {
        let (mut store, mut backend) = fresh();
        let outcome = commit_candidate(&mut store, &mut backend, &connected(), None, true).expect("commit");
        assert!(outcome.must_reboot);
        assert!(outcome.records.is_empty());
        assert!(backend.get_table(Database::Config, VLAN_TABLE).expect("table").is_empty());
    }

    #[test]
    fn rollback_restores_previous_revision() {
        let (mut store, mut backend) = fresh();
        commit_candidate(&mut store, &mut backend, &connected(), None, false).expect("commit");

        let (tree, outcome) = rollback(&mut store, &mut backend, 0, None, false).expect("rollback");
        assert_eq!(tree, ConfigTree::provisioned());
        assert!(!outcome.must_reboot);
        assert!(backend.get_table(Database::Config, VLAN_TABLE).expect("table").is_empty());
        let log = store.list_revisions().expect("log");
        assert_eq!(log.len(), 3);
        assert!(log[0].message.starts_with("rollback(0) "), "{}", log[0].message);
    }

    #[test]
    fn rollback_beyond_history_fails() {
        let (mut store, mut backend) = fresh();
        assert!(matches!(
            rollback(&mut store, &mut backend, 3, None, false),
            Err(SyncError::Revision(_))
        ));
    }

    #[test]
    fn rollback_with_huge_count_fails() {
        let (mut store, mut backend) = fresh();
        let err = rollback(&mut store, &mut backend, usize::MAX, None, false).expect_err("no such revision");
        assert!(
            matches!(
                err,
                SyncError::Revision(RevisionError::NoSuchRevision { offset: usize::MAX, available: 1 })
            ),
            "{err}"
        );
        assert_eq!(store.list_revisions().expect("log").len(), 1);
    }

    #[test]
    fn pending_changes_compare_with_head() {
        let (store, _) = fresh();
        assert!(pending_changes(&store, &ConfigTree::provisioned()).expect("diff").is_empty());
        assert_eq!(pending_changes(&store, &connected()).expect("diff").len(), 3);
        let text = pending_document_diff(&store, &connected()).expect("diff");
        assert!(text.contains("+++ b/config.json"));
    }
}
