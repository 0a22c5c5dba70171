//! Linear, append-only configuration history.
//!
//! On disk, rooted at the configuration directory:
//!
//! ```text
//! <root>/config.json                     candidate tree (edited in place)
//! <root>/settings.yaml                   agent settings (kept across re-provisioning)
//! <root>/history/index.json              revision metadata, oldest first
//! <root>/history/revisions/<id>.json     one committed tree per revision
//! ```
//!
//! Revision ids are the SHA-256 of the parent id, message, timestamp and
//! document. All writes use an atomic `.tmp` + rename.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{io_err, RevisionError};
use crate::settings::SETTINGS_FILE;
use crate::types::ConfigTree;

pub const CONFIG_FILE: &str = "config.json";
pub const HISTORY_DIR: &str = "history";
pub const INDEX_FILE: &str = "index.json";
pub const REVISIONS_DIR: &str = "revisions";
/// User template overrides; survive re-provisioning like the settings file.
pub const TEMPLATES_DIR: &str = "templates";

pub const INITIAL_COMMIT_MESSAGE: &str = "initial commit";

// ---------------------------------------------------------------------------
// Revision metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(pub String);

impl RevisionId {
    /// First seven hex digits, for display.
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionMeta {
    pub id: RevisionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<RevisionId>,
    pub message: String,
    pub committed_at: DateTime<Utc>,
}

fn revision_id(
    parent: Option<&RevisionId>,
    message: &str,
    at: &DateTime<Utc>,
    document: &str,
) -> RevisionId {
    let mut hasher = Sha256::new();
    if let Some(parent) = parent {
        hasher.update(parent.0.as_bytes());
    }
    hasher.update(b"\n");
    hasher.update(message.as_bytes());
    hasher.update(b"\n");
    hasher.update(at.to_rfc3339().as_bytes());
    hasher.update(b"\n");
    hasher.update(document.as_bytes());
    RevisionId(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// Store interface
// ---------------------------------------------------------------------------

/// Versioned snapshot storage. History is strictly linear.
pub trait ConfigStore {
    /// The tree at HEAD.
    fn current_revision(&self) -> Result<ConfigTree, RevisionError> {
        self.revision_at(0)
    }

    /// Append `tree` as the new HEAD.
    fn commit_revision(&mut self, tree: &ConfigTree, message: &str)
        -> Result<RevisionId, RevisionError>;

    /// The tree `offset` commits before HEAD (`0` is HEAD).
    fn revision_at(&self, offset: usize) -> Result<ConfigTree, RevisionError>;

    /// Every revision, newest first.
    fn list_revisions(&self) -> Result<Vec<RevisionMeta>, RevisionError>;
}

// ---------------------------------------------------------------------------
// Filesystem store
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryIndex {
    revisions: Vec<RevisionMeta>,
}

/// [`ConfigStore`] backed by JSON files under one directory.
#[derive(Debug, Clone)]
pub struct FsConfigStore {
    root: PathBuf,
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), RevisionError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

fn read_tree(path: &Path) -> Result<ConfigTree, RevisionError> {
    let text = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    let mut tree: ConfigTree =
        serde_json::from_str(&text).map_err(|source| RevisionError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    tree.clear_derived();
    Ok(tree)
}

impl FsConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn candidate_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(HISTORY_DIR).join(INDEX_FILE)
    }

    fn revision_path(&self, id: &RevisionId) -> PathBuf {
        self.root
            .join(HISTORY_DIR)
            .join(REVISIONS_DIR)
            .join(format!("{id}.json"))
    }

    pub fn is_initialized(&self) -> bool {
        self.index_path().exists()
    }

    fn load_index(&self) -> Result<HistoryIndex, RevisionError> {
        let path = self.index_path();
        if !path.exists() {
            return Err(RevisionError::NotInitialized {
                path: self.root.clone(),
            });
        }
        let text = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        serde_json::from_str(&text).map_err(|source| RevisionError::Parse { path, source })
    }

    fn save_index(&self, index: &HistoryIndex) -> Result<(), RevisionError> {
        let json = serde_json::to_string_pretty(index)?;
        write_atomic(&self.index_path(), &json)
    }

    /// Provision the factory configuration and record it as the first
    /// revision. With `force`, existing history and candidate are discarded;
    /// `settings.yaml` and user templates are kept.
    pub fn init(&mut self, force: bool) -> Result<RevisionId, RevisionError> {
        if self.is_initialized() {
            if !force {
                return Err(RevisionError::AlreadyInitialized {
                    path: self.root.clone(),
                });
            }
            self.remove_contents()?;
        }
        std::fs::create_dir_all(&self.root).map_err(|e| io_err(&self.root, e))?;

        let tree = ConfigTree::provisioned();
        self.save_candidate(&tree)?;
        let id = self.commit_revision(&tree, INITIAL_COMMIT_MESSAGE)?;
        info!(root = %self.root.display(), revision = id.short(), "configuration provisioned");
        Ok(id)
    }

    fn remove_contents(&self) -> Result<(), RevisionError> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| io_err(&self.root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.root, e))?;
            let name = entry.file_name();
            if name == SETTINGS_FILE || name == TEMPLATES_DIR {
                continue;
            }
            let path = entry.path();
            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            result.map_err(|e| io_err(&path, e))?;
            debug!(path = %path.display(), "removed");
        }
        Ok(())
    }

    pub fn load_candidate(&self) -> Result<ConfigTree, RevisionError> {
        let path = self.candidate_path();
        if !path.exists() {
            return Err(RevisionError::NotInitialized {
                path: self.root.clone(),
            });
        }
        read_tree(&path)
    }

    pub fn save_candidate(&self, tree: &ConfigTree) -> Result<(), RevisionError> {
        write_atomic(&self.candidate_path(), &tree.to_json()?)
    }
}

impl ConfigStore for FsConfigStore {
    fn commit_revision(
        &mut self,
        tree: &ConfigTree,
        message: &str,
    ) -> Result<RevisionId, RevisionError> {
        let mut index = match self.load_index() {
            Ok(index) => index,
            Err(RevisionError::NotInitialized { .. }) => HistoryIndex::default(),
            Err(e) => return Err(e),
        };
        let document = tree.to_json()?;
        let parent = index.revisions.last().map(|m| m.id.clone());
        let committed_at = Utc::now();
        let id = revision_id(parent.as_ref(), message, &committed_at, &document);

        write_atomic(&self.revision_path(&id), &document)?;
        index.revisions.push(RevisionMeta {
            id: id.clone(),
            parent,
            message: message.to_owned(),
            committed_at,
        });
        self.save_index(&index)?;
        debug!(revision = id.short(), message, "revision committed");
        Ok(id)
    }

    fn revision_at(&self, offset: usize) -> Result<ConfigTree, RevisionError> {
        let index = self.load_index()?;
        let available = index.revisions.len();
        let meta = offset
            .checked_add(1)
            .and_then(|back| available.checked_sub(back))
            .and_then(|i| index.revisions.get(i))
            .ok_or(RevisionError::NoSuchRevision { offset, available })?;
        read_tree(&self.revision_path(&meta.id))
    }

    fn list_revisions(&self) -> Result<Vec<RevisionMeta>, RevisionError> {
        let mut revisions = self.load_index()?.revisions;
        revisions.reverse();
        Ok(revisions)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// [`ConfigStore`] kept entirely in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryConfigStore {
    revisions: Vec<(RevisionMeta, ConfigTree)>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding one revision: `tree`, committed as the initial commit.
    pub fn with_initial(tree: &ConfigTree) -> Result<Self, RevisionError> {
        let mut store = Self::new();
        store.commit_revision(tree, INITIAL_COMMIT_MESSAGE)?;
        Ok(store)
    }
}

impl ConfigStore for MemoryConfigStore {
    fn commit_revision(
        &mut self,
        tree: &ConfigTree,
        message: &str,
    ) -> Result<RevisionId, RevisionError> {
        let document = tree.to_json()?;
        let parent = self.revisions.last().map(|(m, _)| m.id.clone());
        let committed_at = Utc::now();
        let id = revision_id(parent.as_ref(), message, &committed_at, &document);
        let mut stored = tree.clone();
        stored.clear_derived();
        self.revisions.push((
            RevisionMeta {
                id: id.clone(),
                parent,
                message: message.to_owned(),
                committed_at,
            },
            stored,
        ));
        Ok(id)
    }

    fn revision_at(&self, offset: usize) -> Result<ConfigTree, RevisionError> {
        let available = self.revisions.len();
        offset
            .checked_add(1)
            .and_then(|back| available.checked_sub(back))
            .and_then(|i| self.revisions.get(i))
            .map(|(_, tree)| tree.clone())
            .ok_or(RevisionError::NoSuchRevision { offset, available })
    }

    fn list_revisions(&self) -> Result<Vec<RevisionMeta>, RevisionError> {
        Ok(self.revisions.iter().rev().map(|(m, _)| m.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn init_provisions_and_commits() {
        let tmp = TempDir::new().expect("tempdir");
        let mut store = FsConfigStore::new(tmp.path());
        assert!(!store.is_initialized());
        store.init(false).expect("init");

        assert_eq!(store.load_candidate().expect("candidate"), ConfigTree::provisioned());
        assert_eq!(store.current_revision().expect("head"), ConfigTree::provisioned());
        let log = store.list_revisions().expect("log");
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].message, "initial commit");
        assert!(log[0].parent.is_none());
        assert_eq!(log[0].id.0.len(), 64);
    }

    #[test]
    fn second_init_requires_force() {
        let tmp = TempDir::new().expect("tempdir");
        let mut store = FsConfigStore::new(tmp.path());
        store.init(false).expect("init");
        assert!(matches!(
            store.init(false),
            Err(RevisionError::AlreadyInitialized { .. })
        ));
    }

    #[test]
    fn forced_init_discards_history_but_keeps_settings() {
        let tmp = TempDir::new().expect("tempdir");
        let mut store = FsConfigStore::new(tmp.path());
        store.init(false).expect("init");
        std::fs::write(tmp.path().join(SETTINGS_FILE), "state_db_ready_timeout_secs: 3\n")
            .expect("settings");
        std::fs::write(tmp.path().join("redis.yml"), "stale manifest").expect("manifest");

        let mut tree = store.load_candidate().expect("candidate");
        tree.set_allow_oversubscription(true);
        store.commit_revision(&tree, "second").expect("commit");
        assert_eq!(store.list_revisions().expect("log").len(), 2);

        store.init(true).expect("force init");
        assert_eq!(store.list_revisions().expect("log").len(), 1);
        assert!(tmp.path().join(SETTINGS_FILE).exists());
        assert!(!tmp.path().join("redis.yml").exists());
        assert!(!store.current_revision().expect("head").allow_oversubscription);
    }

    #[test]
    fn revisions_are_linear_and_addressable_by_offset() {
        let tmp = TempDir::new().expect("tempdir");
        let mut store = FsConfigStore::new(tmp.path());
        store.init(false).expect("init");

        let mut tree = ConfigTree::provisioned();
        tree.set_ber_interval("Opt1", 10).expect("ber");
        let second = store.commit_revision(&tree, "ber 10").expect("commit");
        tree.set_ber_interval("Opt1", 20).expect("ber");
        store.commit_revision(&tree, "ber 20").expect("commit");

        let ber = |offset| {
            store
                .revision_at(offset)
                .expect("revision")
                .optical_module("Opt1")
                .expect("module")
                .ber_interval
        };
        assert_eq!(ber(0), Some(20));
        assert_eq!(ber(1), Some(10));
        assert_eq!(ber(2), None);
        assert!(matches!(
            store.revision_at(3),
            Err(RevisionError::NoSuchRevision { offset: 3, available: 3 })
        ));
        assert!(matches!(
            store.revision_at(usize::MAX),
            Err(RevisionError::NoSuchRevision { offset: usize::MAX, available: 3 })
        ));

        let log = store.list_revisions().expect("log");
        assert_eq!(log[0].parent.as_ref(), Some(&second));
        assert_eq!(log[1].message, "ber 10");
    }

    #[test]
    fn uninitialized_store_reports_it() {
        let tmp = TempDir::new().expect("tempdir");
        let store = FsConfigStore::new(tmp.path().join("missing"));
        assert!(matches!(
            store.current_revision(),
            Err(RevisionError::NotInitialized { .. })
        ));
        assert!(matches!(
            store.load_candidate(),
            Err(RevisionError::NotInitialized { .. })
        ));
    }

    #[test]
    fn no_tmp_files_left_behind() {
        let tmp = TempDir::new().expect("tempdir");
        let mut store = FsConfigStore::new(tmp.path());
        store.init(false).expect("init");
        assert!(!tmp.path().join("config.json.tmp").exists());
        assert!(!tmp.path().join(HISTORY_DIR).join("index.json.tmp").exists());
    }

    #[test]
    fn memory_store_matches_fs_semantics() {
        let mut store = MemoryConfigStore::with_initial(&ConfigTree::provisioned()).expect("store");
        let mut tree = ConfigTree::provisioned();
        tree.set_prbs("Opt2", true).expect("prbs");
        store.commit_revision(&tree, "prbs").expect("commit");
        assert_eq!(store.current_revision().expect("head"), tree);
        assert_eq!(store.revision_at(1).expect("prev"), ConfigTree::provisioned());
        assert_eq!(store.list_revisions().expect("log")[0].message, "prbs");
        assert!(matches!(
            store.revision_at(usize::MAX),
            Err(RevisionError::NoSuchRevision { offset: usize::MAX, available: 2 })
        ));
    }

    #[test]
    fn short_id() {
        let id = RevisionId("0123456789abcdef".into());
        assert_eq!(id.short(), "0123456");
        assert_eq!(RevisionId("abc".into()).short(), "abc");
    }
}
