//! Device-state table store.
//!
//! The backend is a set of numbered key-value databases. A row lives under
//! `<TABLE><sep><key>` and holds flat string fields. List fields are stored
//! comma-joined under `<field>@`, and a row with no fields is stored as
//! `NULL=NULL` so that it still exists.
//!
//! [`MemoryTableStore`] keeps everything in memory; [`FileTableStore`] keeps
//! one JSON document per database under a directory.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, BackendError};

// ---------------------------------------------------------------------------
// Table names
// ---------------------------------------------------------------------------

pub const MODULE_CONFIG_TABLE: &str = "MODULE_CONFIG_TABLE";
pub const MODULE_STATE_TABLE: &str = "MODULE_STATE_TABLE";
pub const VLAN_TABLE: &str = "VLAN";
pub const VLAN_MEMBER_TABLE: &str = "VLAN_MEMBER";
/// Switch port configuration in [`Database::Config`].
pub const PORT_TABLE: &str = "PORT";
/// Port state published in [`Database::Appl`].
pub const APPL_PORT_TABLE: &str = "PORT_TABLE";
pub const DEVICE_METADATA_TABLE: &str = "DEVICE_METADATA";
pub const DEVICE_METADATA_KEY: &str = "localhost";

// ---------------------------------------------------------------------------
// Databases and rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Database {
    /// Application state published by the network OS.
    Appl,
    /// Switch configuration.
    Config,
    TransportConfig,
    TransportState,
}

impl Database {
    pub fn all() -> [Database; 4] {
        [
            Database::Appl,
            Database::Config,
            Database::TransportConfig,
            Database::TransportState,
        ]
    }

    pub fn number(self) -> u8 {
        match self {
            Database::Appl => 0,
            Database::Config => 4,
            Database::TransportConfig => 7,
            Database::TransportState => 8,
        }
    }

    pub fn separator(self) -> char {
        match self {
            Database::Appl => ':',
            _ => '|',
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Database::Appl => "APPL_DB",
            Database::Config => "CONFIG_DB",
            Database::TransportConfig => "TRANSPORT_CONFIG_DB",
            Database::TransportState => "TRANSPORT_STATE_DB",
        }
    }

    /// Full row key: `<TABLE><sep><key>`.
    pub fn row_key(self, table: &str, key: &str) -> String {
        format!("{}{}{}", table.to_uppercase(), self.separator(), key)
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Str(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            FieldValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(l) => Some(l),
            FieldValue::Str(_) => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(l: Vec<String>) -> Self {
        FieldValue::List(l)
    }
}

/// One row, decoded.
pub type Row = BTreeMap<String, FieldValue>;

/// One row as stored: flat string fields.
pub type RawRow = BTreeMap<String, String>;

const NULL_FIELD: &str = "NULL";
const LIST_SUFFIX: char = '@';

pub fn encode_row(row: &Row) -> RawRow {
    if row.is_empty() {
        return RawRow::from([(NULL_FIELD.to_owned(), NULL_FIELD.to_owned())]);
    }
    row.iter()
        .map(|(field, value)| match value {
            FieldValue::Str(s) => (field.clone(), s.clone()),
            FieldValue::List(l) => (format!("{field}{LIST_SUFFIX}"), l.join(",")),
        })
        .collect()
}

pub fn decode_row(raw: &RawRow) -> Row {
    raw.iter()
        .filter(|(field, _)| field.as_str() != NULL_FIELD)
        .map(|(field, value)| match field.strip_suffix(LIST_SUFFIX) {
            Some(list_field) => {
                let items = value
                    .split(',')
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect();
                (list_field.to_owned(), FieldValue::List(items))
            }
            None => (field.clone(), FieldValue::Str(value.clone())),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Store interface
// ---------------------------------------------------------------------------

pub trait TableStore {
    fn get_entry(&self, db: Database, table: &str, key: &str) -> Result<Option<Row>, BackendError>;

    /// Replace the row: fields absent from `row` are removed.
    fn set_entry(&mut self, db: Database, table: &str, key: &str, row: &Row)
        -> Result<(), BackendError>;

    fn delete_entry(&mut self, db: Database, table: &str, key: &str) -> Result<(), BackendError>;

    /// Every row of `table`, keyed without the table prefix.
    fn get_table(&self, db: Database, table: &str) -> Result<BTreeMap<String, Row>, BackendError>;

    /// Merge `fields` into the row, creating it if needed.
    fn mod_entry(
        &mut self,
        db: Database,
        table: &str,
        key: &str,
        fields: &Row,
    ) -> Result<(), BackendError> {
        let mut row = self.get_entry(db, table, key)?.unwrap_or_default();
        row.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.set_entry(db, table, key, &row)
    }
}

// ---------------------------------------------------------------------------
// Raw tables shared by both stores
// ---------------------------------------------------------------------------

/// All rows of one database, by full row key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawDatabase(BTreeMap<String, RawRow>);

impl RawDatabase {
    fn get(&self, db: Database, table: &str, key: &str) -> Option<Row> {
        self.0.get(&db.row_key(table, key)).map(decode_row)
    }

    fn set(&mut self, db: Database, table: &str, key: &str, row: &Row) {
        self.0.insert(db.row_key(table, key), encode_row(row));
    }

    fn delete(&mut self, db: Database, table: &str, key: &str) {
        self.0.remove(&db.row_key(table, key));
    }

    fn table(&self, db: Database, table: &str) -> BTreeMap<String, Row> {
        let prefix = db.row_key(table, "");
        self.0
            .iter()
            .filter_map(|(full, raw)| {
                full.strip_prefix(&prefix)
                    .map(|key| (key.to_owned(), decode_row(raw)))
            })
            .collect()
    }

    /// Rows as stored, for inspection and dumps.
    pub fn rows(&self) -> &BTreeMap<String, RawRow> {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MemoryTableStore {
    dbs: BTreeMap<Database, RawDatabase>,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self, db: Database) -> Option<&RawDatabase> {
        self.dbs.get(&db)
    }
}

impl TableStore for MemoryTableStore {
    fn get_entry(&self, db: Database, table: &str, key: &str) -> Result<Option<Row>, BackendError> {
        Ok(self.dbs.get(&db).and_then(|d| d.get(db, table, key)))
    }

    fn set_entry(
        &mut self,
        db: Database,
        table: &str,
        key: &str,
        row: &Row,
    ) -> Result<(), BackendError> {
        self.dbs.entry(db).or_default().set(db, table, key, row);
        Ok(())
    }

    fn delete_entry(&mut self, db: Database, table: &str, key: &str) -> Result<(), BackendError> {
        if let Some(d) = self.dbs.get_mut(&db) {
            d.delete(db, table, key);
        }
        Ok(())
    }

    fn get_table(&self, db: Database, table: &str) -> Result<BTreeMap<String, Row>, BackendError> {
        Ok(self
            .dbs
            .get(&db)
            .map(|d| d.table(db, table))
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// One `<dir>/<number>.json` document per database. Every write is an atomic
/// `.tmp` + rename of the whole document.
#[derive(Debug, Clone)]
pub struct FileTableStore {
    dir: PathBuf,
}

impl FileTableStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn db_path(&self, db: Database) -> PathBuf {
        self.dir.join(format!("{}.json", db.number()))
    }

    pub fn load(&self, db: Database) -> Result<RawDatabase, BackendError> {
        let path = self.db_path(db);
        if !path.exists() {
            return Ok(RawDatabase::default());
        }
        let text = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        serde_json::from_str(&text).map_err(|source| BackendError::Parse { path, source })
    }

    fn save(&self, db: Database, data: &RawDatabase) -> Result<(), BackendError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        let path = self.db_path(db);
        let json = serde_json::to_string_pretty(data)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    /// Drop every row of `db`, as a restarted state DB would.
    pub fn flush(&self, db: Database) -> Result<(), BackendError> {
        self.save(db, &RawDatabase::default())
    }
}

impl TableStore for FileTableStore {
    fn get_entry(&self, db: Database, table: &str, key: &str) -> Result<Option<Row>, BackendError> {
        Ok(self.load(db)?.get(db, table, key))
    }

    fn set_entry(
        &mut self,
        db: Database,
        table: &str,
        key: &str,
        row: &Row,
    ) -> Result<(), BackendError> {
        let mut data = self.load(db)?;
        data.set(db, table, key, row);
        self.save(db, &data)
    }

    fn delete_entry(&mut self, db: Database, table: &str, key: &str) -> Result<(), BackendError> {
        let mut data = self.load(db)?;
        data.delete(db, table, key);
        self.save(db, &data)
    }

    fn get_table(&self, db: Database, table: &str) -> Result<BTreeMap<String, Row>, BackendError> {
        Ok(self.load(db)?.table(db, table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn row(fields: &[(&str, FieldValue)]) -> Row {
        fields
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    #[test]
    fn row_keys_use_database_separator() {
        assert_eq!(Database::Appl.row_key("port_table", "Ethernet1"), "PORT_TABLE:Ethernet1");
        assert_eq!(Database::Config.row_key("VLAN", "Vlan100"), "VLAN|Vlan100");
        assert_eq!(Database::TransportState.number(), 8);
    }

    #[test]
    fn lists_and_empty_rows_are_encoded() {
        let members = row(&[
            ("vlanid", "100".into()),
            ("members", vec!["Ethernet1".to_owned(), "Ethernet17".to_owned()].into()),
        ]);
        let raw = encode_row(&members);
        assert_eq!(raw["members@"], "Ethernet1,Ethernet17");
        assert_eq!(raw["vlanid"], "100");
        assert_eq!(decode_row(&raw), members);

        let empty = encode_row(&Row::new());
        assert_eq!(empty["NULL"], "NULL");
        assert!(decode_row(&empty).is_empty());
    }

    #[test]
    fn set_entry_drops_absent_fields() {
        let mut store = MemoryTableStore::new();
        let db = Database::TransportConfig;
        store
            .set_entry(db, "MODULE_CONFIG_TABLE", "Opt1", &row(&[("prbs", "on".into()), ("losi", "off".into())]))
            .expect("set");
        store
            .set_entry(db, "MODULE_CONFIG_TABLE", "Opt1", &row(&[("prbs", "off".into())]))
            .expect("set");
        let got = store.get_entry(db, "MODULE_CONFIG_TABLE", "Opt1").expect("get").expect("row");
        assert_eq!(got, row(&[("prbs", "off".into())]));
    }

    #[test]
    fn mod_entry_merges() {
        let mut store = MemoryTableStore::new();
        let db = Database::TransportConfig;
        store
            .mod_entry(db, "MODULE_CONFIG_TABLE", "Opt1", &row(&[("prbs", "on".into())]))
            .expect("mod");
        store
            .mod_entry(db, "MODULE_CONFIG_TABLE", "Opt1", &row(&[("losi", "on".into())]))
            .expect("mod");
        let got = store.get_entry(db, "MODULE_CONFIG_TABLE", "Opt1").expect("get").expect("row");
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn get_table_strips_prefix_and_ignores_other_tables() {
        let mut store = MemoryTableStore::new();
        let db = Database::Config;
        store.set_entry(db, "VLAN", "Vlan100", &Row::new()).expect("set");
        store.set_entry(db, "VLAN_MEMBER", "Vlan100|Ethernet1", &Row::new()).expect("set");
        let vlans = store.get_table(db, "VLAN").expect("table");
        assert_eq!(vlans.keys().collect::<Vec<_>>(), vec!["Vlan100"]);
        let members = store.get_table(db, "VLAN_MEMBER").expect("table");
        assert_eq!(members.keys().collect::<Vec<_>>(), vec!["Vlan100|Ethernet1"]);
    }

    #[test]
    fn file_store_persists_between_instances() {
        let tmp = TempDir::new().expect("tempdir");
        let mut store = FileTableStore::new(tmp.path());
        store
            .set_entry(Database::Config, "VLAN", "Vlan200", &row(&[("vlanid", "200".into())]))
            .expect("set");

        let reopened = FileTableStore::new(tmp.path());
        let got = reopened.get_entry(Database::Config, "VLAN", "Vlan200").expect("get");
        assert_eq!(got, Some(row(&[("vlanid", "200".into())])));
        assert!(tmp.path().join("4.json").exists());
        assert!(!tmp.path().join("4.json.tmp").exists());

        let mut reopened = reopened;
        reopened.delete_entry(Database::Config, "VLAN", "Vlan200").expect("delete");
        assert!(store.get_entry(Database::Config, "VLAN", "Vlan200").expect("get").is_none());
    }

    #[test]
    fn missing_database_file_is_empty() {
        let tmp = TempDir::new().expect("tempdir");
        let store = FileTableStore::new(tmp.path().join("db"));
        assert!(store.get_table(Database::Appl, "PORT_TABLE").expect("table").is_empty());
    }
}
