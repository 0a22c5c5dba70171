//! Backend writes, recorded as they are applied.

use std::collections::BTreeMap;
use std::fmt;

use tracing::info;

use crate::error::BackendError;
use crate::table_store::{Database, Row, TableStore};

/// One write issued against the table store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Set {
        db: Database,
        table: &'static str,
        key: String,
        row: Row,
    },
    Modify {
        db: Database,
        table: &'static str,
        key: String,
        fields: Row,
    },
    Delete {
        db: Database,
        table: &'static str,
        key: String,
    },
}

impl Mutation {
    pub fn db(&self) -> Database {
        match self {
            Mutation::Set { db, .. } | Mutation::Modify { db, .. } | Mutation::Delete { db, .. } => *db,
        }
    }

    /// `<TABLE><sep><key>` of the touched row.
    pub fn row_key(&self) -> String {
        match self {
            Mutation::Set { db, table, key, .. }
            | Mutation::Modify { db, table, key, .. }
            | Mutation::Delete { db, table, key } => db.row_key(table, key),
        }
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Mutation::Set { .. } => "set",
            Mutation::Modify { .. } => "mod",
            Mutation::Delete { .. } => "del",
        };
        write!(f, "{verb} {} {}", self.db(), self.row_key())
    }
}

/// Wraps a [`TableStore`], forwarding writes and keeping the applied list.
pub struct Applier<'a> {
    store: &'a mut dyn TableStore,
    applied: Vec<Mutation>,
}

impl<'a> Applier<'a> {
    pub fn new(store: &'a mut dyn TableStore) -> Self {
        Self {
            store,
            applied: Vec::new(),
        }
    }

    pub fn get(&self, db: Database, table: &str, key: &str) -> Result<Option<Row>, BackendError> {
        self.store.get_entry(db, table, key)
    }

    pub fn table(&self, db: Database, table: &str) -> Result<BTreeMap<String, Row>, BackendError> {
        self.store.get_table(db, table)
    }

    pub fn set(
        &mut self,
        db: Database,
        table: &'static str,
        key: &str,
        row: Row,
    ) -> Result<(), BackendError> {
        self.store.set_entry(db, table, key, &row)?;
        self.record(Mutation::Set {
            db,
            table,
            key: key.to_owned(),
            row,
        });
        Ok(())
    }

    pub fn modify(
        &mut self,
        db: Database,
        table: &'static str,
        key: &str,
        fields: Row,
    ) -> Result<(), BackendError> {
        self.store.mod_entry(db, table, key, &fields)?;
        self.record(Mutation::Modify {
            db,
            table,
            key: key.to_owned(),
            fields,
        });
        Ok(())
    }

    pub fn delete(&mut self, db: Database, table: &'static str, key: &str) -> Result<(), BackendError> {
        self.store.delete_entry(db, table, key)?;
        self.record(Mutation::Delete {
            db,
            table,
            key: key.to_owned(),
        });
        Ok(())
    }

    fn record(&mut self, mutation: Mutation) {
        info!(%mutation, "applied");
        self.applied.push(mutation);
    }

    pub fn applied(&self) -> &[Mutation] {
        &self.applied
    }

    pub fn into_mutations(self) -> Vec<Mutation> {
        self.applied
    }
}
