//! Per-entity, per-leaf differences between two configuration trees.
//!
//! Each entity is flattened to its leaves through its serialized form, so
//! field paths use the persisted names (`optical-module-connection.id`) and
//! leaves appear in field declaration order.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use similar::TextDiff;

use oopt_core::{ConfigError, ConfigTree};

/// Derived fields that never produce change records.
const DERIVED_FIELDS: &[&str] = &["channel-stats"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Port,
    Interface,
    OpticalModule,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Port => write!(f, "port"),
            EntityKind::Interface => write!(f, "interface"),
            EntityKind::OpticalModule => write!(f, "optical-module"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::Added => write!(f, "added"),
            ChangeType::Modified => write!(f, "modified"),
            ChangeType::Deleted => write!(f, "deleted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub entity_kind: EntityKind,
    pub entity_name: String,
    /// Dotted path relative to the entity; empty for a whole-entity deletion.
    pub field_path: String,
    pub change_type: ChangeType,
    /// The new leaf value; `None` for deletions.
    pub new_value: Option<Value>,
}

impl ChangeRecord {
    pub fn is_entity_deletion(&self) -> bool {
        self.change_type == ChangeType::Deleted && self.field_path.is_empty()
    }

    /// True when the path is `prefix` itself or nested below it.
    pub fn is_under(&self, prefix: &str) -> bool {
        self.field_path == prefix
            || self
                .field_path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.'))
    }
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.change_type {
            ChangeType::Added => '+',
            ChangeType::Modified => '~',
            ChangeType::Deleted => '-',
        };
        write!(f, "{sign} {} {}", self.entity_kind, self.entity_name)?;
        if !self.field_path.is_empty() {
            write!(f, " {}", self.field_path)?;
        }
        if let Some(value) = &self.new_value {
            write!(f, " = {value}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Flattening
// ---------------------------------------------------------------------------

fn flatten_into(prefix: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if prefix.is_empty() && DERIVED_FIELDS.contains(&key.as_str()) {
                    continue;
                }
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(&path, child, out);
            }
        }
        leaf => out.push((prefix.to_owned(), leaf.clone())),
    }
}

fn leaves<T: Serialize>(entity: &T) -> Result<Vec<(String, Value)>, ConfigError> {
    let mut out = Vec::new();
    flatten_into("", &serde_json::to_value(entity)?, &mut out);
    Ok(out)
}

/// Merge the leaf paths of both sides, keeping declaration order: paths only
/// in `old` are placed right after their predecessor in `old`.
fn merged_paths(old: &[(String, Value)], new: &[(String, Value)]) -> Vec<String> {
    let mut out: Vec<String> = new.iter().map(|(p, _)| p.clone()).collect();
    let mut prev: Option<usize> = None;
    for (path, _) in old {
        match out.iter().position(|p| p == path) {
            Some(i) => prev = Some(i),
            None => {
                let at = prev.map_or(0, |i| i + 1);
                out.insert(at, path.clone());
                prev = Some(at);
            }
        }
    }
    out
}

fn diff_entity<T: Serialize>(
    kind: EntityKind,
    name: &str,
    old: Option<&T>,
    new: Option<&T>,
    out: &mut Vec<ChangeRecord>,
) -> Result<(), ConfigError> {
    let record = |path: &str, change_type: ChangeType, new_value: Option<Value>| ChangeRecord {
        entity_kind: kind,
        entity_name: name.to_owned(),
        field_path: path.to_owned(),
        change_type,
        new_value,
    };
    match (old, new) {
        (None, None) => {}
        (Some(_), None) => out.push(record("", ChangeType::Deleted, None)),
        (None, Some(new)) => {
            for (path, value) in leaves(new)? {
                out.push(record(&path, ChangeType::Added, Some(value)));
            }
        }
        (Some(old), Some(new)) => {
            let old = leaves(old)?;
            let new = leaves(new)?;
            let old_map: BTreeMap<&str, &Value> = old.iter().map(|(p, v)| (p.as_str(), v)).collect();
            let new_map: BTreeMap<&str, &Value> = new.iter().map(|(p, v)| (p.as_str(), v)).collect();
            for path in merged_paths(&old, &new) {
                match (old_map.get(path.as_str()), new_map.get(path.as_str())) {
                    (None, Some(v)) => out.push(record(&path, ChangeType::Added, Some((*v).clone()))),
                    (Some(_), None) => out.push(record(&path, ChangeType::Deleted, None)),
                    (Some(a), Some(b)) if a != b => {
                        out.push(record(&path, ChangeType::Modified, Some((*b).clone())))
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

fn diff_collection<T: Serialize>(
    kind: EntityKind,
    old: &BTreeMap<String, T>,
    new: &BTreeMap<String, T>,
    out: &mut Vec<ChangeRecord>,
) -> Result<(), ConfigError> {
    let mut names: Vec<&String> = old.keys().chain(new.keys()).collect();
    names.sort();
    names.dedup();
    for name in names {
        diff_entity(kind, name, old.get(name), new.get(name), out)?;
    }
    Ok(())
}

/// Change records turning `old` into `new`: ports, then interfaces, then
/// optical modules, each in name order.
pub fn diff(old: &ConfigTree, new: &ConfigTree) -> Result<Vec<ChangeRecord>, ConfigError> {
    let mut out = Vec::new();
    diff_collection(EntityKind::Port, &old.ports, &new.ports, &mut out)?;
    diff_collection(EntityKind::Interface, &old.interfaces, &new.interfaces, &mut out)?;
    diff_collection(
        EntityKind::OpticalModule,
        &old.optical_modules,
        &new.optical_modules,
        &mut out,
    )?;
    Ok(out)
}

/// Unified text diff of the persisted documents, `a/` being `old`.
pub fn document_diff(old: &ConfigTree, new: &ConfigTree) -> Result<String, ConfigError> {
    let old = old.to_json()?;
    let new = new.to_json()?;
    if old == new {
        return Ok(String::new());
    }
    Ok(TextDiff::from_lines(&old, &new)
        .unified_diff()
        .header("a/config.json", "b/config.json")
        .context_radius(3)
        .to_string())
}
