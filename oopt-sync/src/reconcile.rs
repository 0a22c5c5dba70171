//! Apply change records to the device-state backend.
//!
//! Records are grouped per entity and interpreted by kind:
//!
//! 1. Ports: anything but a description change needs a full reconfiguration.
//!    Port groups are looked at first and, when a reboot is needed, nothing
//!    else is applied; the caller rewrites the whole backend instead.
//! 2. Optical modules: field paths map to fields of the module's row in
//!    `MODULE_CONFIG_TABLE` through [`module_fields`].
//! 3. Interfaces: VLAN and VLAN member bookkeeping, keeping every interface
//!    and module-side port in at most one VLAN.
//!
//! A backend failure aborts immediately. Writes already issued stay.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info, warn};

use oopt_core::defaults::EffectiveModule;
use oopt_core::types::{parse_interface_name, pseudo_interface_name, PORT_COUNT};
use oopt_core::{ConfigTree, ModuleChannel, OpticalModuleConnection};

use crate::diff::{ChangeRecord, ChangeType, EntityKind};
use crate::error::{BackendError, ReconcileError};
use crate::mutation::{Applier, Mutation};
use crate::table_store::{
    Database, FieldValue, Row, TableStore, MODULE_CONFIG_TABLE, VLAN_MEMBER_TABLE, VLAN_TABLE,
};

const CONNECTION: &str = "optical-module-connection";
const CONNECTION_ID: &str = "optical-module-connection.id";
const CONNECTION_MODULE: &str = "optical-module-connection.optical-module";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub mutations: Vec<Mutation>,
    /// A change could not be applied incrementally.
    pub must_reboot: bool,
}

/// Interpret `records` (from `diff(old, new)`) against the backend.
pub fn reconcile(
    old: &ConfigTree,
    new: &ConfigTree,
    records: &[ChangeRecord],
    backend: &mut dyn TableStore,
) -> Result<ReconcileOutcome, ReconcileError> {
    let mut groups: BTreeMap<(EntityKind, &str), Vec<&ChangeRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry((record.entity_kind, record.entity_name.as_str()))
            .or_default()
            .push(record);
    }

    let mut must_reboot = false;
    for ((kind, name), group) in &groups {
        if *kind == EntityKind::Port && port_requires_reboot(name, group) {
            must_reboot = true;
        }
    }
    if must_reboot {
        info!("port breakout changed, full reconfiguration required");
        return Ok(ReconcileOutcome {
            mutations: Vec::new(),
            must_reboot,
        });
    }

    let mut applier = Applier::new(backend);
    for ((kind, name), group) in &groups {
        match kind {
            EntityKind::Port => debug!(port = name, "description only, nothing to apply"),
            EntityKind::Interface => reconcile_interface(name, group, old, new, &mut applier)?,
            EntityKind::OpticalModule => reconcile_module(name, group, new, &mut applier)?,
        }
    }
    Ok(ReconcileOutcome {
        mutations: applier.into_mutations(),
        must_reboot: false,
    })
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

fn port_requires_reboot(name: &str, group: &[&ChangeRecord]) -> bool {
    match group.iter().find(|r| r.field_path != "description") {
        Some(record) => {
            info!(port = name, path = %record.field_path, "port change requires reboot");
            true
        }
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Optical modules
// ---------------------------------------------------------------------------

fn on_off(on: bool) -> String {
    if on { "on" } else { "off" }.to_owned()
}

/// Backend fields written for a change at `path`, valued from `eff`.
/// `Some(empty)` marks a known path with nothing to write; `None` an unknown
/// path.
pub fn module_fields(path: &str, eff: &EffectiveModule) -> Option<Vec<(&'static str, String)>> {
    let fields = match path {
        "frequency.grid" => {
            let grid = eff.grid.ghz().to_string();
            vec![("rx-frequency-grid", grid.clone()), ("tx-frequency-grid", grid)]
        }
        "frequency.channel" => {
            let ch = eff.frequency_channel.to_string();
            vec![("rx-frequency-ch", ch.clone()), ("tx-frequency-ch", ch)]
        }
        "ber-interval" => vec![("ber-interval", eff.ber_interval.to_string())],
        "prbs" => vec![("prbs", on_off(eff.prbs))],
        "losi" => vec![("losi", on_off(eff.losi))],
        "enabled" => vec![("enabled", on_off(eff.enabled))],
        "modulation-type" => vec![("modulation-format", eff.modulation.backend_name().to_owned())],
        "name" | "description" | "allow-oversubscription" => Vec::new(),
        _ => return None,
    };
    Some(fields)
}

fn reconcile_module(
    name: &str,
    group: &[&ChangeRecord],
    new: &ConfigTree,
    applier: &mut Applier<'_>,
) -> Result<(), ReconcileError> {
    let Some(module) = new.optical_modules.get(name) else {
        debug!(module = name, "module not in new tree, nothing to apply");
        return Ok(());
    };
    let eff = EffectiveModule::resolve(module, new);

    let mut fields = Row::new();
    for record in group {
        match module_fields(&record.field_path, &eff) {
            Some(pairs) => {
                fields.extend(pairs.into_iter().map(|(k, v)| (k.to_owned(), FieldValue::Str(v))));
            }
            None => warn!(module = name, path = %record.field_path, "unhandled field path, ignored"),
        }
    }
    if fields.is_empty() {
        debug!(module = name, "no backend fields affected");
        return Ok(());
    }
    applier.modify(Database::TransportConfig, MODULE_CONFIG_TABLE, name, fields)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// VLAN bookkeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaggingMode {
    Untagged,
    Tagged,
}

impl TaggingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TaggingMode::Untagged => "untagged",
            TaggingMode::Tagged => "tagged",
        }
    }
}

impl fmt::Display for TaggingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn vlan_name(id: u32) -> String {
    format!("Vlan{id}")
}

pub fn vlan_member_key(vlan: &str, member: &str) -> String {
    format!("{vlan}|{member}")
}

pub(crate) fn vlan_member_row(mode: TaggingMode) -> Row {
    Row::from([("tagging_mode".to_owned(), FieldValue::from(mode.as_str()))])
}

#[derive(Debug)]
struct VlanEntry {
    row: Row,
    members: Vec<String>,
    existed: bool,
    touched: bool,
}

/// VLAN rows loaded on demand, edited in memory, written back by [`flush`].
///
/// [`flush`]: VlanBook::flush
#[derive(Debug, Default)]
struct VlanBook {
    entries: BTreeMap<String, VlanEntry>,
}

impl VlanBook {
    fn load(&mut self, applier: &Applier<'_>, vlan: &str) -> Result<&mut VlanEntry, BackendError> {
        let slot = match self.entries.entry(vlan.to_owned()) {
            Entry::Occupied(slot) => return Ok(slot.into_mut()),
            Entry::Vacant(slot) => slot,
        };
        let entry = match applier.get(Database::Config, VLAN_TABLE, vlan)? {
            Some(row) => VlanEntry {
                members: row
                    .get("members")
                    .and_then(FieldValue::as_list)
                    .map(<[String]>::to_vec)
                    .unwrap_or_default(),
                row,
                existed: true,
                touched: false,
            },
            None => VlanEntry {
                row: Row::new(),
                members: Vec::new(),
                existed: false,
                touched: false,
            },
        };
        Ok(slot.insert(entry))
    }

    fn remove_member(
        &mut self,
        applier: &mut Applier<'_>,
        vlan: &str,
        member: &str,
    ) -> Result<(), BackendError> {
        let entry = self.load(applier, vlan)?;
        let before = entry.members.len();
        entry.members.retain(|m| m != member);
        if entry.members.len() == before {
            return Ok(());
        }
        entry.touched = true;
        applier.delete(Database::Config, VLAN_MEMBER_TABLE, &vlan_member_key(vlan, member))
    }

    fn add_member(
        &mut self,
        applier: &mut Applier<'_>,
        vlan: &str,
        member: &str,
        mode: TaggingMode,
    ) -> Result<(), BackendError> {
        let entry = self.load(applier, vlan)?;
        if entry.members.iter().any(|m| m == member) {
            return Ok(());
        }
        entry.members.push(member.to_owned());
        entry.touched = true;
        applier.set(
            Database::Config,
            VLAN_MEMBER_TABLE,
            &vlan_member_key(vlan, member),
            vlan_member_row(mode),
        )
    }

    /// Every VLAN, stored or pending, currently listing `member`.
    fn listing(&mut self, applier: &Applier<'_>, member: &str) -> Result<Vec<String>, BackendError> {
        for vlan in applier.table(Database::Config, VLAN_TABLE)?.keys() {
            self.load(applier, vlan)?;
        }
        Ok(self
            .entries
            .iter()
            .filter(|(_, e)| e.members.iter().any(|m| m == member))
            .map(|(name, _)| name.clone())
            .collect())
    }

    fn flush(self, applier: &mut Applier<'_>) -> Result<(), BackendError> {
        for (vlan, entry) in self.entries.into_iter().filter(|(_, e)| e.touched) {
            if entry.members.is_empty() {
                if entry.existed {
                    applier.delete(Database::Config, VLAN_TABLE, &vlan)?;
                }
                continue;
            }
            let mut row = entry.row;
            if !row.contains_key("vlanid") {
                let id = vlan.trim_start_matches("Vlan").to_owned();
                row.insert("vlanid".to_owned(), FieldValue::Str(id));
            }
            row.insert("members".to_owned(), FieldValue::List(canonical_order(entry.members)));
            applier.set(Database::Config, VLAN_TABLE, &vlan, row)?;
        }
        Ok(())
    }
}

/// Interfaces first, then module-side ports, each by name. This is the
/// order a full rebuild of the switch configuration produces.
fn canonical_order(mut members: Vec<String>) -> Vec<String> {
    members.sort_by_cached_key(|m| (is_module_side_port(m), m.clone()));
    members
}

fn is_module_side_port(member: &str) -> bool {
    matches!(parse_interface_name(member), Ok((port, None)) if port > PORT_COUNT)
}

// ---------------------------------------------------------------------------
// Interfaces
// ---------------------------------------------------------------------------

fn module_side(conn: Option<&OpticalModuleConnection>) -> Option<(&str, ModuleChannel)> {
    let conn = conn?;
    Some((conn.module_name()?, conn.channel()?))
}

fn reconcile_interface(
    name: &str,
    group: &[&ChangeRecord],
    old: &ConfigTree,
    new: &ConfigTree,
    applier: &mut Applier<'_>,
) -> Result<(), ReconcileError> {
    let old_conn = old
        .interfaces
        .get(name)
        .and_then(|i| i.optical_module_connection.as_ref());
    let new_conn = new
        .interfaces
        .get(name)
        .and_then(|i| i.optical_module_connection.as_ref());
    let new_id = new_conn.and_then(|c| c.id);

    let entity_deleted = group.iter().any(|r| r.is_entity_deletion());
    let connection_deleted = group
        .iter()
        .any(|r| r.change_type == ChangeType::Deleted && r.is_under(CONNECTION));
    if entity_deleted || (connection_deleted && new_id.is_none()) {
        return remove_interface(name, old_conn, new, applier);
    }

    let mod_ether = group.iter().any(|r| r.field_path == CONNECTION_ID);
    let mod_opt = mod_ether || group.iter().any(|r| r.is_under(CONNECTION_MODULE));
    if !mod_ether && !mod_opt {
        debug!(interface = name, "no connection change, nothing to apply");
        return Ok(());
    }
    let Some(id) = new_id else {
        info!(interface = name, "connection has no id yet, nothing to apply");
        return Ok(());
    };
    if mod_opt && module_side(new_conn).is_none() {
        warn!(interface = name, "optical module reference incomplete, module side skipped");
    }

    let target = vlan_name(id);
    let mut book = VlanBook::default();
    book.load(applier, &target)?;

    if mod_ether {
        if let Some(old_vlan) = old_conn.and_then(|c| c.id).map(vlan_name) {
            book.remove_member(applier, &old_vlan, name)?;
        }
        book.add_member(applier, &target, name, TaggingMode::Untagged)?;
    }

    if mod_opt {
        for (module, channel) in [module_side(old_conn), module_side(new_conn)].into_iter().flatten() {
            place_module_port(&mut book, applier, new, &pseudo_interface_name(module, channel)?)?;
        }
    }

    book.flush(applier)?;
    Ok(())
}

/// VLAN id the module-side port `pseudo` belongs to in `tree`: the id of
/// the last interface, in name order, whose complete connection uses it.
fn module_port_owner(tree: &ConfigTree, pseudo: &str) -> Result<Option<u32>, ReconcileError> {
    let mut owner = None;
    for iface in tree.interfaces.values() {
        let Some(conn) = iface.connection() else {
            continue;
        };
        if pseudo_interface_name(conn.module, conn.channel)? == pseudo {
            owner = Some(conn.id);
        }
    }
    Ok(owner)
}

/// Move `pseudo` into its owner's VLAN as a tagged member and out of every
/// other VLAN listing it.
fn place_module_port(
    book: &mut VlanBook,
    applier: &mut Applier<'_>,
    tree: &ConfigTree,
    pseudo: &str,
) -> Result<(), ReconcileError> {
    let target = module_port_owner(tree, pseudo)?.map(vlan_name);
    for vlan in book.listing(applier, pseudo)? {
        if target.as_deref() != Some(vlan.as_str()) {
            match &target {
                Some(to) => info!(%pseudo, from = %vlan, %to, "module port moves to new VLAN"),
                None => debug!(%pseudo, from = %vlan, "module port released"),
            }
            book.remove_member(applier, &vlan, pseudo)?;
        }
    }
    if let Some(target) = target {
        book.add_member(applier, &target, pseudo, TaggingMode::Tagged)?;
    }
    Ok(())
}

/// Drop the interface from the VLAN of its old connection and hand its
/// module-side port to the next owner, if any. Emptied VLANs are deleted.
fn remove_interface(
    name: &str,
    old_conn: Option<&OpticalModuleConnection>,
    new: &ConfigTree,
    applier: &mut Applier<'_>,
) -> Result<(), ReconcileError> {
    let Some(old_vlan) = old_conn.and_then(|c| c.id).map(vlan_name) else {
        debug!(interface = name, "no previous connection, nothing to remove");
        return Ok(());
    };
    let mut book = VlanBook::default();
    book.remove_member(applier, &old_vlan, name)?;
    if let Some((module, channel)) = module_side(old_conn) {
        place_module_port(&mut book, applier, new, &pseudo_interface_name(module, channel)?)?;
    }
    book.flush(applier)?;
    Ok(())
}
