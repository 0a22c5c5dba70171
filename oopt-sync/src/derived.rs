//! Backend contents derived from a whole configuration tree.
//!
//! Used after a reboot-class change, where the backend is rewritten from the
//! committed tree instead of patched record by record, and by `resync`.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use oopt_core::defaults::EffectiveModule;
use oopt_core::settings::DeviceMetadata;
use oopt_core::types::{
    module_index, parse_interface_name, pseudo_interface_name, OPTICAL_MODULE_COUNT, PORT_COUNT,
};
use oopt_core::{ConfigError, ConfigTree, ModuleChannel};

use crate::error::{BackendError, ReconcileError};
use crate::mutation::{Applier, Mutation};
use crate::reconcile::{vlan_member_key, vlan_member_row, vlan_name, TaggingMode};
use crate::table_store::{
    Database, FieldValue, Row, TableStore, DEVICE_METADATA_KEY, DEVICE_METADATA_TABLE,
    MODULE_CONFIG_TABLE, PORT_TABLE, VLAN_MEMBER_TABLE, VLAN_TABLE,
};

/// First lane used by breakout sub-interfaces.
const BREAKOUT_LANE_BASE: u32 = 2 * PORT_COUNT;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortEntry {
    pub lanes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VlanEntry {
    pub members: Vec<String>,
    pub vlanid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VlanMemberEntry {
    pub tagging_mode: String,
}

/// Switch configuration, serialized as the network OS `config_db.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchConfig {
    #[serde(rename = "DEVICE_METADATA")]
    pub device_metadata: BTreeMap<String, DeviceMetadata>,
    #[serde(rename = "PORT")]
    pub ports: BTreeMap<String, PortEntry>,
    #[serde(rename = "VLAN")]
    pub vlans: BTreeMap<String, VlanEntry>,
    #[serde(rename = "VLAN_MEMBER")]
    pub vlan_members: BTreeMap<String, VlanMemberEntry>,
}

impl SwitchConfig {
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Hardware lane of a switch interface: `Ethernet<N>` uses lane N,
/// `Ethernet<N>_<k>` lane 32+4(N-1)+k.
pub fn interface_lane(name: &str) -> Result<u32, ConfigError> {
    Ok(match parse_interface_name(name)? {
        (port, None) => port,
        (port, Some(sub)) => BREAKOUT_LANE_BASE + 4 * (port - 1) + sub,
    })
}

/// Module-side ports, `Ethernet17` to `Ethernet32`.
pub fn module_side_ports() -> impl Iterator<Item = u32> {
    PORT_COUNT + 1..=PORT_COUNT + 2 * OPTICAL_MODULE_COUNT
}

/// Derive the full switch configuration from `tree`.
///
/// A module-side port claimed by several interfaces joins the VLAN of the
/// last of them in name order only.
pub fn switch_config(tree: &ConfigTree, metadata: &DeviceMetadata) -> Result<SwitchConfig, ConfigError> {
    let mut config = SwitchConfig {
        device_metadata: BTreeMap::from([(DEVICE_METADATA_KEY.to_owned(), metadata.clone())]),
        ports: BTreeMap::new(),
        vlans: BTreeMap::new(),
        vlan_members: BTreeMap::new(),
    };

    let mut pseudo_owner: BTreeMap<String, u32> = BTreeMap::new();
    for (name, iface) in &tree.interfaces {
        config.ports.insert(
            name.clone(),
            PortEntry {
                lanes: interface_lane(name)?,
            },
        );
        let Some(conn) = iface.optical_module_connection.as_ref() else {
            continue;
        };
        let Some(id) = conn.id else {
            continue;
        };
        let vlan = vlan_name(id);
        config
            .vlans
            .entry(vlan.clone())
            .or_insert_with(|| VlanEntry {
                members: Vec::new(),
                vlanid: id,
            })
            .members
            .push(name.clone());
        config.vlan_members.insert(
            vlan_member_key(&vlan, name),
            VlanMemberEntry {
                tagging_mode: TaggingMode::Untagged.to_string(),
            },
        );
        if let (Some(module), Some(channel)) = (conn.module_name(), conn.channel()) {
            pseudo_owner.insert(pseudo_interface_name(module, channel)?, id);
        }
    }

    for (pseudo, id) in pseudo_owner {
        let vlan = vlan_name(id);
        if let Some(entry) = config.vlans.get_mut(&vlan) {
            entry.members.push(pseudo.clone());
        }
        config.vlan_members.insert(
            vlan_member_key(&vlan, &pseudo),
            VlanMemberEntry {
                tagging_mode: TaggingMode::Tagged.to_string(),
            },
        );
    }

    for lane in module_side_ports() {
        let name = format!("Ethernet{lane}");
        if config.ports.contains_key(&name) {
            return Err(ConfigError::InvalidName {
                kind: "interface",
                name,
            });
        }
        config.ports.insert(name, PortEntry { lanes: lane });
    }
    Ok(config)
}

/// Transport configuration rows, one per optical module, with defaults
/// applied.
pub fn transport_rows(tree: &ConfigTree) -> Result<BTreeMap<String, Row>, ConfigError> {
    let mut rows = BTreeMap::new();
    for (name, module) in &tree.optical_modules {
        let eff = EffectiveModule::resolve(module, tree);
        let on_off = |on: bool| FieldValue::from(if on { "on" } else { "off" });
        let grid = eff.grid.ghz().to_string();
        let channel = eff.frequency_channel.to_string();
        let row = Row::from([
            ("index".to_owned(), FieldValue::Str((module_index(name)? - 1).to_string())),
            ("rx-frequency-ch".to_owned(), FieldValue::Str(channel.clone())),
            ("rx-frequency-grid".to_owned(), FieldValue::Str(grid.clone())),
            ("tx-frequency-ch".to_owned(), FieldValue::Str(channel)),
            ("tx-frequency-grid".to_owned(), FieldValue::Str(grid)),
            ("losi".to_owned(), on_off(eff.losi)),
            ("prbs".to_owned(), on_off(eff.prbs)),
            ("enabled".to_owned(), on_off(eff.enabled)),
            (
                "modulation-format".to_owned(),
                FieldValue::from(eff.modulation.backend_name()),
            ),
            ("ber-interval".to_owned(), FieldValue::Str(eff.ber_interval.to_string())),
        ]);
        rows.insert(name.clone(), row);
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Backend writes
// ---------------------------------------------------------------------------

/// Make `table` hold exactly `rows`: stale keys are deleted, the rest set.
fn replace_table(
    applier: &mut Applier<'_>,
    db: Database,
    table: &'static str,
    rows: BTreeMap<String, Row>,
) -> Result<(), BackendError> {
    for stale in applier.table(db, table)?.into_keys() {
        if !rows.contains_key(&stale) {
            applier.delete(db, table, &stale)?;
        }
    }
    for (key, row) in rows {
        applier.set(db, table, &key, row)?;
    }
    Ok(())
}

fn vlan_rows(config: &SwitchConfig) -> (BTreeMap<String, Row>, BTreeMap<String, Row>) {
    let vlans = config
        .vlans
        .iter()
        .map(|(name, vlan)| {
            let row = Row::from([
                ("members".to_owned(), FieldValue::List(vlan.members.clone())),
                ("vlanid".to_owned(), FieldValue::Str(vlan.vlanid.to_string())),
            ]);
            (name.clone(), row)
        })
        .collect();
    let members = config
        .vlan_members
        .iter()
        .map(|(key, member)| {
            let mode = if member.tagging_mode == TaggingMode::Tagged.as_str() {
                TaggingMode::Tagged
            } else {
                TaggingMode::Untagged
            };
            (key.clone(), vlan_member_row(mode))
        })
        .collect();
    (vlans, members)
}

/// Rewrite the switch tables of [`Database::Config`] from `config`.
pub fn write_switch_config(
    config: &SwitchConfig,
    backend: &mut dyn TableStore,
) -> Result<Vec<Mutation>, BackendError> {
    let mut applier = Applier::new(backend);

    for (key, meta) in &config.device_metadata {
        let row = Row::from([
            ("bgp_asn".to_owned(), FieldValue::Str(meta.bgp_asn.to_string())),
            ("hostname".to_owned(), FieldValue::from(meta.hostname.as_str())),
            ("type".to_owned(), FieldValue::from(meta.device_type.as_str())),
            ("hwsku".to_owned(), FieldValue::from(meta.hwsku.as_str())),
            ("mac".to_owned(), FieldValue::from(meta.mac.as_str())),
        ]);
        applier.set(Database::Config, DEVICE_METADATA_TABLE, key, row)?;
    }

    let ports = config
        .ports
        .iter()
        .map(|(name, port)| {
            let row = Row::from([("lanes".to_owned(), FieldValue::Str(port.lanes.to_string()))]);
            (name.clone(), row)
        })
        .collect();
    replace_table(&mut applier, Database::Config, PORT_TABLE, ports)?;

    let (vlans, members) = vlan_rows(config);
    replace_table(&mut applier, Database::Config, VLAN_TABLE, vlans)?;
    replace_table(&mut applier, Database::Config, VLAN_MEMBER_TABLE, members)?;

    info!(
        ports = config.ports.len(),
        vlans = config.vlans.len(),
        "switch configuration written"
    );
    Ok(applier.into_mutations())
}

/// Rewrite the transport configuration table from `tree`.
pub fn write_transport_config(
    tree: &ConfigTree,
    backend: &mut dyn TableStore,
) -> Result<Vec<Mutation>, ReconcileError> {
    let rows = transport_rows(tree)?;
    let mut applier = Applier::new(backend);
    replace_table(&mut applier, Database::TransportConfig, MODULE_CONFIG_TABLE, rows)?;
    info!(modules = tree.optical_modules.len(), "transport configuration written");
    Ok(applier.into_mutations())
}

/// Recompute every VLAN and VLAN member row from `tree`, leaving ports and
/// transport rows untouched.
pub fn resync(
    tree: &ConfigTree,
    metadata: &DeviceMetadata,
    backend: &mut dyn TableStore,
) -> Result<Vec<Mutation>, ReconcileError> {
    let config = switch_config(tree, metadata)?;
    let (vlans, members) = vlan_rows(&config);

    let mut applier = Applier::new(backend);
    let current_vlans = applier.table(Database::Config, VLAN_TABLE)?;
    let current_members = applier.table(Database::Config, VLAN_MEMBER_TABLE)?;
    if current_vlans == vlans && current_members == members {
        debug!("VLAN tables already match the configuration");
        return Ok(Vec::new());
    }
    replace_table(&mut applier, Database::Config, VLAN_TABLE, vlans)?;
    replace_table(&mut applier, Database::Config, VLAN_MEMBER_TABLE, members)?;
    Ok(applier.into_mutations())
}

/// Module-side port names per module channel, for display.
pub fn pseudo_interfaces(tree: &ConfigTree) -> Result<Vec<(String, ModuleChannel, String)>, ConfigError> {
    let mut out = Vec::new();
    for name in tree.optical_modules.keys() {
        for channel in ModuleChannel::all() {
            out.push((name.clone(), channel, pseudo_interface_name(name, channel)?));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use crate::reconcile::reconcile;
    use crate::table_store::MemoryTableStore;
    use oopt_core::ChannelSpeed;
    use rstest::rstest;

    #[rstest]
    #[case("Ethernet1", 1)]
    #[case("Ethernet16", 16)]
    #[case("Ethernet1_1", 33)]
    #[case("Ethernet2_4", 40)]
    #[case("Ethernet16_4", 96)]
    fn lanes_follow_interface_names(#[case] name: &str, #[case] lane: u32) {
        assert_eq!(interface_lane(name).expect("lane"), lane);
    }

    #[test]
    fn provisioned_switch_config() {
        let config = switch_config(&ConfigTree::provisioned(), &DeviceMetadata::default()).expect("derive");
        assert_eq!(config.ports.len(), 32);
        assert_eq!(config.ports["Ethernet17"].lanes, 17);
        assert_eq!(config.ports["Ethernet32"].lanes, 32);
        assert!(config.vlans.is_empty());
        assert_eq!(config.device_metadata["localhost"].hostname, "cassini");
    }

    #[test]
    fn config_db_json_shape() {
        let mut tree = ConfigTree::provisioned();
        tree.set_connection_id("Ethernet1", 100).expect("id");
        tree.set_connection_module("Ethernet1", "Opt1").expect("module");
        tree.set_connection_channel("Ethernet1", ModuleChannel::A).expect("channel");
        let config = switch_config(&tree, &DeviceMetadata::default()).expect("derive");
        let json: serde_json::Value =
            serde_json::from_str(&config.to_json().expect("json")).expect("parse");
        assert_eq!(json["VLAN"]["Vlan100"]["vlanid"], 100);
        assert_eq!(
            json["VLAN"]["Vlan100"]["members"],
            serde_json::json!(["Ethernet1", "Ethernet17"])
        );
        assert_eq!(json["VLAN_MEMBER"]["Vlan100|Ethernet17"]["tagging_mode"], "tagged");
        assert_eq!(json["PORT"]["Ethernet1"]["lanes"], 1);
        assert_eq!(json["DEVICE_METADATA"]["localhost"]["type"], "packet-transponder");
    }

    #[test]
    fn shared_module_port_goes_to_last_interface() {
        let mut tree = ConfigTree::provisioned();
        for (iface, id) in [("Ethernet1", 100), ("Ethernet2", 200)] {
            tree.set_connection_id(iface, id).expect("id");
            tree.set_connection_module(iface, "Opt1").expect("module");
            tree.set_connection_channel(iface, ModuleChannel::A).expect("channel");
        }
        let config = switch_config(&tree, &DeviceMetadata::default()).expect("derive");
        assert_eq!(config.vlans["Vlan100"].members, vec!["Ethernet1"]);
        assert_eq!(config.vlans["Vlan200"].members, vec!["Ethernet2", "Ethernet17"]);
    }

    #[test]
    fn breakout_interfaces_get_sub_lanes() {
        let mut tree = ConfigTree::provisioned();
        tree.set_num_channels("Port2", 4).expect("breakout");
        tree.set_channel_speed("Port2", ChannelSpeed::Speed25Gb).expect("speed");
        let config = switch_config(&tree, &DeviceMetadata::default()).expect("derive");
        assert_eq!(config.ports.len(), 35);
        assert_eq!(config.ports["Ethernet2_1"].lanes, 37);
        assert!(!config.ports.contains_key("Ethernet2"));
    }

    #[test]
    fn transport_rows_apply_defaults() {
        let mut tree = ConfigTree::provisioned();
        tree.set_prbs("Opt3", true).expect("prbs");
        let rows = transport_rows(&tree).expect("rows");
        assert_eq!(rows.len(), 8);
        let row = &rows["Opt3"];
        assert_eq!(row["index"].as_str(), Some("2"));
        assert_eq!(row["rx-frequency-grid"].as_str(), Some("50"));
        assert_eq!(row["tx-frequency-ch"].as_str(), Some("1"));
        assert_eq!(row["prbs"].as_str(), Some("on"));
        assert_eq!(row["losi"].as_str(), Some("off"));
        assert_eq!(row["modulation-format"].as_str(), Some("dp-16qam"));
        assert_eq!(row["ber-interval"].as_str(), Some("100"));
    }

    #[test]
    fn write_switch_config_removes_stale_rows() {
        let mut store = MemoryTableStore::new();
        let stale = Row::from([("lanes".to_owned(), FieldValue::from("2"))]);
        store
            .set_entry(Database::Config, PORT_TABLE, "Ethernet2", &stale)
            .expect("seed");

        let mut tree = ConfigTree::provisioned();
        tree.set_num_channels("Port2", 2).expect("breakout");
        tree.set_channel_speed("Port2", ChannelSpeed::Speed50Gb).expect("speed");
        let config = switch_config(&tree, &DeviceMetadata::default()).expect("derive");
        write_switch_config(&config, &mut store).expect("write");

        assert!(store.get_entry(Database::Config, PORT_TABLE, "Ethernet2").expect("get").is_none());
        let row = store
            .get_entry(Database::Config, PORT_TABLE, "Ethernet2_2")
            .expect("get")
            .expect("row");
        assert_eq!(row["lanes"].as_str(), Some("38"));
        let meta = store
            .get_entry(Database::Config, DEVICE_METADATA_TABLE, "localhost")
            .expect("get")
            .expect("row");
        assert_eq!(meta["bgp_asn"].as_str(), Some("65100"));
    }

    #[test]
    fn incremental_reconcile_matches_full_derivation() {
        let mut store = MemoryTableStore::new();
        let mut trees = vec![ConfigTree::provisioned()];
        let edits: [(&str, u32, &str, ModuleChannel); 5] = [
            ("Ethernet1", 100, "Opt1", ModuleChannel::A),
            ("Ethernet2", 200, "Opt1", ModuleChannel::B),
            ("Ethernet3", 400, "Opt2", ModuleChannel::A),
            ("Ethernet1", 300, "Opt1", ModuleChannel::A),
            ("Ethernet4", 500, "Opt1", ModuleChannel::A),
        ];
        for (iface, id, module, channel) in edits {
            let mut next = trees.last().expect("tree").clone();
            next.set_connection_id(iface, id).expect("id");
            next.set_connection_module(iface, module).expect("module");
            next.set_connection_channel(iface, channel).expect("channel");
            trees.push(next);
        }
        for pair in trees.windows(2) {
            let records = diff(&pair[0], &pair[1]).expect("diff");
            reconcile(&pair[0], &pair[1], &records, &mut store).expect("reconcile");
        }
        let last = trees.last().expect("tree");
        let mutations = resync(last, &DeviceMetadata::default(), &mut store).expect("resync");
        assert!(mutations.is_empty(), "unexpected drift: {mutations:?}");
    }

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Connect(&'static str, u32, &'static str, ModuleChannel),
        Clear(&'static str),
    }

    #[rstest]
    #[case::earlier_name_claims_second(vec![
        Step::Connect("Ethernet2", 200, "Opt1", ModuleChannel::A),
        Step::Connect("Ethernet1", 100, "Opt1", ModuleChannel::A),
    ])]
    #[case::owner_cleared(vec![
        Step::Connect("Ethernet2", 200, "Opt1", ModuleChannel::A),
        Step::Connect("Ethernet1", 100, "Opt1", ModuleChannel::A),
        Step::Clear("Ethernet2"),
    ])]
    #[case::owner_switches_channel(vec![
        Step::Connect("Ethernet1", 100, "Opt1", ModuleChannel::A),
        Step::Connect("Ethernet2", 200, "Opt1", ModuleChannel::A),
        Step::Connect("Ethernet2", 200, "Opt1", ModuleChannel::B),
    ])]
    #[case::numeric_names_sort_as_text(vec![
        Step::Connect("Ethernet9", 100, "Opt2", ModuleChannel::B),
        Step::Connect("Ethernet10", 200, "Opt2", ModuleChannel::B),
        Step::Connect("Ethernet11", 100, "Opt3", ModuleChannel::A),
    ])]
    #[case::owner_moves_vlan(vec![
        Step::Connect("Ethernet1", 100, "Opt4", ModuleChannel::A),
        Step::Connect("Ethernet3", 300, "Opt4", ModuleChannel::A),
        Step::Connect("Ethernet3", 400, "Opt4", ModuleChannel::A),
        Step::Clear("Ethernet1"),
    ])]
    fn contended_module_port_needs_no_resync(#[case] steps: Vec<Step>) {
        let mut store = MemoryTableStore::new();
        let mut current = ConfigTree::provisioned();
        for step in steps {
            let mut next = current.clone();
            match step {
                Step::Connect(iface, id, module, channel) => {
                    next.set_connection_id(iface, id).expect("id");
                    next.set_connection_module(iface, module).expect("module");
                    next.set_connection_channel(iface, channel).expect("channel");
                }
                Step::Clear(iface) => next.clear_connection(iface).expect("clear"),
            }
            let records = diff(&current, &next).expect("diff");
            reconcile(&current, &next, &records, &mut store).expect("reconcile");
            current = next;
        }
        let mutations = resync(&current, &DeviceMetadata::default(), &mut store).expect("resync");
        assert!(mutations.is_empty(), "unexpected drift: {mutations:?}");
    }

    #[test]
    fn resync_repairs_drift() {
        let mut store = MemoryTableStore::new();
        store
            .set_entry(Database::Config, VLAN_TABLE, "Vlan999", &Row::new())
            .expect("seed");
        let mutations = resync(&ConfigTree::provisioned(), &DeviceMetadata::default(), &mut store)
            .expect("resync");
        assert_eq!(mutations.len(), 1);
        assert!(store.get_table(Database::Config, VLAN_TABLE).expect("table").is_empty());
    }

    #[test]
    fn pseudo_interface_listing() {
        let listing = pseudo_interfaces(&ConfigTree::provisioned()).expect("listing");
        assert_eq!(listing.len(), 16);
        assert_eq!(listing[0].2, "Ethernet17");
        assert_eq!(listing[15].2, "Ethernet32");
    }
}
