//! End-to-end edit → validate → commit flow against the filesystem store.

use oopt_core::defaults::fill_tree_defaults;
use oopt_core::query::{get, Encoding};
use oopt_core::validate::{ensure_valid, validate_final};
use oopt_core::{
    ChannelSpeed, ConfigError, ConfigStore, ConfigTree, FsConfigStore, ModuleChannel, Violation,
};
use rstest::rstest;
use serde_json::json;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn initialized() -> (TempDir, FsConfigStore) {
    let tmp = TempDir::new().expect("tempdir");
    let mut store = FsConfigStore::new(tmp.path());
    store.init(false).expect("init");
    (tmp, store)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn edits_survive_a_save_load_cycle() {
    let (_tmp, store) = initialized();
    let mut tree = store.load_candidate().expect("candidate");
    tree.set_num_channels("Port4", 4).expect("breakout");
    tree.set_channel_speed("Port4", ChannelSpeed::Speed10Gb).expect("speed");
    tree.set_connection_id("Ethernet4_2", 400).expect("id");
    tree.set_connection_module("Ethernet4_2", "Opt3").expect("module");
    tree.set_connection_channel("Ethernet4_2", ModuleChannel::B).expect("channel");
    store.save_candidate(&tree).expect("save");

    let loaded = store.load_candidate().expect("reload");
    assert_eq!(loaded, tree);
    assert!(validate_final(&loaded).is_empty());
}

#[test]
fn persisted_document_is_hyphenated_json() {
    let (tmp, store) = initialized();
    let mut tree = store.load_candidate().expect("candidate");
    tree.set_connection_id("Ethernet1", 100).expect("id");
    tree.set_connection_module("Ethernet1", "Opt1").expect("module");
    store.save_candidate(&tree).expect("save");

    let text = std::fs::read_to_string(tmp.path().join("config.json")).expect("read");
    assert!(text.ends_with('\n'));
    let doc: serde_json::Value = serde_json::from_str(&text).expect("json");
    assert_eq!(
        doc["interfaces"]["Ethernet1"]["optical-module-connection"],
        json!({"id": 100, "optical-module": {"name": "Opt1"}})
    );
}

#[test]
fn invalid_candidate_is_reported_with_all_names() {
    let (_tmp, store) = initialized();
    let mut tree = store.load_candidate().expect("candidate");
    for iface in ["Ethernet5", "Ethernet6"] {
        tree.set_connection_id(iface, 555).expect("id");
        tree.set_connection_module(iface, "Opt2").expect("module");
        tree.set_connection_channel(iface, ModuleChannel::A).expect("channel");
    }
    let err = ensure_valid(&tree).unwrap_err();
    let ConfigError::Invalid(violations) = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(
        violations,
        &vec![Violation::DuplicateConnectionId {
            id: 555,
            first: "Ethernet5".into(),
            second: "Ethernet6".into(),
        }]
    );
    assert!(err.to_string().contains("Ethernet5, Ethernet6"));
}

#[rstest]
#[case("/optical-modules/Opt1/frequency/grid", json!("GRID_50GHZ"))]
#[case("/optical-modules/Opt1/modulation-type", json!("DP_16QAM"))]
#[case("/optical-modules/Opt1/channel-stats/A/occupancy", json!(0.0))]
fn verbose_reads_see_defaults(#[case] path: &str, #[case] expected: serde_json::Value) {
    let filled = fill_tree_defaults(&ConfigTree::provisioned()).expect("fill");
    assert_eq!(get(&filled, path, Encoding::Json).expect("get"), expected);
}

#[test]
fn committed_head_does_not_follow_later_candidate_edits() {
    let (_tmp, mut store) = initialized();
    let mut tree = store.load_candidate().expect("candidate");
    tree.set_prbs("Opt4", true).expect("prbs");
    store.commit_revision(&tree, "prbs on").expect("commit");

    tree.set_prbs("Opt4", false).expect("prbs");
    store.save_candidate(&tree).expect("save");

    let head = store.current_revision().expect("head");
    assert_eq!(head.optical_module("Opt4").expect("module").prbs, Some(true));
    assert_eq!(store.list_revisions().expect("log").len(), 2);
}
