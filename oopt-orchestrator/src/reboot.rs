//! Full reconfiguration of the device.
//!
//! Used after `init`, on commits that change a port's breakout, and on an
//! explicit `reboot`. Every derived table is rewritten, so the backend ends
//! up matching the committed tree regardless of what it held before.

use std::time::Duration;

use tracing::info;

use oopt_core::ConfigTree;
use oopt_renderer::{Manifest, Renderer};
use oopt_sync::derived::{switch_config, write_switch_config, write_transport_config};
use oopt_sync::{Mutation, TableStore};

use crate::error::OrchestratorError;
use crate::paths::MIN_READY_TIMEOUT;
use crate::process::ProcessOrchestrator;

/// Pods in the order they are stopped.
pub const STOP_ORDER: [Manifest; 4] = [
    Manifest::TransportSync,
    Manifest::NetworkOs,
    Manifest::HardwareAbstraction,
    Manifest::StateDb,
];

#[derive(Debug, Default)]
pub struct RebootReport {
    /// Pods restarted, in order.
    pub restarted: Vec<&'static str>,
    /// Backend writes made while the state DB was fresh.
    pub mutations: Vec<Mutation>,
}

fn restart(
    orchestrator: &mut dyn ProcessOrchestrator,
    renderer: &Renderer,
    manifest: Manifest,
    report: &mut RebootReport,
) -> Result<(), OrchestratorError> {
    info!(pod = manifest.pod_name(), "restarting");
    orchestrator.restart(manifest.pod_name(), &renderer.pod(manifest)?)?;
    report.restarted.push(manifest.pod_name());
    Ok(())
}

/// Restart every process and push the whole derived configuration of
/// `tree` to the backend.
///
/// The state DB comes first and must report ready before anything is
/// written. The hardware-abstraction process is skipped in virtual mode.
pub fn reboot_system(
    orchestrator: &mut dyn ProcessOrchestrator,
    renderer: &Renderer,
    tree: &ConfigTree,
    backend: &mut dyn TableStore,
) -> Result<RebootReport, OrchestratorError> {
    let settings = renderer.settings();
    let switch = switch_config(tree, &settings.device_metadata)?;
    let switch_json = switch.to_json()?;

    let mut report = RebootReport::default();
    restart(orchestrator, renderer, Manifest::StateDb, &mut report)?;
    let timeout = Duration::from_secs(settings.state_db_ready_timeout_secs).max(MIN_READY_TIMEOUT);
    orchestrator.wait_ready(Manifest::StateDb.pod_name(), timeout)?;

    report.mutations.extend(write_transport_config(tree, backend)?);
    report.mutations.extend(write_switch_config(&switch, backend)?);

    if renderer.virtual_mode() {
        info!("virtual mode, hardware abstraction skipped");
    } else {
        orchestrator.apply_config_map(oopt_renderer::HAL_CONFIG_MAP, &renderer.hal_config_map(tree)?)?;
        restart(orchestrator, renderer, Manifest::HardwareAbstraction, &mut report)?;
    }

    restart(orchestrator, renderer, Manifest::TransportSync, &mut report)?;

    orchestrator.apply_config_map(
        oopt_renderer::SWITCH_CONFIG_MAP,
        &renderer.switch_config_map(&switch_json)?,
    )?;
    restart(orchestrator, renderer, Manifest::NetworkOs, &mut report)?;

    info!(
        pods = report.restarted.len(),
        mutations = report.mutations.len(),
        "reboot complete"
    );
    Ok(report)
}

/// Stop every process; pods that are not running are skipped.
pub fn stop_system(orchestrator: &mut dyn ProcessOrchestrator) -> Result<(), OrchestratorError> {
    for manifest in STOP_ORDER {
        orchestrator.stop(manifest.pod_name())?;
    }
    info!("all pods stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::{Event, RecordingOrchestrator};
    use oopt_core::{ModuleChannel, Settings};
    use oopt_sync::table_store::{MODULE_CONFIG_TABLE, PORT_TABLE, VLAN_TABLE};
    use oopt_sync::{Database, MemoryTableStore};

    fn renderer(virtual_mode: bool) -> Renderer {
        Renderer::new(None, Settings::default(), virtual_mode).expect("renderer")
    }

    fn connected() -> ConfigTree {
        let mut tree = ConfigTree::provisioned();
        tree.set_connection_id("Ethernet2", 300).expect("id");
        tree.set_connection_module("Ethernet2", "Opt2").expect("module");
        tree.set_connection_channel("Ethernet2", ModuleChannel::B).expect("channel");
        tree
    }

    #[test]
    fn reboot_order_on_hardware() {
        let mut orchestrator = RecordingOrchestrator::new();
        let mut backend = MemoryTableStore::new();
        let report = reboot_system(&mut orchestrator, &renderer(false), &connected(), &mut backend)
            .expect("reboot");

        assert_eq!(
            orchestrator.labels(),
            [
                "restart redis",
                "wait redis",
                "config-map ofdpa-config",
                "restart ofdpa",
                "restart transyncd",
                "config-map sonic-config",
                "restart sonic",
            ]
        );
        assert_eq!(report.restarted, ["redis", "ofdpa", "transyncd", "sonic"]);

        assert_eq!(backend.get_table(Database::Config, PORT_TABLE).expect("ports").len(), 32);
        assert_eq!(
            backend.get_table(Database::TransportConfig, MODULE_CONFIG_TABLE).expect("modules").len(),
            8
        );
        assert!(backend
            .get_entry(Database::Config, VLAN_TABLE, "Vlan300")
            .expect("get")
            .is_some());
    }

    #[test]
    fn virtual_mode_skips_hardware_abstraction() {
        let mut orchestrator = RecordingOrchestrator::new();
        let mut backend = MemoryTableStore::new();
        let report = reboot_system(
            &mut orchestrator,
            &renderer(true),
            &ConfigTree::provisioned(),
            &mut backend,
        )
        .expect("reboot");
        assert_eq!(report.restarted, ["redis", "transyncd", "sonic"]);
        assert!(!orchestrator.labels().iter().any(|l| l.contains("ofdpa")));
    }

    #[test]
    fn network_os_receives_the_switch_config() {
        let mut orchestrator = RecordingOrchestrator::new();
        let mut backend = MemoryTableStore::new();
        reboot_system(&mut orchestrator, &renderer(true), &connected(), &mut backend).expect("reboot");
        let manifest = orchestrator
            .events
            .iter()
            .find_map(|e| match e {
                Event::ConfigMap { name, manifest } if name == "sonic-config" => Some(manifest.clone()),
                _ => None,
            })
            .expect("sonic config map");
        assert!(manifest.contains("config_db.json"));
        assert!(manifest.contains("Vlan300"));
    }

    #[test]
    fn state_db_not_ready_stops_before_writing() {
        let mut orchestrator = RecordingOrchestrator::new();
        orchestrator.never_ready.insert("redis".to_owned());
        let mut backend = MemoryTableStore::new();
        let err = reboot_system(&mut orchestrator, &renderer(false), &connected(), &mut backend)
            .expect_err("redis never ready");
        assert!(matches!(err, OrchestratorError::NotReady { .. }), "{err}");
        assert_eq!(orchestrator.labels(), ["restart redis", "wait redis"]);
        assert!(backend.get_table(Database::Config, PORT_TABLE).expect("ports").is_empty());
    }

    #[test]
    fn stop_goes_in_reverse_dependency_order() {
        let mut orchestrator = RecordingOrchestrator::new();
        let mut backend = MemoryTableStore::new();
        reboot_system(&mut orchestrator, &renderer(false), &connected(), &mut backend).expect("reboot");
        orchestrator.events.clear();

        stop_system(&mut orchestrator).expect("stop");
        assert_eq!(
            orchestrator.labels(),
            ["stop transyncd", "stop sonic", "stop ofdpa", "stop redis"]
        );
        assert!(orchestrator.running.is_empty());
        // A second stop finds nothing running.
        orchestrator.events.clear();
        stop_system(&mut orchestrator).expect("stop");
        assert!(orchestrator.events.is_empty());
    }
}
