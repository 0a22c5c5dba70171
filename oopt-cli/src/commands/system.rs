//! Device-wide operations: `reboot`, `stop`, `status` and `resync`.

use anyhow::{Context, Result};
use colored::Colorize;

use oopt_core::ConfigStore;
use oopt_orchestrator::{stop_system, ProcessOrchestrator};
use oopt_sync::resync;

use super::context::GlobalArgs;

/// Restart every process with the committed configuration.
pub fn reboot(global: &GlobalArgs) -> Result<()> {
    let head = global
        .store()
        .current_revision()
        .context("failed to load committed configuration")?;
    global.reboot(&head)
}

pub fn stop(global: &GlobalArgs) -> Result<()> {
    let mut orchestrator = global.orchestrator();
    stop_system(&mut orchestrator).context("failed to stop pods")?;
    println!("{} stopped", "✓".green());
    Ok(())
}

pub fn status(global: &GlobalArgs) -> Result<()> {
    let mut orchestrator = global.orchestrator();
    let listing = orchestrator.status().context("failed to list pods")?;
    print!("{listing}");
    Ok(())
}

/// Recompute every VLAN row from the committed configuration.
pub fn resync_vlans(global: &GlobalArgs) -> Result<()> {
    let head = global
        .store()
        .current_revision()
        .context("failed to load committed configuration")?;
    let settings = global.settings()?;
    let mut backend = global.backend();
    let mutations = resync(&head, &settings.device_metadata, &mut backend).context("resync failed")?;
    if mutations.is_empty() {
        println!("{} VLANs already in sync", "✓".green());
        return Ok(());
    }
    println!("{} resynced ({} backend writes)", "✓".green(), mutations.len());
    for mutation in &mutations {
        println!("  {mutation}");
    }
    Ok(())
}
