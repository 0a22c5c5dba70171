//! oopt: configuration agent for a packet-optical transponder.
//!
//! # Usage
//!
//! ```text
//! oopt init [--force]
//! oopt dump [--verbose]
//! oopt get <path>
//! oopt port <name> num-channels|channel-speed|description ...
//! oopt interface <name> optical-module-connection|description|state ...
//! oopt optical-module <name> frequency|ber-interval|prbs|losi|enable|disable|...
//! oopt allow-oversubscription <true|false>
//! oopt commit [-m <msg>] [--reboot]
//! oopt rollback [-n <n>] [-m <msg>] [--reboot]
//! oopt diff | log | reboot | stop | status | resync
//! ```

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{
    context::GlobalArgs,
    edit::{AllowOversubscriptionArgs, InterfaceArgs, OpticalModuleArgs, PortArgs},
    history::{CommitArgs, DiffArgs, LogArgs, RollbackArgs},
    init::InitArgs,
    show::{DumpArgs, GetArgs},
    system,
};
use oopt_orchestrator::init_tracing;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "oopt",
    version,
    about = "Configure a packet-optical transponder",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Provision the factory configuration and reboot.
    Init(InitArgs),

    /// Print the candidate configuration.
    Dump(DumpArgs),

    /// Print one value or subtree of the candidate configuration.
    Get(GetArgs),

    /// Edit a port of the candidate.
    Port(PortArgs),

    /// Edit an interface of the candidate, or show its state.
    Interface(InterfaceArgs),

    /// Edit an optical module of the candidate, or show its state.
    OpticalModule(OpticalModuleArgs),

    /// Set the device-wide oversubscription default.
    AllowOversubscription(AllowOversubscriptionArgs),

    /// Commit the candidate and apply it to the device.
    Commit(CommitArgs),

    /// Re-commit an earlier revision.
    Rollback(RollbackArgs),

    /// Show what committing the candidate would change.
    Diff(DiffArgs),

    /// List committed revisions, newest first.
    Log(LogArgs),

    /// Restart every process with the committed configuration.
    Reboot,

    /// Stop every process.
    Stop,

    /// List the running processes.
    Status,

    /// Recompute the VLAN tables from the committed configuration.
    Resync,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.global.log_format.into());
    oopt_core::check_name_tables().context("built-in name tables are inconsistent")?;

    let global = &cli.global;
    match cli.command {
        Commands::Init(args) => args.run(global),
        Commands::Dump(args) => args.run(global),
        Commands::Get(args) => args.run(global),
        Commands::Port(args) => args.run(global),
        Commands::Interface(args) => args.run(global),
        Commands::OpticalModule(args) => args.run(global),
        Commands::AllowOversubscription(args) => args.run(global),
        Commands::Commit(args) => args.run(global),
        Commands::Rollback(args) => args.run(global),
        Commands::Diff(args) => args.run(global),
        Commands::Log(args) => args.run(global),
        Commands::Reboot => system::reboot(global),
        Commands::Stop => system::stop(global),
        Commands::Status => system::status(global),
        Commands::Resync => system::resync_vlans(global),
    }
}
