//! Candidate edits: `port`, `interface`, `optical-module` and
//! `allow-oversubscription`. Every edit validates the whole candidate before
//! saving it; nothing reaches the device until `commit`.

use anyhow::{Context, Result};
use clap::{builder::BoolishValueParser, ArgAction, Args, Subcommand, ValueEnum};

use oopt_core::{ChannelSpeed, ConfigTree, FrequencyGrid, ModulationType, ModuleChannel};
use oopt_sync::state::{InterfaceState, ModuleState};

use super::context::GlobalArgs;

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct PortArgs {
    /// Port name, e.g. `Port1`.
    pub name: String,

    #[command(subcommand)]
    pub action: PortAction,
}

#[derive(Subcommand, Debug)]
pub enum PortAction {
    /// Set the breakout channel count (1, 2 or 4). Recreates the interfaces.
    NumChannels { num_channels: u8 },
    /// Set the per-channel speed, e.g. `SPEED_25GB`.
    ChannelSpeed { speed: ChannelSpeed },
    /// Set the description; omit the text to clear it.
    Description { text: Option<String> },
}

impl PortArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let (store, mut tree) = global.candidate()?;
        let name = self.name.as_str();
        match self.action {
            PortAction::NumChannels { num_channels } => tree.set_num_channels(name, num_channels),
            PortAction::ChannelSpeed { speed } => tree.set_channel_speed(name, speed),
            PortAction::Description { text } => tree.set_port_description(name, text),
        }
        .with_context(|| format!("failed to edit {name}"))?;
        global.save_edit(&store, &tree)
    }
}

// ---------------------------------------------------------------------------
// Interfaces
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct InterfaceArgs {
    /// Interface name, e.g. `Ethernet1` or `Ethernet1_2`.
    pub name: String,

    #[command(subcommand)]
    pub action: InterfaceAction,
}

#[derive(Subcommand, Debug)]
pub enum InterfaceAction {
    /// Edit the connection to an optical module channel.
    #[command(name = "optical-module-connection", alias = "connection")]
    Connection {
        #[command(subcommand)]
        field: ConnectionField,
    },
    /// Set the description; omit the text to clear it.
    Description { text: Option<String> },
    /// Show the configuration with the operational state laid over it.
    State,
}

#[derive(Subcommand, Debug)]
pub enum ConnectionField {
    /// VLAN id shared by everything on the same connection (100..=4000).
    Id { id: u32 },
    /// Optical module carrying the traffic, e.g. `Opt1`.
    OpticalModule { module: String },
    /// Line-side channel of the module.
    Channel { channel: ModuleChannel },
    /// Remove the connection.
    Clear,
}

impl InterfaceArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let (store, mut tree) = global.candidate()?;
        let name = self.name.as_str();
        match self.action {
            InterfaceAction::Connection { field } => match field {
                ConnectionField::Id { id } => tree.set_connection_id(name, id),
                ConnectionField::OpticalModule { module } => tree.set_connection_module(name, &module),
                ConnectionField::Channel { channel } => tree.set_connection_channel(name, channel),
                ConnectionField::Clear => tree.clear_connection(name),
            },
            InterfaceAction::Description { text } => tree.set_interface_description(name, text),
            InterfaceAction::State => return show_interface_state(global, &tree, name),
        }
        .with_context(|| format!("failed to edit {name}"))?;
        global.save_edit(&store, &tree)
    }
}

fn show_interface_state(global: &GlobalArgs, tree: &ConfigTree, name: &str) -> Result<()> {
    let interface = tree.interface(name)?;
    let state = InterfaceState::read(&global.backend(), name)
        .with_context(|| format!("failed to read state of {name}"))?;
    let view = state.overlay(interface)?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Optical modules
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct OpticalModuleArgs {
    /// Module name, e.g. `Opt1`.
    pub name: String,

    #[command(subcommand)]
    pub action: ModuleAction,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Override {
    True,
    False,
    /// Follow the device-wide setting.
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum ModuleAction {
    Frequency {
        #[command(subcommand)]
        field: FrequencyField,
    },
    /// BER measurement interval in seconds (at least 5).
    BerInterval { seconds: u32 },
    Prbs {
        #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        on: bool,
    },
    Losi {
        #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
        on: bool,
    },
    Enable,
    Disable,
    /// `DP_QPSK` or `DP_16QAM`.
    ModulationType { modulation: ModulationType },
    AllowOversubscription {
        #[arg(value_enum)]
        value: Override,
    },
    /// Set the description; omit the text to clear it.
    Description { text: Option<String> },
    /// Show the configuration with defaults, occupancy and the operational
    /// state laid over it.
    State,
}

#[derive(Subcommand, Debug)]
pub enum FrequencyField {
    /// `GRID_25GHZ`, `GRID_33GHZ`, `GRID_50GHZ` or `GRID_100GHZ`.
    Grid { grid: FrequencyGrid },
    Channel { channel: u8 },
}

impl OpticalModuleArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let (store, mut tree) = global.candidate()?;
        let name = self.name.as_str();
        match self.action {
            ModuleAction::Frequency { field } => match field {
                FrequencyField::Grid { grid } => tree.set_frequency_grid(name, grid),
                FrequencyField::Channel { channel } => tree.set_frequency_channel(name, channel),
            },
            ModuleAction::BerInterval { seconds } => tree.set_ber_interval(name, seconds),
            ModuleAction::Prbs { on } => tree.set_prbs(name, on),
            ModuleAction::Losi { on } => tree.set_losi(name, on),
            ModuleAction::Enable => tree.set_enabled(name, true),
            ModuleAction::Disable => tree.set_enabled(name, false),
            ModuleAction::ModulationType { modulation } => tree.set_modulation_type(name, modulation),
            ModuleAction::AllowOversubscription { value } => {
                let allow = match value {
                    Override::True => Some(true),
                    Override::False => Some(false),
                    Override::Clear => None,
                };
                tree.set_module_allow_oversubscription(name, allow)
            }
            ModuleAction::Description { text } => tree.set_module_description(name, text),
            ModuleAction::State => return show_module_state(global, &tree, name),
        }
        .with_context(|| format!("failed to edit {name}"))?;
        global.save_edit(&store, &tree)
    }
}

fn show_module_state(global: &GlobalArgs, tree: &ConfigTree, name: &str) -> Result<()> {
    let module = oopt_core::defaults::fill_defaults(tree.optical_module(name)?, tree)?;
    let state = ModuleState::read(&global.backend(), name)
        .with_context(|| format!("failed to read state of {name}"))?;
    let view = state.overlay(&module)?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

#[derive(Args, Debug)]
pub struct AllowOversubscriptionArgs {
    #[arg(action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub allow: bool,
}

impl AllowOversubscriptionArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let (store, mut tree) = global.candidate()?;
        tree.set_allow_oversubscription(self.allow);
        global.save_edit(&store, &tree)
    }
}
