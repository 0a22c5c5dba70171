//! Default values for optical modules and per-channel occupancy.

use tracing::warn;

use crate::error::ConfigError;
use crate::names::{FrequencyGrid, ModulationType, ModuleChannel};
use crate::types::{ChannelStats, ConfigTree, Frequency, OpticalModule};

pub const DEFAULT_GRID: FrequencyGrid = FrequencyGrid::Grid50Ghz;
pub const DEFAULT_FREQUENCY_CHANNEL: u8 = 1;
pub const DEFAULT_MODULATION: ModulationType = ModulationType::Dp16Qam;
pub const DEFAULT_BER_INTERVAL: u32 = 100;
pub const DEFAULT_PRBS: bool = false;
pub const DEFAULT_LOSI: bool = false;
pub const DEFAULT_ENABLED: bool = true;

/// Line capacity of one module channel carrying traffic, in Mb/s.
pub const CHANNEL_CAPACITY_MBPS: u64 = 100_000;

/// An optical module with every configurable field resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveModule {
    pub grid: FrequencyGrid,
    pub frequency_channel: u8,
    pub ber_interval: u32,
    pub prbs: bool,
    pub losi: bool,
    pub enabled: bool,
    pub modulation: ModulationType,
    pub allow_oversubscription: bool,
}

impl EffectiveModule {
    pub fn resolve(module: &OpticalModule, tree: &ConfigTree) -> Self {
        let freq = module.frequency.unwrap_or_default();
        Self {
            grid: freq.grid.unwrap_or(DEFAULT_GRID),
            frequency_channel: freq.channel.unwrap_or(DEFAULT_FREQUENCY_CHANNEL),
            ber_interval: module.ber_interval.unwrap_or(DEFAULT_BER_INTERVAL),
            prbs: module.prbs.unwrap_or(DEFAULT_PRBS),
            losi: module.losi.unwrap_or(DEFAULT_LOSI),
            enabled: module.enabled.unwrap_or(DEFAULT_ENABLED),
            modulation: module.modulation_type.unwrap_or(DEFAULT_MODULATION),
            allow_oversubscription: module
                .allow_oversubscription
                .unwrap_or(tree.allow_oversubscription),
        }
    }
}

/// Capacity of `channel` under `modulation`. QPSK carries traffic on A only.
pub fn channel_capacity_mbps(modulation: ModulationType, channel: ModuleChannel) -> u64 {
    match (modulation, channel) {
        (ModulationType::Dp16Qam, _) => CHANNEL_CAPACITY_MBPS,
        (ModulationType::DpQpsk, ModuleChannel::A) => CHANNEL_CAPACITY_MBPS,
        (ModulationType::DpQpsk, ModuleChannel::B) => 0,
    }
}

/// Sum of the speeds of every interface connected to `module`/`channel`.
/// An interface runs at its port's channel speed.
pub fn channel_demand_mbps(
    tree: &ConfigTree,
    module: &str,
    channel: ModuleChannel,
) -> Result<u64, ConfigError> {
    tree.interfaces_connected_to(module, channel)
        .map(|iface| {
            tree.port_of_interface(&iface.name)
                .map(|port| port.breakout_mode.channel_speed.mbps())
        })
        .sum()
}

/// Occupancy of one channel in percent. May exceed 100.
pub fn channel_occupancy(
    tree: &ConfigTree,
    module: &str,
    channel: ModuleChannel,
) -> Result<f64, ConfigError> {
    let modulation = tree
        .optical_module(module)?
        .modulation_type
        .unwrap_or(DEFAULT_MODULATION);
    let demand = channel_demand_mbps(tree, module, channel)?;
    let capacity = channel_capacity_mbps(modulation, channel);
    match (demand, capacity) {
        (0, _) => Ok(0.0),
        (_, 0) => Err(ConfigError::NoCapacity {
            module: module.to_owned(),
            channel,
        }),
        (demand, capacity) => Ok(100.0 * demand as f64 / capacity as f64),
    }
}

/// A copy of `module` with every unset field filled and `channel-stats`
/// carrying the computed occupancy of both channels.
pub fn fill_defaults(module: &OpticalModule, tree: &ConfigTree) -> Result<OpticalModule, ConfigError> {
    let eff = EffectiveModule::resolve(module, tree);
    let mut filled = module.clone();
    filled.frequency = Some(Frequency {
        grid: Some(eff.grid),
        channel: Some(eff.frequency_channel),
    });
    filled.ber_interval = Some(eff.ber_interval);
    filled.prbs = Some(eff.prbs);
    filled.losi = Some(eff.losi);
    filled.enabled = Some(eff.enabled);
    filled.modulation_type = Some(eff.modulation);
    filled.allow_oversubscription = Some(eff.allow_oversubscription);

    for channel in ModuleChannel::all() {
        let occupancy = channel_occupancy(tree, &module.name, channel)?;
        if occupancy > 100.0 && !eff.allow_oversubscription {
            warn!(
                module = %module.name,
                %channel,
                occupancy,
                "channel oversubscribed while oversubscription is not allowed"
            );
        }
        let stats = filled
            .channel_stats
            .entry(channel.to_string())
            .or_insert_with(|| ChannelStats {
                name: channel.to_string(),
                ..ChannelStats::default()
            });
        stats.occupancy = Some(occupancy);
    }
    Ok(filled)
}

/// [`fill_defaults`] applied to every module of `tree`.
pub fn fill_tree_defaults(tree: &ConfigTree) -> Result<ConfigTree, ConfigError> {
    let mut filled = tree.clone();
    for (name, module) in &tree.optical_modules {
        filled
            .optical_modules
            .insert(name.clone(), fill_defaults(module, tree)?);
    }
    Ok(filled)
}
