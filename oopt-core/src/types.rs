//! Domain types for the transponder configuration tree.
//!
//! The tree serializes to a single JSON document with hyphenated field names.
//! Field declaration order is significant: it is the order in which the diff
//! engine reports leaf changes within an entity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::names::{ChannelSpeed, FrequencyGrid, ModulationType, ModuleChannel};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const PORT_PREFIX: &str = "Port";
pub const INTERFACE_PREFIX: &str = "Ethernet";
pub const OPTICAL_MODULE_PREFIX: &str = "Opt";

/// Front-panel client ports on the device.
pub const PORT_COUNT: u32 = 16;
/// Line-side optical modules; each contributes two switch-facing ports.
pub const OPTICAL_MODULE_COUNT: u32 = 8;

pub const DEFAULT_MTU: u16 = 1500;

pub const MIN_CONNECTION_ID: u32 = 100;
pub const MAX_CONNECTION_ID: u32 = 4000;
pub const MIN_BER_INTERVAL: u32 = 5;

fn default_mtu() -> u16 {
    DEFAULT_MTU
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BreakoutMode {
    pub num_channels: u8,
    pub channel_speed: ChannelSpeed,
}

/// A physical front-panel port. Ports exist from provisioning onward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Port {
    pub name: String,
    pub breakout_mode: BreakoutMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Interfaces
// ---------------------------------------------------------------------------

/// Reference from an interface to one channel of an optical module, by name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ModuleChannel>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OpticalModuleConnection {
    /// VLAN id shared by the interface and the module-side port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optical_module: Option<ModuleRef>,
}

/// A fully specified connection: every field of [`OpticalModuleConnection`] set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteConnection<'a> {
    pub id: u32,
    pub module: &'a str,
    pub channel: ModuleChannel,
}

impl OpticalModuleConnection {
    pub fn module_name(&self) -> Option<&str> {
        self.optical_module.as_ref()?.name.as_deref()
    }

    pub fn channel(&self) -> Option<ModuleChannel> {
        self.optical_module.as_ref()?.channel
    }

    /// Returns the connection when id, module name and channel are all set.
    pub fn complete(&self) -> Option<CompleteConnection<'_>> {
        Some(CompleteConnection {
            id: self.id?,
            module: self.module_name()?,
            channel: self.channel()?,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.complete().is_some()
    }
}

/// An Ethernet interface. Interfaces are created and destroyed only as a
/// side effect of changing the owning port's breakout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Interface {
    pub name: String,
    #[serde(default = "default_mtu")]
    pub mtu: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optical_module_connection: Option<OpticalModuleConnection>,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mtu: DEFAULT_MTU,
            description: None,
            optical_module_connection: None,
        }
    }

    pub fn connection(&self) -> Option<CompleteConnection<'_>> {
        self.optical_module_connection.as_ref()?.complete()
    }
}

// ---------------------------------------------------------------------------
// Optical modules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Frequency {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<FrequencyGrid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
}

/// Derived per-channel statistics. Filled for display only.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ChannelStats {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupancy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hd_fec_ber: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sd_fec_ber: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_fec_ber: Option<String>,
}

/// A line-side coherent optical module. Unset fields take the values in
/// [`crate::defaults`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OpticalModule {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ber_interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prbs: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub losi: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modulation_type: Option<ModulationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Overrides the device-wide flag when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_oversubscription: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub channel_stats: BTreeMap<String, ChannelStats>,
}

impl OpticalModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

/// Root of the device configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConfigTree {
    #[serde(default)]
    pub ports: BTreeMap<String, Port>,
    #[serde(default)]
    pub interfaces: BTreeMap<String, Interface>,
    #[serde(default)]
    pub optical_modules: BTreeMap<String, OpticalModule>,
    #[serde(default)]
    pub allow_oversubscription: bool,
}

impl ConfigTree {
    /// The factory configuration: every port at 1x100G with one interface,
    /// every optical module present with all fields unset.
    pub fn provisioned() -> Self {
        let mut tree = Self::default();
        for i in 1..=PORT_COUNT {
            let name = format!("{PORT_PREFIX}{i}");
            tree.ports.insert(
                name.clone(),
                Port {
                    name,
                    breakout_mode: BreakoutMode {
                        num_channels: 1,
                        channel_speed: ChannelSpeed::Speed100Gb,
                    },
                    description: None,
                },
            );
            let iface = format!("{INTERFACE_PREFIX}{i}");
            tree.interfaces.insert(iface.clone(), Interface::new(iface));
        }
        for i in 1..=OPTICAL_MODULE_COUNT {
            let name = format!("{OPTICAL_MODULE_PREFIX}{i}");
            tree.optical_modules
                .insert(name.clone(), OpticalModule::new(name));
        }
        tree
    }

    pub fn port(&self, name: &str) -> Result<&Port, ConfigError> {
        self.ports
            .get(name)
            .ok_or_else(|| ConfigError::UnknownPort(name.to_owned()))
    }

    pub fn port_mut(&mut self, name: &str) -> Result<&mut Port, ConfigError> {
        self.ports
            .get_mut(name)
            .ok_or_else(|| ConfigError::UnknownPort(name.to_owned()))
    }

    pub fn interface(&self, name: &str) -> Result<&Interface, ConfigError> {
        self.interfaces
            .get(name)
            .ok_or_else(|| ConfigError::UnknownInterface(name.to_owned()))
    }

    pub fn interface_mut(&mut self, name: &str) -> Result<&mut Interface, ConfigError> {
        self.interfaces
            .get_mut(name)
            .ok_or_else(|| ConfigError::UnknownInterface(name.to_owned()))
    }

    pub fn optical_module(&self, name: &str) -> Result<&OpticalModule, ConfigError> {
        self.optical_modules
            .get(name)
            .ok_or_else(|| ConfigError::UnknownOpticalModule(name.to_owned()))
    }

    pub fn optical_module_mut(&mut self, name: &str) -> Result<&mut OpticalModule, ConfigError> {
        self.optical_modules
            .get_mut(name)
            .ok_or_else(|| ConfigError::UnknownOpticalModule(name.to_owned()))
    }

    /// The port owning `interface`, looked up through the naming convention.
    pub fn port_of_interface(&self, interface: &str) -> Result<&Port, ConfigError> {
        let (port, _) = parse_interface_name(interface)?;
        self.port(&format!("{PORT_PREFIX}{port}"))
    }

    /// Interfaces with a complete connection to `module`, in name order.
    pub fn interfaces_connected_to<'a>(
        &'a self,
        module: &'a str,
        channel: ModuleChannel,
    ) -> impl Iterator<Item = &'a Interface> + 'a {
        self.interfaces.values().filter(move |iface| {
            iface
                .connection()
                .is_some_and(|c| c.module == module && c.channel == channel)
        })
    }

    /// Drop every derived field so the tree can be persisted.
    pub fn clear_derived(&mut self) {
        for module in self.optical_modules.values_mut() {
            module.channel_stats.clear();
        }
    }

    /// Persisted form: pretty JSON without derived fields, newline-terminated.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        let mut doc = self.clone();
        doc.clear_derived();
        let mut json = serde_json::to_string_pretty(&doc)?;
        json.push('\n');
        Ok(json)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let mut tree: Self = serde_json::from_str(json)?;
        tree.clear_derived();
        Ok(tree)
    }
}

// ---------------------------------------------------------------------------
// Naming convention
// ---------------------------------------------------------------------------

fn parse_index(name: &str, prefix: &str, kind: &'static str) -> Result<u32, ConfigError> {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.parse::<u32>().ok())
        .filter(|i| *i >= 1)
        .ok_or_else(|| ConfigError::InvalidName {
            kind,
            name: name.to_owned(),
        })
}

/// `Port<N>` → `N`.
pub fn port_index(name: &str) -> Result<u32, ConfigError> {
    parse_index(name, PORT_PREFIX, "port")
}

/// `Opt<K>` → `K`, for `K` in `1..=OPTICAL_MODULE_COUNT`.
pub fn module_index(name: &str) -> Result<u32, ConfigError> {
    let k = parse_index(name, OPTICAL_MODULE_PREFIX, "optical-module")?;
    if k > OPTICAL_MODULE_COUNT {
        return Err(ConfigError::InvalidName {
            kind: "optical-module",
            name: name.to_owned(),
        });
    }
    Ok(k)
}

/// `Ethernet<N>` → `(N, None)`, `Ethernet<N>_<k>` → `(N, Some(k))`.
pub fn parse_interface_name(name: &str) -> Result<(u32, Option<u32>), ConfigError> {
    let invalid = || ConfigError::InvalidName {
        kind: "interface",
        name: name.to_owned(),
    };
    let rest = name.strip_prefix(INTERFACE_PREFIX).ok_or_else(invalid)?;
    let (port, sub) = match rest.split_once('_') {
        Some((port, sub)) => (port, Some(sub.parse::<u32>().map_err(|_| invalid())?)),
        None => (rest, None),
    };
    let port = port.parse::<u32>().map_err(|_| invalid())?;
    if port == 0 || sub == Some(0) {
        return Err(invalid());
    }
    Ok((port, sub))
}

/// Interfaces created for port `port` at breakout `num_channels`.
pub fn breakout_interface_names(port: u32, num_channels: u8) -> Vec<String> {
    if num_channels <= 1 {
        return vec![format!("{INTERFACE_PREFIX}{port}")];
    }
    (1..=u32::from(num_channels))
        .map(|k| format!("{INTERFACE_PREFIX}{port}_{k}"))
        .collect()
}

/// Switch-side interface wired to one channel of a module:
/// `Opt<K>` channel A → `Ethernet<2K-1+16>`, channel B → `Ethernet<2K+16>`.
pub fn pseudo_interface_name(module: &str, channel: ModuleChannel) -> Result<String, ConfigError> {
    let k = module_index(module)?;
    let n = 2 * k - 1 + PORT_COUNT + channel.index();
    Ok(format!("{INTERFACE_PREFIX}{n}"))
}
