//! Template contexts: serializable rendering payloads built from the
//! configuration tree and the agent settings.

use serde::Serialize;

use oopt_core::types::{port_index, OPTICAL_MODULE_COUNT, PORT_COUNT};
use oopt_core::{ConfigError, ConfigTree};

use crate::error::RenderError;

/// Host directory shared with the state DB, holding its unix socket.
pub const STATE_DB_DIR: &str = "/var/run/redis";

/// Host directories mounted into the hardware-abstraction pod.
pub const HAL_HOST_DIRS: [&str; 5] = ["usr", "dev", "etc", "tmp", "lib"];

/// Platform named in the generated port configuration.
pub const HAL_PLATFORM: &str = "as7716-24xc";

/// Speed of the module-side ports, in Gb/s.
const MODULE_PORT_SPEED_GBPS: u64 = 100;

/// Logical port → hardware-abstraction port index.
const HAL_PORT_MAP: [(u32, u32); 32] = [
    (1, 68),
    (2, 72),
    (3, 76),
    (4, 80),
    (5, 96),
    (6, 106),
    (7, 110),
    (8, 114),
    (9, 118),
    (10, 122),
    (11, 126),
    (12, 130),
    (13, 84),
    (14, 88),
    (15, 92),
    (16, 102),
    (17, 38),
    (18, 34),
    (19, 46),
    (20, 42),
    (21, 54),
    (22, 50),
    (23, 62),
    (24, 58),
    (25, 5),
    (26, 1),
    (27, 13),
    (28, 9),
    (29, 21),
    (30, 17),
    (31, 25),
    (32, 29),
];

pub fn hal_index(index: u32) -> Option<u32> {
    HAL_PORT_MAP
        .iter()
        .find(|(logical, _)| *logical == index)
        .map(|(_, hal)| *hal)
}

// ---------------------------------------------------------------------------
// Pods
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct PodCtx {
    pub name: String,
    pub image: String,
    /// Image of the state DB, used by helper init containers.
    pub state_db_image: String,
    pub state_db_dir: String,
    /// Config map mounted into the pod, if any.
    pub config_map: Option<String>,
}

/// One network-OS daemon started through a shell.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonCtx {
    pub name: &'static str,
    pub command: &'static str,
}

/// Daemons of the network-OS pod after `syncd`, with their start delays.
pub const NETWORK_OS_DAEMONS: [DaemonCtx; 6] = [
    DaemonCtx {
        name: "orchagent",
        command: "sleep 10 && platform=mellanox orchagent",
    },
    DaemonCtx {
        name: "portsyncd",
        command: "sleep 13 && portsyncd",
    },
    DaemonCtx {
        name: "vlanmgrd",
        command: "mount -o remount,rw /sys && sleep 15 && vlanmgrd",
    },
    DaemonCtx {
        name: "intfmgrd",
        command: "sleep 15 && intfmgrd",
    },
    DaemonCtx {
        name: "intfsyncd",
        command: "sleep 15 && intfsyncd",
    },
    DaemonCtx {
        name: "neighsyncd",
        command: "sleep 15 && neighsyncd",
    },
];

/// Context for every pod template. Templates ignore what they don't use.
#[derive(Debug, Clone, Serialize)]
pub struct PodTemplateContext {
    pub pod: PodCtx,
    pub daemons: Vec<DaemonCtx>,
    pub host_dirs: Vec<&'static str>,
}

impl PodTemplateContext {
    pub fn new(pod: PodCtx) -> Self {
        Self {
            pod,
            daemons: NETWORK_OS_DAEMONS.to_vec(),
            host_dirs: HAL_HOST_DIRS.to_vec(),
        }
    }

    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        Ok(tera::Context::from_serialize(self)?)
    }
}

// ---------------------------------------------------------------------------
// Config maps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ConfigMapEntry {
    pub key: String,
    /// The value split into lines, rendered as a YAML literal block.
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigMapContext {
    pub name: String,
    pub entries: Vec<ConfigMapEntry>,
}

impl ConfigMapContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: &str) -> Self {
        self.entries.push(ConfigMapEntry {
            key: key.into(),
            lines: value.lines().map(str::to_owned).collect(),
        });
        self
    }

    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        Ok(tera::Context::from_serialize(self)?)
    }
}

// ---------------------------------------------------------------------------
// Hardware-abstraction port modes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HalPort {
    /// Logical port: 1..16 front panel, 17..32 module side.
    pub index: u32,
    pub hal_index: u32,
    pub num_channels: u8,
    pub speed_gbps: u64,
    pub module_side: bool,
    /// CFP2 cage number, on even module-side ports.
    pub cfp2: Option<u32>,
}

impl HalPort {
    fn new(index: u32, num_channels: u8, speed_gbps: u64) -> Result<Self, ConfigError> {
        let hal_index = hal_index(index).ok_or_else(|| ConfigError::InvalidName {
            kind: "port",
            name: index.to_string(),
        })?;
        let module_side = index > PORT_COUNT;
        let cfp2 = (module_side && index % 2 == 0).then(|| (index + 1 - PORT_COUNT) / 2);
        Ok(Self {
            index,
            hal_index,
            num_channels,
            speed_gbps,
            module_side,
            cfp2,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HalPortsContext {
    pub platform: &'static str,
    pub ports: Vec<HalPort>,
}

impl HalPortsContext {
    /// Front ports follow their breakout mode; module-side ports are always
    /// a single 100G channel.
    pub fn from_tree(tree: &ConfigTree) -> Result<Self, ConfigError> {
        let mut ports = Vec::new();
        for (name, port) in &tree.ports {
            let mode = port.breakout_mode;
            ports.push(HalPort::new(
                port_index(name)?,
                mode.num_channels,
                mode.channel_speed.gbps(),
            )?);
        }
        for index in PORT_COUNT + 1..=PORT_COUNT + 2 * OPTICAL_MODULE_COUNT {
            ports.push(HalPort::new(index, 1, MODULE_PORT_SPEED_GBPS)?);
        }
        ports.sort_by_key(|p| p.index);
        Ok(Self {
            platform: HAL_PLATFORM,
            ports,
        })
    }

    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        Ok(tera::Context::from_serialize(self)?)
    }
}
