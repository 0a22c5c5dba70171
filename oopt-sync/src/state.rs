//! Operational state read back from the backend.
//!
//! Interface state comes from the network OS port table in
//! [`Database::Appl`]; module state from `MODULE_STATE_TABLE` in
//! [`Database::TransportState`]. Fields that are absent stay unset.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use serde_json::Value;

use oopt_core::{ChannelStats, ConfigError, Interface, ModuleChannel, OpticalModule};

use crate::error::BackendError;
use crate::table_store::{Database, Row, TableStore, APPL_PORT_TABLE, MODULE_STATE_TABLE};

fn invalid(key: &str, field: &str, value: &str) -> BackendError {
    BackendError::InvalidField {
        key: key.to_owned(),
        field: field.to_owned(),
        value: value.to_owned(),
    }
}

fn field<'r>(row: &'r Row, name: &str) -> Option<&'r str> {
    row.get(name).and_then(|v| v.as_str())
}

// ---------------------------------------------------------------------------
// Interfaces
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LinkStatus {
    Up,
    Down,
}

impl LinkStatus {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "up" => Some(LinkStatus::Up),
            "down" => Some(LinkStatus::Down),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct InterfaceState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_status: Option<LinkStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oper_status: Option<LinkStatus>,
}

impl InterfaceState {
    /// Read the state of interface `name`; an unknown interface has empty
    /// state.
    pub fn read(backend: &dyn TableStore, name: &str) -> Result<Self, BackendError> {
        let Some(row) = backend.get_entry(Database::Appl, APPL_PORT_TABLE, name)? else {
            return Ok(Self::default());
        };
        let mut state = Self::default();
        if let Some(mtu) = field(&row, "mtu") {
            state.mtu = Some(mtu.parse().map_err(|_| invalid(name, "mtu", mtu))?);
        }
        // Unrecognised status strings are left unset.
        state.admin_status = field(&row, "admin_status").and_then(LinkStatus::parse);
        state.oper_status = field(&row, "oper_status").and_then(LinkStatus::parse);
        Ok(state)
    }

    /// The interface's configuration with its state laid over it.
    pub fn overlay(&self, interface: &Interface) -> Result<Value, ConfigError> {
        overlay(interface, self)
    }
}

// ---------------------------------------------------------------------------
// Optical modules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationStatus {
    Down,
    BootingTopHalf,
    WaitingRxSignal,
    BootingBottomHalf,
    Testing,
    Ready,
    Resetting,
}

impl OperationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationStatus::Down => "down",
            OperationStatus::BootingTopHalf => "booting-top-half",
            OperationStatus::WaitingRxSignal => "waiting-rx-signal",
            OperationStatus::BootingBottomHalf => "booting-bottom-half",
            OperationStatus::Testing => "testing",
            OperationStatus::Ready => "ready",
            OperationStatus::Resetting => "resetting",
        }
    }
}

impl FromStr for OperationStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "down" => OperationStatus::Down,
            "booting-top-half" => OperationStatus::BootingTopHalf,
            "waiting-rx-signal" => OperationStatus::WaitingRxSignal,
            "booting-bottom-half" => OperationStatus::BootingBottomHalf,
            "testing" => OperationStatus::Testing,
            "ready" => OperationStatus::Ready,
            "resetting" => OperationStatus::Resetting,
            _ => return Err(()),
        })
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-polarization RMS readings of the coherent receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rms {
    pub xi: u16,
    pub xq: u16,
    pub yi: u16,
    pub yq: u16,
}

impl Rms {
    /// Parse `(xi, xq, yi, yq)`; parentheses and spaces are ignored.
    fn parse(key: &str, value: &str) -> Result<Self, BackendError> {
        let elems: Vec<&str> = value.split(',').collect();
        if elems.len() != 4 {
            return Err(invalid(key, "rms", value));
        }
        let num = |elem: &str| {
            elem.trim_matches(|c: char| c == '(' || c == ')' || c == ' ')
                .parse::<u16>()
                .map_err(|_| invalid(key, "rms", value))
        };
        Ok(Self {
            xi: num(elems[0])?,
            xq: num(elems[1])?,
            yi: num(elems[2])?,
            yq: num(elems[3])?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleState {
    #[serde(rename = "optical-module-rms", skip_serializing_if = "Option::is_none")]
    pub rms: Option<Rms>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_status: Option<OperationStatus>,
    /// BER counters per module channel.
    #[serde(skip)]
    pub channels: Vec<ChannelStats>,
}

impl ModuleState {
    pub fn read(backend: &dyn TableStore, name: &str) -> Result<Self, BackendError> {
        let Some(row) = backend.get_entry(Database::TransportState, MODULE_STATE_TABLE, name)? else {
            return Ok(Self::default());
        };
        let mut state = Self::default();
        if let Some(rms) = field(&row, "rms") {
            state.rms = Some(Rms::parse(name, rms)?);
        }
        state.sync_error = match field(&row, "sync-error") {
            Some("true") => Some(true),
            Some("false") => Some(false),
            _ => None,
        };
        state.operation_status = field(&row, "status").and_then(|s| s.parse().ok());

        for channel in ModuleChannel::all() {
            let suffix = format!("-ch{}", channel.index());
            let ber = |kind: &str| field(&row, &format!("{kind}{suffix}")).map(str::to_owned);
            let stats = ChannelStats {
                name: channel.to_string(),
                occupancy: None,
                hd_fec_ber: ber("hd-fec-ber"),
                sd_fec_ber: ber("sd-fec-ber"),
                post_fec_ber: ber("post-fec-ber"),
            };
            if stats.hd_fec_ber.is_some() || stats.sd_fec_ber.is_some() || stats.post_fec_ber.is_some() {
                state.channels.push(stats);
            }
        }
        Ok(state)
    }

    /// Merge the BER counters into `module`'s channel statistics, keeping any
    /// occupancy already there.
    pub fn apply_to(&self, module: &mut OpticalModule) {
        for read in &self.channels {
            let stats = module
                .channel_stats
                .entry(read.name.clone())
                .or_insert_with(|| ChannelStats {
                    name: read.name.clone(),
                    ..ChannelStats::default()
                });
            stats.hd_fec_ber = read.hd_fec_ber.clone();
            stats.sd_fec_ber = read.sd_fec_ber.clone();
            stats.post_fec_ber = read.post_fec_ber.clone();
        }
    }

    /// `module` with the BER counters merged in and the remaining state laid
    /// over it.
    pub fn overlay(&self, module: &OpticalModule) -> Result<Value, ConfigError> {
        let mut module = module.clone();
        self.apply_to(&mut module);
        overlay(&module, self)
    }
}

fn overlay<C: Serialize, S: Serialize>(config: &C, state: &S) -> Result<Value, ConfigError> {
    let mut out = serde_json::to_value(config)?;
    if let (Value::Object(out), Value::Object(state)) = (&mut out, serde_json::to_value(state)?) {
        out.extend(state);
    }
    Ok(out)
}
