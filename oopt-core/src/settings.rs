//! Agent settings, read from `settings.yaml` in the configuration directory.
//!
//! Every field has a default, so a missing file or a partial file is fine.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, RevisionError};

pub const SETTINGS_FILE: &str = "settings.yaml";

/// Switch-side device identity pushed into the `DEVICE_METADATA` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceMetadata {
    pub bgp_asn: u32,
    pub hostname: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub hwsku: String,
    pub mac: String,
}

impl Default for DeviceMetadata {
    fn default() -> Self {
        Self {
            bgp_asn: 65100,
            hostname: "cassini".into(),
            device_type: "packet-transponder".into(),
            hwsku: "AS7716-24XC".into(),
            mac: "a8:2b:b5:b5:51:d5".into(),
        }
    }
}

/// Container images for the managed processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Images {
    pub state_db: String,
    pub network_os: String,
    pub network_os_virtual: String,
    pub transport_sync: String,
    pub transport_sync_virtual: String,
    pub hardware_abstraction: String,
}

impl Default for Images {
    fn default() -> Self {
        Self {
            state_db: "redis".into(),
            network_os: "sonic".into(),
            network_os_virtual: "sonic:virtual".into(),
            transport_sync: "transyncd".into(),
            transport_sync_virtual: "transyncd:virtual".into(),
            hardware_abstraction: "debian:jessie".into(),
        }
    }
}

impl Images {
    pub fn network_os(&self, virtual_env: bool) -> &str {
        if virtual_env {
            &self.network_os_virtual
        } else {
            &self.network_os
        }
    }

    pub fn transport_sync(&self, virtual_env: bool) -> &str {
        if virtual_env {
            &self.transport_sync_virtual
        } else {
            &self.transport_sync
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device_metadata: DeviceMetadata,
    pub images: Images,
    /// How long to wait for the state DB to come up after a restart.
    pub state_db_ready_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_metadata: DeviceMetadata::default(),
            images: Images::default(),
            state_db_ready_timeout_secs: 30,
        }
    }
}

impl Settings {
    /// Load `<dir>/settings.yaml`, falling back to defaults if it is absent.
    pub fn load_from(dir: &Path) -> Result<Self, RevisionError> {
        let path = dir.join(SETTINGS_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&text).map_err(|source| RevisionError::Settings { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let tmp = TempDir::new().expect("tempdir");
        let settings = Settings::load_from(tmp.path()).expect("load");
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.device_metadata.hostname, "cassini");
        assert_eq!(settings.images.network_os(true), "sonic:virtual");
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let tmp = TempDir::new().expect("tempdir");
        std::fs::write(
            tmp.path().join(SETTINGS_FILE),
            "device_metadata:\n  hostname: lab-1\n  type: transponder\nstate_db_ready_timeout_secs: 5\n",
        )
        .expect("write");
        let settings = Settings::load_from(tmp.path()).expect("load");
        assert_eq!(settings.device_metadata.hostname, "lab-1");
        assert_eq!(settings.device_metadata.device_type, "transponder");
        assert_eq!(settings.device_metadata.bgp_asn, 65100);
        assert_eq!(settings.state_db_ready_timeout_secs, 5);
        assert_eq!(settings.images.state_db, "redis");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = TempDir::new().expect("tempdir");
        std::fs::write(tmp.path().join(SETTINGS_FILE), "images: [not, a, map]\n").expect("write");
        assert!(matches!(
            Settings::load_from(tmp.path()),
            Err(RevisionError::Settings { .. })
        ));
    }
}
