//! Field-level edits on a candidate [`ConfigTree`].
//!
//! Every setter performs the structural checks for the field it touches and
//! leaves the tree unchanged on error. Cross-field rules (breakout matrix,
//! connection uniqueness and completeness) are left to
//! [`crate::validate::validate_final`] so that multi-step edits can pass
//! through intermediate states.

use crate::error::ConfigError;
use crate::names::{ChannelSpeed, FrequencyGrid, ModulationType, ModuleChannel};
use crate::types::{
    breakout_interface_names, parse_interface_name, port_index, ConfigTree, Interface,
    ModuleRef, OpticalModuleConnection, MAX_CONNECTION_ID, MIN_BER_INTERVAL,
    MIN_CONNECTION_ID,
};

pub const SUPPORTED_NUM_CHANNELS: [u8; 3] = [1, 2, 4];

impl ConfigTree {
    // -----------------------------------------------------------------------
    // Ports
    // -----------------------------------------------------------------------

    /// Change the breakout of `port`, replacing its whole interface set.
    pub fn set_num_channels(&mut self, port: &str, num_channels: u8) -> Result<(), ConfigError> {
        if !SUPPORTED_NUM_CHANNELS.contains(&num_channels) {
            return Err(ConfigError::InvalidNumChannels(num_channels));
        }
        let index = port_index(port)?;
        let current = self.port(port)?.breakout_mode.num_channels;
        if current == num_channels {
            return Err(ConfigError::NumChannelsUnchanged(num_channels));
        }

        self.interfaces.retain(|name, _| {
            parse_interface_name(name).map_or(true, |(owner, _)| owner != index)
        });
        for name in breakout_interface_names(index, num_channels) {
            self.interfaces.insert(name.clone(), Interface::new(name));
        }
        self.port_mut(port)?.breakout_mode.num_channels = num_channels;
        Ok(())
    }

    pub fn set_channel_speed(&mut self, port: &str, speed: ChannelSpeed) -> Result<(), ConfigError> {
        self.port_mut(port)?.breakout_mode.channel_speed = speed;
        Ok(())
    }

    pub fn set_port_description(
        &mut self,
        port: &str,
        description: Option<String>,
    ) -> Result<(), ConfigError> {
        self.port_mut(port)?.description = description;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Interfaces
    // -----------------------------------------------------------------------

    pub fn set_interface_description(
        &mut self,
        interface: &str,
        description: Option<String>,
    ) -> Result<(), ConfigError> {
        self.interface_mut(interface)?.description = description;
        Ok(())
    }

    fn connection_mut(
        &mut self,
        interface: &str,
    ) -> Result<&mut OpticalModuleConnection, ConfigError> {
        Ok(self
            .interface_mut(interface)?
            .optical_module_connection
            .get_or_insert_with(OpticalModuleConnection::default))
    }

    pub fn set_connection_id(&mut self, interface: &str, id: u32) -> Result<(), ConfigError> {
        if !(MIN_CONNECTION_ID..=MAX_CONNECTION_ID).contains(&id) {
            return Err(ConfigError::ConnectionIdOutOfRange(id));
        }
        self.connection_mut(interface)?.id = Some(id);
        Ok(())
    }

    /// Point the connection at `module`, which must exist in the tree.
    pub fn set_connection_module(&mut self, interface: &str, module: &str) -> Result<(), ConfigError> {
        self.optical_module(module)?;
        self.connection_mut(interface)?
            .optical_module
            .get_or_insert_with(ModuleRef::default)
            .name = Some(module.to_owned());
        Ok(())
    }

    pub fn set_connection_channel(
        &mut self,
        interface: &str,
        channel: ModuleChannel,
    ) -> Result<(), ConfigError> {
        self.connection_mut(interface)?
            .optical_module
            .get_or_insert_with(ModuleRef::default)
            .channel = Some(channel);
        Ok(())
    }

    pub fn clear_connection(&mut self, interface: &str) -> Result<(), ConfigError> {
        self.interface_mut(interface)?.optical_module_connection = None;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Optical modules
    // -----------------------------------------------------------------------

    pub fn set_frequency_grid(&mut self, module: &str, grid: FrequencyGrid) -> Result<(), ConfigError> {
        self.optical_module_mut(module)?
            .frequency
            .get_or_insert_with(Default::default)
            .grid = Some(grid);
        Ok(())
    }

    pub fn set_frequency_channel(&mut self, module: &str, channel: u8) -> Result<(), ConfigError> {
        if channel == 0 {
            return Err(ConfigError::ZeroFrequencyChannel);
        }
        self.optical_module_mut(module)?
            .frequency
            .get_or_insert_with(Default::default)
            .channel = Some(channel);
        Ok(())
    }

    pub fn set_ber_interval(&mut self, module: &str, seconds: u32) -> Result<(), ConfigError> {
        if seconds < MIN_BER_INTERVAL {
            return Err(ConfigError::BerIntervalTooShort(seconds));
        }
        self.optical_module_mut(module)?.ber_interval = Some(seconds);
        Ok(())
    }

    pub fn set_prbs(&mut self, module: &str, on: bool) -> Result<(), ConfigError> {
        self.optical_module_mut(module)?.prbs = Some(on);
        Ok(())
    }

    pub fn set_losi(&mut self, module: &str, on: bool) -> Result<(), ConfigError> {
        self.optical_module_mut(module)?.losi = Some(on);
        Ok(())
    }

    pub fn set_enabled(&mut self, module: &str, enabled: bool) -> Result<(), ConfigError> {
        self.optical_module_mut(module)?.enabled = Some(enabled);
        Ok(())
    }

    pub fn set_modulation_type(
        &mut self,
        module: &str,
        modulation: ModulationType,
    ) -> Result<(), ConfigError> {
        self.optical_module_mut(module)?.modulation_type = Some(modulation);
        Ok(())
    }

    /// `None` clears the override so the module follows the device default.
    pub fn set_module_allow_oversubscription(
        &mut self,
        module: &str,
        allow: Option<bool>,
    ) -> Result<(), ConfigError> {
        self.optical_module_mut(module)?.allow_oversubscription = allow;
        Ok(())
    }

    pub fn set_module_description(
        &mut self,
        module: &str,
        description: Option<String>,
    ) -> Result<(), ConfigError> {
        self.optical_module_mut(module)?.description = description;
        Ok(())
    }

    pub fn set_allow_oversubscription(&mut self, allow: bool) {
        self.allow_oversubscription = allow;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn iface_names(tree: &ConfigTree, prefix: &str) -> Vec<String> {
        tree.interfaces
            .keys()
            .filter(|n| *n == prefix || n.starts_with(&format!("{prefix}_")))
            .cloned()
            .collect()
    }

    #[test]
    fn breakout_to_four_replaces_interfaces() {
        let mut tree = ConfigTree::provisioned();
        tree.set_connection_id("Ethernet1", 100).expect("id");
        tree.set_num_channels("Port1", 4).expect("breakout");

        assert_eq!(
            iface_names(&tree, "Ethernet1"),
            vec!["Ethernet1_1", "Ethernet1_2", "Ethernet1_3", "Ethernet1_4"]
        );
        assert!(tree.interface("Ethernet1_1").expect("iface").optical_module_connection.is_none());
        // Ethernet10..16 belong to other ports and survive.
        assert!(tree.interface("Ethernet10").is_ok());
        assert_eq!(tree.interfaces.len(), 19);
    }

    #[test]
    fn breakout_back_to_one() {
        let mut tree = ConfigTree::provisioned();
        tree.set_num_channels("Port2", 2).expect("to 2");
        assert_eq!(iface_names(&tree, "Ethernet2"), vec!["Ethernet2_1", "Ethernet2_2"]);
        tree.set_num_channels("Port2", 1).expect("to 1");
        assert_eq!(iface_names(&tree, "Ethernet2"), vec!["Ethernet2"]);
    }

    #[rstest]
    #[case(0)]
    #[case(3)]
    #[case(8)]
    fn unsupported_num_channels(#[case] n: u8) {
        let mut tree = ConfigTree::provisioned();
        let before = tree.clone();
        assert!(matches!(
            tree.set_num_channels("Port1", n),
            Err(ConfigError::InvalidNumChannels(v)) if v == n
        ));
        assert_eq!(tree, before);
    }

    #[test]
    fn unchanged_num_channels_is_an_error() {
        let mut tree = ConfigTree::provisioned();
        assert!(matches!(
            tree.set_num_channels("Port1", 1),
            Err(ConfigError::NumChannelsUnchanged(1))
        ));
    }

    #[test]
    fn unknown_port_rejected() {
        let mut tree = ConfigTree::provisioned();
        assert!(matches!(
            tree.set_num_channels("Port17", 4),
            Err(ConfigError::UnknownPort(_))
        ));
    }

    #[rstest]
    #[case(99, false)]
    #[case(100, true)]
    #[case(4000, true)]
    #[case(4001, false)]
    fn connection_id_range(#[case] id: u32, #[case] ok: bool) {
        let mut tree = ConfigTree::provisioned();
        assert_eq!(tree.set_connection_id("Ethernet1", id).is_ok(), ok);
    }

    #[test]
    fn connection_module_must_exist() {
        let mut tree = ConfigTree::provisioned();
        assert!(matches!(
            tree.set_connection_module("Ethernet1", "Opt9"),
            Err(ConfigError::UnknownOpticalModule(_))
        ));
        assert!(tree.interface("Ethernet1").expect("iface").optical_module_connection.is_none());

        tree.set_connection_module("Ethernet1", "Opt2").expect("module");
        tree.set_connection_channel("Ethernet1", ModuleChannel::B).expect("channel");
        tree.set_connection_id("Ethernet1", 200).expect("id");
        let iface = tree.interface("Ethernet1").expect("iface");
        let conn = iface.connection().expect("complete");
        assert_eq!((conn.id, conn.module, conn.channel), (200, "Opt2", ModuleChannel::B));

        tree.clear_connection("Ethernet1").expect("clear");
        assert!(tree.interface("Ethernet1").expect("iface").optical_module_connection.is_none());
    }

    #[test]
    fn module_setters_enforce_ranges() {
        let mut tree = ConfigTree::provisioned();
        assert!(matches!(
            tree.set_ber_interval("Opt1", 4),
            Err(ConfigError::BerIntervalTooShort(4))
        ));
        assert!(matches!(
            tree.set_frequency_channel("Opt1", 0),
            Err(ConfigError::ZeroFrequencyChannel)
        ));
        tree.set_ber_interval("Opt1", 5).expect("ber");
        tree.set_frequency_channel("Opt1", 12).expect("channel");
        tree.set_frequency_grid("Opt1", FrequencyGrid::Grid100Ghz).expect("grid");
        let module = tree.optical_module("Opt1").expect("module");
        assert_eq!(module.ber_interval, Some(5));
        let freq = module.frequency.expect("frequency");
        assert_eq!(freq.channel, Some(12));
        assert_eq!(freq.grid, Some(FrequencyGrid::Grid100Ghz));
    }

    #[test]
    fn descriptions_set_and_clear() {
        let mut tree = ConfigTree::provisioned();
        tree.set_port_description("Port1", Some("uplink".into())).expect("set");
        tree.set_interface_description("Ethernet1", Some("to core".into())).expect("set");
        tree.set_interface_description("Ethernet1", None).expect("clear");
        assert_eq!(tree.port("Port1").expect("port").description.as_deref(), Some("uplink"));
        assert!(tree.interface("Ethernet1").expect("iface").description.is_none());
    }
}
