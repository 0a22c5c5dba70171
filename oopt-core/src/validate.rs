//! Cross-field validation of a configuration tree.
//!
//! [`validate`] re-checks the ranges the setters enforce, for trees that were
//! loaded from disk rather than built through edits. [`validate_final`] adds
//! the rules a tree must satisfy before it can be committed.

use std::collections::BTreeMap;
use std::fmt;

use crate::edit::SUPPORTED_NUM_CHANNELS;
use crate::error::ConfigError;
use crate::names::ChannelSpeed;
use crate::types::{ConfigTree, MAX_CONNECTION_ID, MIN_BER_INTERVAL, MIN_CONNECTION_ID};

/// One rule broken by a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    InvalidNumChannels {
        port: String,
        num_channels: u8,
    },
    UnsupportedBreakout {
        port: String,
        num_channels: u8,
        speed: ChannelSpeed,
    },
    ConnectionIdOutOfRange {
        interface: String,
        id: u32,
    },
    /// `first` is the interface that claimed the id earlier in name order.
    DuplicateConnectionId {
        id: u32,
        first: String,
        second: String,
    },
    IncompleteConnection {
        interface: String,
    },
    BerIntervalTooShort {
        module: String,
        interval: u32,
    },
    ZeroFrequencyChannel {
        module: String,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::InvalidNumChannels { port, num_channels } => {
                write!(f, "invalid num-channels {num_channels} for port {port}")
            }
            Violation::UnsupportedBreakout {
                port,
                num_channels,
                speed,
            } => match num_channels {
                1 => write!(f, "unsupported port speed {speed} for port {port}"),
                2 => write!(f, "port speed must be 40G or 50G for breakout(2) port {port}"),
                _ => write!(f, "port speed must be 10G or 25G for breakout(4) port {port}"),
            },
            Violation::ConnectionIdOutOfRange { interface, id } => write!(
                f,
                "{interface}: id must be between {MIN_CONNECTION_ID} and {MAX_CONNECTION_ID} (got {id})"
            ),
            Violation::DuplicateConnectionId { id, first, second } => {
                write!(f, "id {id} is used by multiple interfaces: {first}, {second}")
            }
            Violation::IncompleteConnection { interface } => write!(
                f,
                "{interface}: insufficient configuration for optical module connection"
            ),
            Violation::BerIntervalTooShort { module, interval } => write!(
                f,
                "{module}: ber-interval can't be less than {MIN_BER_INTERVAL} seconds (got {interval})"
            ),
            Violation::ZeroFrequencyChannel { module } => {
                write!(f, "{module}: frequency channel can't be 0")
            }
        }
    }
}

/// The breakout compatibility matrix.
pub fn breakout_supported(num_channels: u8, speed: ChannelSpeed) -> bool {
    use ChannelSpeed::*;
    matches!(
        (num_channels, speed),
        (1, Speed40Gb | Speed100Gb) | (2, Speed40Gb | Speed50Gb) | (4, Speed10Gb | Speed25Gb)
    )
}

/// Range checks on stored values.
pub fn validate(tree: &ConfigTree) -> Vec<Violation> {
    let mut violations = Vec::new();

    for port in tree.ports.values() {
        let n = port.breakout_mode.num_channels;
        if !SUPPORTED_NUM_CHANNELS.contains(&n) {
            violations.push(Violation::InvalidNumChannels {
                port: port.name.clone(),
                num_channels: n,
            });
        }
    }

    for iface in tree.interfaces.values() {
        let id = iface.optical_module_connection.as_ref().and_then(|c| c.id);
        if let Some(id) = id {
            if !(MIN_CONNECTION_ID..=MAX_CONNECTION_ID).contains(&id) {
                violations.push(Violation::ConnectionIdOutOfRange {
                    interface: iface.name.clone(),
                    id,
                });
            }
        }
    }

    for module in tree.optical_modules.values() {
        if let Some(interval) = module.ber_interval.filter(|i| *i < MIN_BER_INTERVAL) {
            violations.push(Violation::BerIntervalTooShort {
                module: module.name.clone(),
                interval,
            });
        }
        if module.frequency.and_then(|f| f.channel) == Some(0) {
            violations.push(Violation::ZeroFrequencyChannel {
                module: module.name.clone(),
            });
        }
    }

    violations
}

/// [`validate`] plus the pre-commit rules: breakout matrix, connection
/// completeness, and connection-id uniqueness.
pub fn validate_final(tree: &ConfigTree) -> Vec<Violation> {
    let mut violations = validate(tree);

    for port in tree.ports.values() {
        let mode = port.breakout_mode;
        if SUPPORTED_NUM_CHANNELS.contains(&mode.num_channels)
            && !breakout_supported(mode.num_channels, mode.channel_speed)
        {
            violations.push(Violation::UnsupportedBreakout {
                port: port.name.clone(),
                num_channels: mode.num_channels,
                speed: mode.channel_speed,
            });
        }
    }

    let mut claimed: BTreeMap<u32, &str> = BTreeMap::new();
    let mut reported: Vec<u32> = Vec::new();
    for iface in tree.interfaces.values() {
        let Some(conn) = &iface.optical_module_connection else {
            continue;
        };
        if !conn.is_complete() {
            violations.push(Violation::IncompleteConnection {
                interface: iface.name.clone(),
            });
        }
        let Some(id) = conn.id else { continue };
        match claimed.get(&id) {
            Some(first) if !reported.contains(&id) => {
                violations.push(Violation::DuplicateConnectionId {
                    id,
                    first: (*first).to_owned(),
                    second: iface.name.clone(),
                });
                reported.push(id);
            }
            Some(_) => {}
            None => {
                claimed.insert(id, &iface.name);
            }
        }
    }

    violations
}

/// `Ok` when [`validate_final`] finds nothing.
pub fn ensure_valid(tree: &ConfigTree) -> Result<(), ConfigError> {
    let violations = validate_final(tree);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(violations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::ModuleChannel;
    use rstest::rstest;

    fn connect(tree: &mut ConfigTree, iface: &str, id: u32, module: &str, ch: ModuleChannel) {
        tree.set_connection_id(iface, id).expect("id");
        tree.set_connection_module(iface, module).expect("module");
        tree.set_connection_channel(iface, ch).expect("channel");
    }

    #[test]
    fn provisioned_tree_is_valid() {
        assert!(validate_final(&ConfigTree::provisioned()).is_empty());
    }

    #[test]
    fn only_matrix_pairs_are_supported() {
        let mut supported = Vec::new();
        for n in SUPPORTED_NUM_CHANNELS {
            for speed in ChannelSpeed::all() {
                let mut tree = ConfigTree::provisioned();
                let port = tree.port_mut("Port1").expect("port");
                port.breakout_mode.num_channels = n;
                port.breakout_mode.channel_speed = speed;
                if validate_final(&tree).is_empty() {
                    supported.push((n, speed));
                }
            }
        }
        assert_eq!(supported.len(), 6);
        assert!(supported.contains(&(1, ChannelSpeed::Speed100Gb)));
        assert!(supported.contains(&(2, ChannelSpeed::Speed50Gb)));
        assert!(supported.contains(&(4, ChannelSpeed::Speed25Gb)));
    }

    #[rstest]
    #[case(1, ChannelSpeed::Speed40Gb, true)]
    #[case(1, ChannelSpeed::Speed100Gb, true)]
    #[case(1, ChannelSpeed::Speed25Gb, false)]
    #[case(2, ChannelSpeed::Speed40Gb, true)]
    #[case(2, ChannelSpeed::Speed50Gb, true)]
    #[case(2, ChannelSpeed::Speed100Gb, false)]
    #[case(4, ChannelSpeed::Speed10Gb, true)]
    #[case(4, ChannelSpeed::Speed25Gb, true)]
    #[case(4, ChannelSpeed::Speed1Gb, false)]
    fn breakout_matrix(#[case] n: u8, #[case] speed: ChannelSpeed, #[case] ok: bool) {
        assert_eq!(breakout_supported(n, speed), ok);
    }

    #[test]
    fn stale_speed_after_breakout_is_flagged() {
        let mut tree = ConfigTree::provisioned();
        tree.set_num_channels("Port1", 4).expect("breakout");
        let violations = validate_final(&tree);
        assert_eq!(
            violations,
            vec![Violation::UnsupportedBreakout {
                port: "Port1".into(),
                num_channels: 4,
                speed: ChannelSpeed::Speed100Gb,
            }]
        );
        tree.set_channel_speed("Port1", ChannelSpeed::Speed25Gb).expect("speed");
        assert!(validate_final(&tree).is_empty());
    }

    #[test]
    fn duplicate_id_names_both_interfaces_once() {
        let mut tree = ConfigTree::provisioned();
        connect(&mut tree, "Ethernet1", 100, "Opt1", ModuleChannel::A);
        connect(&mut tree, "Ethernet2", 100, "Opt1", ModuleChannel::B);

        let violations = validate_final(&tree);
        assert_eq!(violations.len(), 1);
        assert_eq!(
            violations[0],
            Violation::DuplicateConnectionId {
                id: 100,
                first: "Ethernet1".into(),
                second: "Ethernet2".into(),
            }
        );
        assert_eq!(
            violations[0].to_string(),
            "id 100 is used by multiple interfaces: Ethernet1, Ethernet2"
        );
    }

    #[test]
    fn incomplete_connection_reported() {
        let mut tree = ConfigTree::provisioned();
        tree.set_connection_id("Ethernet3", 300).expect("id");
        let violations = validate_final(&tree);
        assert_eq!(
            violations,
            vec![Violation::IncompleteConnection {
                interface: "Ethernet3".into()
            }]
        );
        assert!(matches!(ensure_valid(&tree), Err(ConfigError::Invalid(v)) if v.len() == 1));
    }

    #[test]
    fn loaded_out_of_range_values_are_caught() {
        let mut tree = ConfigTree::provisioned();
        tree.optical_module_mut("Opt1").expect("module").ber_interval = Some(1);
        tree.port_mut("Port2").expect("port").breakout_mode.num_channels = 3;
        let violations = validate(&tree);
        assert_eq!(violations.len(), 2);
        assert!(violations.contains(&Violation::BerIntervalTooShort {
            module: "Opt1".into(),
            interval: 1
        }));
    }
}
