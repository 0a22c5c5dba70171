//! Bidirectional name tables for the enumerated configuration values.
//!
//! Every enum is declared once through [`name_table!`], which generates the
//! variant list, a static `(variant, name)` table, string conversion in both
//! directions, and serde support through the same names. [`check_name_tables`]
//! is run once at startup and refuses to continue if any table maps two
//! variants to one name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ConfigError;

macro_rules! name_table {
    (
        $(#[$meta:meta])*
        pub enum $name:ident as $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Human-readable kind, used in error messages.
            pub const KIND: &'static str = $kind;

            pub const TABLE: &'static [($name, &'static str)] = &[
                $( ($name::$variant, $text) ),+
            ];

            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }

            pub fn all() -> impl Iterator<Item = $name> {
                Self::TABLE.iter().map(|(variant, _)| *variant)
            }

            /// Comma-separated list of every accepted name.
            pub fn names() -> String {
                Self::TABLE
                    .iter()
                    .map(|(_, text)| *text)
                    .collect::<Vec<_>>()
                    .join(", ")
            }

            fn check_table() -> Result<(), ConfigError> {
                for (i, (variant, text)) in Self::TABLE.iter().enumerate() {
                    let clash = Self::TABLE[..i].iter().any(|(v, t)| {
                        v == variant || t.eq_ignore_ascii_case(text)
                    });
                    if clash || variant.as_str() != *text {
                        return Err(ConfigError::NameTable {
                            kind: Self::KIND,
                            name: (*text).to_owned(),
                        });
                    }
                }
                Ok(())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::TABLE
                    .iter()
                    .find(|(_, text)| text.eq_ignore_ascii_case(s))
                    .map(|(variant, _)| *variant)
                    .ok_or_else(|| ConfigError::UnknownEnumName {
                        kind: Self::KIND,
                        value: s.to_owned(),
                        expected: Self::names(),
                    })
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

name_table! {
    /// Per-channel speed of a port breakout.
    pub enum ChannelSpeed as "channel-speed" {
        Speed10Mb => "SPEED_10MB",
        Speed100Mb => "SPEED_100MB",
        Speed1Gb => "SPEED_1GB",
        Speed10Gb => "SPEED_10GB",
        Speed25Gb => "SPEED_25GB",
        Speed40Gb => "SPEED_40GB",
        Speed50Gb => "SPEED_50GB",
        Speed100Gb => "SPEED_100GB",
    }
}

impl ChannelSpeed {
    pub fn mbps(self) -> u64 {
        match self {
            ChannelSpeed::Speed10Mb => 10,
            ChannelSpeed::Speed100Mb => 100,
            ChannelSpeed::Speed1Gb => 1_000,
            ChannelSpeed::Speed10Gb => 10_000,
            ChannelSpeed::Speed25Gb => 25_000,
            ChannelSpeed::Speed40Gb => 40_000,
            ChannelSpeed::Speed50Gb => 50_000,
            ChannelSpeed::Speed100Gb => 100_000,
        }
    }

    /// Whole gigabits, as used by the hardware port-mode file.
    pub fn gbps(self) -> u64 {
        self.mbps() / 1_000
    }
}

name_table! {
    /// DWDM frequency grid spacing.
    pub enum FrequencyGrid as "frequency-grid" {
        Grid25Ghz => "GRID_25GHZ",
        Grid33Ghz => "GRID_33GHZ",
        Grid50Ghz => "GRID_50GHZ",
        Grid100Ghz => "GRID_100GHZ",
    }
}

impl FrequencyGrid {
    /// Grid spacing in GHz; this is the value the transport tables store.
    pub fn ghz(self) -> u32 {
        match self {
            FrequencyGrid::Grid25Ghz => 25,
            FrequencyGrid::Grid33Ghz => 33,
            FrequencyGrid::Grid50Ghz => 50,
            FrequencyGrid::Grid100Ghz => 100,
        }
    }
}

name_table! {
    pub enum ModulationType as "modulation-type" {
        DpQpsk => "DP_QPSK",
        Dp16Qam => "DP_16QAM",
    }
}

impl ModulationType {
    /// Spelling of the modulation format in the transport config table.
    pub fn backend_name(self) -> &'static str {
        match self {
            ModulationType::DpQpsk => "dp-qpsk",
            ModulationType::Dp16Qam => "dp-16qam",
        }
    }
}

name_table! {
    /// Line-side channel of an optical module.
    pub enum ModuleChannel as "channel" {
        A => "A",
        B => "B",
    }
}

impl ModuleChannel {
    /// Zero-based index, as used by the `-ch0` / `-ch1` state fields.
    pub fn index(self) -> u32 {
        match self {
            ModuleChannel::A => 0,
            ModuleChannel::B => 1,
        }
    }
}

/// Verify every name table is a bijection. Called once at startup.
pub fn check_name_tables() -> Result<(), ConfigError> {
    ChannelSpeed::check_table()?;
    FrequencyGrid::check_table()?;
    ModulationType::check_table()?;
    ModuleChannel::check_table()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn tables_are_bijective() {
        check_name_tables().expect("all tables consistent");
    }

    #[rstest]
    #[case("SPEED_100GB", ChannelSpeed::Speed100Gb)]
    #[case("speed_25gb", ChannelSpeed::Speed25Gb)]
    #[case("Speed_40GB", ChannelSpeed::Speed40Gb)]
    fn speed_parse_is_case_insensitive(#[case] input: &str, #[case] expected: ChannelSpeed) {
        assert_eq!(input.parse::<ChannelSpeed>().expect("parse"), expected);
    }

    #[test]
    fn unknown_name_lists_alternatives() {
        let err = "C".parse::<ModuleChannel>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'C'"), "{msg}");
        assert!(msg.contains("A, B"), "{msg}");
    }

    #[test]
    fn every_variant_round_trips_through_its_name() {
        for speed in ChannelSpeed::all() {
            assert_eq!(speed.as_str().parse::<ChannelSpeed>().expect("parse"), speed);
        }
        for grid in FrequencyGrid::all() {
            assert_eq!(grid.to_string().parse::<FrequencyGrid>().expect("parse"), grid);
        }
    }

    #[test]
    fn serde_uses_table_names() {
        let json = serde_json::to_string(&ModulationType::Dp16Qam).expect("serialize");
        assert_eq!(json, "\"DP_16QAM\"");
        let back: ModulationType = serde_json::from_str("\"DP_QPSK\"").expect("deserialize");
        assert_eq!(back, ModulationType::DpQpsk);
        assert!(serde_json::from_str::<ModulationType>("\"DP_8QAM\"").is_err());
    }

    #[test]
    fn derived_units() {
        assert_eq!(ChannelSpeed::Speed25Gb.mbps(), 25_000);
        assert_eq!(ChannelSpeed::Speed100Gb.gbps(), 100);
        assert_eq!(FrequencyGrid::Grid33Ghz.ghz(), 33);
        assert_eq!(ModulationType::DpQpsk.backend_name(), "dp-qpsk");
        assert_eq!(ModuleChannel::B.index(), 1);
    }
}
