//! oopt core library: the configuration tree and everything that reasons about
//! it without touching the device.
//!
//! - [`types`]: the tree, its entities and naming convention
//! - [`names`]: enumerated values and their name tables
//! - [`edit`]: field setters on a candidate tree
//! - [`validate`]: structural and pre-commit checks
//! - [`defaults`]: module defaults and channel occupancy
//! - [`query`]: path-addressed reads
//! - [`settings`]: `settings.yaml`
//! - [`revisions`]: the revision store

pub mod defaults;
pub mod edit;
pub mod error;
pub mod names;
pub mod query;
pub mod revisions;
pub mod settings;
pub mod types;
pub mod validate;

pub use error::{ConfigError, RevisionError};
pub use names::{check_name_tables, ChannelSpeed, FrequencyGrid, ModulationType, ModuleChannel};
pub use revisions::{ConfigStore, FsConfigStore, MemoryConfigStore, RevisionId, RevisionMeta};
pub use settings::Settings;
pub use types::{
    BreakoutMode, ChannelStats, ConfigTree, Frequency, Interface, ModuleRef, OpticalModule,
    OpticalModuleConnection, Port,
};
pub use validate::Violation;
