//! Read-only views: `dump` and `get`.

use anyhow::{Context, Result};
use clap::Args;

use oopt_core::defaults::fill_tree_defaults;
use oopt_core::query::{get, Encoding};

use super::context::GlobalArgs;

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Fill module defaults and channel occupancy.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl DumpArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let (_, tree) = global.candidate()?;
        let tree = if self.verbose {
            fill_tree_defaults(&tree).context("failed to fill defaults")?
        } else {
            tree
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&tree).context("failed to serialize configuration")?
        );
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Slash-separated path, e.g. `/ports/Port1/breakout-mode`.
    #[arg(default_value = "/")]
    pub path: String,

    /// Prefix top-level member names with the model name.
    #[arg(long)]
    pub ietf: bool,

    /// Resolve against the configuration with defaults filled.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl GetArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let (_, tree) = global.candidate()?;
        let tree = if self.verbose {
            fill_tree_defaults(&tree).context("failed to fill defaults")?
        } else {
            tree
        };
        let encoding = if self.ietf { Encoding::JsonIetf } else { Encoding::Json };
        let value = get(&tree, &self.path, encoding)
            .with_context(|| format!("failed to get '{}'", self.path))?;
        match value {
            serde_json::Value::String(s) => println!("{s}"),
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => println!(
                "{}",
                serde_json::to_string_pretty(&value).context("failed to serialize value")?
            ),
            other => println!("{other}"),
        }
        Ok(())
    }
}
