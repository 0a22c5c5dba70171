//! `oopt init [--force]`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use oopt_core::validate::ensure_valid;
use oopt_core::ConfigTree;

use super::context::GlobalArgs;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Discard existing history and re-provision. `settings.yaml` and
    /// `templates/` are kept.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let mut store = global.store();
        let revision = store
            .init(self.force)
            .with_context(|| format!("failed to initialize {}", global.git_dir.display()))?;

        let tree = ConfigTree::provisioned();
        ensure_valid(&tree).context("provisioned configuration is invalid")?;
        println!(
            "{} initialized {} at {}",
            "✓".green(),
            global.git_dir.display(),
            revision.short()
        );
        global.reboot(&tree)
    }
}
