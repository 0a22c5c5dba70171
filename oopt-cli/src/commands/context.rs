//! Global flags and the handles every command is built from.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;

use oopt_core::validate::validate;
use oopt_core::{ConfigError, ConfigTree, FsConfigStore, Settings};
use oopt_orchestrator::paths::{manifests_dir, templates_dir, DEFAULT_BACKEND_DIR, DEFAULT_GIT_DIR};
use oopt_orchestrator::{reboot_system, KubectlOrchestrator, LogFormat};
use oopt_renderer::Renderer;
use oopt_sync::FileTableStore;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Configuration repository.
    #[arg(long, short = 'c', global = true, env = "OOPT_GIT_DIR", default_value = DEFAULT_GIT_DIR)]
    pub git_dir: PathBuf,

    /// Directory of the device-state table store.
    #[arg(long, global = true, env = "OOPT_BACKEND_DIR", default_value = DEFAULT_BACKEND_DIR)]
    pub backend_dir: PathBuf,

    /// Run against the virtual images, without the hardware-abstraction process.
    #[arg(long = "virtual", global = true)]
    pub virtual_mode: bool,

    /// Log the process commands instead of running them. Backend writes
    /// still happen.
    #[arg(long, short = 'd', global = true)]
    pub dry: bool,

    #[arg(long, global = true, value_enum, default_value = "text")]
    pub log_format: LogFormatArg,
}

impl GlobalArgs {
    pub fn store(&self) -> FsConfigStore {
        FsConfigStore::new(&self.git_dir)
    }

    /// The store and its candidate tree.
    pub fn candidate(&self) -> Result<(FsConfigStore, ConfigTree)> {
        let store = self.store();
        let tree = store.load_candidate().with_context(|| {
            format!(
                "failed to load candidate from {} (run `oopt init` first)",
                self.git_dir.display()
            )
        })?;
        Ok((store, tree))
    }

    /// Structurally validate an edited candidate and persist it.
    pub fn save_edit(&self, store: &FsConfigStore, tree: &ConfigTree) -> Result<()> {
        let violations = validate(tree);
        if !violations.is_empty() {
            return Err(ConfigError::Invalid(violations)).context("edit rejected");
        }
        store
            .save_candidate(tree)
            .context("failed to save candidate configuration")
    }

    pub fn backend(&self) -> FileTableStore {
        FileTableStore::new(&self.backend_dir)
    }

    pub fn settings(&self) -> Result<Settings> {
        Settings::load_from(&self.git_dir)
            .with_context(|| format!("failed to load settings from {}", self.git_dir.display()))
    }

    pub fn renderer(&self) -> Result<Renderer> {
        let overrides = templates_dir(&self.git_dir);
        let overrides = overrides.is_dir().then_some(overrides.as_path());
        Renderer::new(overrides, self.settings()?, self.virtual_mode)
            .context("failed to load manifest templates")
    }

    pub fn orchestrator(&self) -> KubectlOrchestrator {
        KubectlOrchestrator::new(manifests_dir(&self.git_dir)).dry_run(self.dry)
    }

    /// Restart every process with `tree` and rewrite the backend from it.
    /// With `--dry` the backend is still rewritten but no process is touched.
    pub fn reboot(&self, tree: &ConfigTree) -> Result<()> {
        let renderer = self.renderer()?;
        let mut orchestrator = self.orchestrator();
        let mut backend = self.backend();
        let report = reboot_system(&mut orchestrator, &renderer, tree, &mut backend)
            .context("reboot failed")?;
        if self.dry {
            println!(
                "[dry-run] processes not restarted ({} backend writes, manifests in {})",
                report.mutations.len(),
                manifests_dir(&self.git_dir).display()
            );
            return Ok(());
        }
        println!(
            "{} rebooted ({}; {} backend writes)",
            "✓".green(),
            report.restarted.join(", "),
            report.mutations.len()
        );
        Ok(())
    }
}
