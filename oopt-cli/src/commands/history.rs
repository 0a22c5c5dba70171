//! `commit`, `rollback`, `diff` and `log`.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use oopt_core::ConfigStore;
use oopt_sync::pipeline::{commit_candidate, pending_changes, pending_document_diff, rollback, CommitOutcome};

use super::context::GlobalArgs;

#[derive(Args, Debug)]
pub struct CommitArgs {
    /// Commit message; defaults to the current time.
    #[arg(long, short = 'm')]
    pub message: Option<String>,

    /// Reboot after committing even when the change could be applied in place.
    #[arg(long)]
    pub reboot: bool,
}

impl CommitArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let (mut store, candidate) = global.candidate()?;
        let mut backend = global.backend();
        let outcome = commit_candidate(
            &mut store,
            &mut backend,
            &candidate,
            self.message.as_deref(),
            self.reboot,
        )
        .context("commit failed")?;
        report(&outcome);
        if outcome.must_reboot {
            global.reboot(&candidate)?;
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct RollbackArgs {
    /// Restore the revision `n + 1` commits before HEAD; 0 undoes the last commit.
    #[arg(long, short = 'n', default_value_t = 0)]
    pub steps: usize,

    #[arg(long, short = 'm')]
    pub message: Option<String>,

    #[arg(long)]
    pub reboot: bool,
}

impl RollbackArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let mut store = global.store();
        let mut backend = global.backend();
        let (tree, outcome) = rollback(
            &mut store,
            &mut backend,
            self.steps,
            self.message.as_deref(),
            self.reboot,
        )
        .with_context(|| format!("rollback {} failed", self.steps))?;
        store
            .save_candidate(&tree)
            .context("failed to save restored candidate")?;
        report(&outcome);
        if outcome.must_reboot {
            global.reboot(&tree)?;
        }
        Ok(())
    }
}

fn report(outcome: &CommitOutcome) {
    println!(
        "{} committed {} ({} changes, {} backend writes)",
        "✓".green(),
        outcome.revision.short(),
        outcome.records.len(),
        outcome.reconcile.mutations.len()
    );
    for mutation in &outcome.reconcile.mutations {
        println!("  {mutation}");
    }
    if outcome.must_reboot {
        println!("{} reboot required", "!".yellow().bold());
    }
}

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Show a unified diff of the documents instead of change records.
    #[arg(long, short = 'u')]
    pub unified: bool,
}

impl DiffArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let (store, candidate) = global.candidate()?;
        if self.unified {
            let text = pending_document_diff(&store, &candidate).context("diff failed")?;
            print!("{text}");
            return Ok(());
        }
        let records = pending_changes(&store, &candidate).context("diff failed")?;
        if records.is_empty() {
            println!("No changes.");
            return Ok(());
        }
        for record in records {
            println!("{record}");
        }
        Ok(())
    }
}

#[derive(Tabled)]
struct LogRow {
    #[tabled(rename = "revision")]
    revision: String,
    #[tabled(rename = "date")]
    date: String,
    #[tabled(rename = "message")]
    message: String,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl LogArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let revisions = global
            .store()
            .list_revisions()
            .context("failed to read revision history")?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&revisions).context("failed to serialize history")?
            );
            return Ok(());
        }
        let rows: Vec<LogRow> = revisions
            .iter()
            .map(|meta| LogRow {
                revision: meta.id.short().to_owned(),
                date: meta
                    .committed_at
                    .with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string(),
                message: meta.message.clone(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
