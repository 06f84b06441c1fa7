//! `teamsync queue list|drain`: operations waiting for the remote.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use teamsync_daemon::run_interruptible;
use teamsync_engine::state_store::PendingOperation;
use teamsync_engine::status::format_datetime_age;
use teamsync_engine::{DrainReport, StateStore};

use super::sync::print_drain;
use super::{short_id, ProjectArg};

#[derive(Subcommand, Debug)]
pub enum QueueCommand {
    /// Show queued operations in replay order.
    List,
    /// Replay queued operations now if the remote is reachable.
    Drain,
}

#[derive(Tabled)]
struct PendingRow {
    #[tabled(rename = "#")]
    position: usize,
    #[tabled(rename = "Id")]
    id: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Queued")]
    queued: String,
    #[tabled(rename = "Retries")]
    retries: u32,
    #[tabled(rename = "Next attempt")]
    next_attempt: String,
    #[tabled(rename = "Last error")]
    last_error: String,
}

impl PendingRow {
    fn new(position: usize, pending: &PendingOperation) -> Self {
        Self {
            position,
            id: short_id(pending.operation.id.as_str()).to_string(),
            kind: pending.operation.operation_type.to_string(),
            queued: format!("{} ago", format_datetime_age(pending.enqueued_at)),
            retries: pending.retries,
            next_attempt: pending.next_attempt_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            last_error: pending.last_error.clone().unwrap_or_default(),
        }
    }
}

pub fn run(project: ProjectArg, command: QueueCommand) -> Result<()> {
    let session = project.open()?;

    match command {
        QueueCommand::List => {
            let pending = StateStore::new(&session.state_dir)
                .load_history()
                .context("failed to read operation history")?
                .pending_operations;
            if pending.is_empty() {
                println!("{} offline queue is empty", "✓".green());
                return Ok(());
            }
            let rows: Vec<PendingRow> = pending
                .iter()
                .enumerate()
                .map(|(i, p)| PendingRow::new(i + 1, p))
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        QueueCommand::Drain => {
            let mut coordinator = session.coordinator();
            let batcher = coordinator.batcher().clone();
            let cancel = coordinator.cancel_handle();
            let drained = run_interruptible(cancel, move || coordinator.drain_offline_queue())
                .context("queue runtime failed")?;
            session.deliver(&batcher)?;
            let drained = drained.context("failed to drain the offline queue")?;

            if drained == DrainReport::default() {
                println!("{} offline queue is empty", "✓".green());
                return Ok(());
            }
            print_drain(&drained);
            if !drained.offline {
                println!("{} operation(s) still queued", drained.remaining);
            }
        }
    }
    Ok(())
}
