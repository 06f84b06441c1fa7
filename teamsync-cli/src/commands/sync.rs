//! `teamsync sync`: replay queued operations, then exchange changes.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use colored::Colorize;

use teamsync_core::types::{OperationKind, OperationStatus};
use teamsync_daemon::run_interruptible;
use teamsync_engine::{DrainReport, SyncError, SyncReport};

use super::{short_id, ProjectArg};

/// Arguments for `teamsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub project: ProjectArg,

    /// Only adopt remote changes; never publish.
    #[arg(long, conflicts_with = "push")]
    pub pull: bool,

    /// Publish local changes (remote changes are still merged first).
    #[arg(long)]
    pub push: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let kind = if self.pull {
            OperationKind::Pull
        } else if self.push {
            OperationKind::Push
        } else {
            OperationKind::Bidirectional
        };

        let mut session = self.project.open()?;
        let mut coordinator = session.coordinator();
        let batcher = coordinator.batcher().clone();
        let cancel = coordinator.cancel_handle();

        let outcome = run_interruptible(cancel, move || -> Result<_, SyncError> {
            let drained = coordinator.drain_offline_queue()?;
            let report = coordinator.sync(kind)?;
            let pending = coordinator.queue().len()?;
            Ok((drained, report, pending))
        })
        .context("sync runtime failed")?;

        // Notifications raised before a failure are still worth keeping.
        session.deliver(&batcher)?;
        let (drained, report, pending) =
            outcome.with_context(|| format!("{kind} failed for '{}'", session.config.name))?;

        print_drain(&drained);
        print_report(&session.config.name.0, &report, pending);

        if report.operation.status == OperationStatus::Success {
            let member = session.config.member.clone();
            session
                .config
                .team
                .record_sync(&member, Utc::now())
                .context("failed to record last sync")?;
            session.save_config()?;
        }

        report.ensure_resolved().context(
            "sync finished with open conflicts. Run `teamsync conflicts list`, then `teamsync resolve`",
        )?;
        Ok(())
    }
}

pub(crate) fn print_drain(drained: &DrainReport) {
    if drained.offline {
        println!(
            "{} remote unreachable; {} queued operation(s) left for later",
            "⚠".yellow(),
            drained.remaining
        );
        return;
    }
    if !drained.replayed.is_empty() {
        println!(
            "↻ replayed {} queued operation(s)",
            drained.replayed.len()
        );
        for op in &drained.replayed {
            println!("  {}  {} {}", short_id(op.id.as_str()), op.operation_type, op.status);
        }
    }
    for op in drained.abandoned.iter().chain(&drained.failed) {
        println!(
            "{} queued {} {} gave up: {}",
            "⚠".yellow(),
            op.operation_type,
            short_id(op.id.as_str()),
            op.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    if drained.requeued > 0 {
        println!(
            "{} {} queued operation(s) will be retried later",
            "⚠".yellow(),
            drained.requeued
        );
    }
}

fn print_report(project: &str, report: &SyncReport, pending: usize) {
    let op = &report.operation;
    if report.queued {
        println!(
            "{} remote unreachable; {} {} queued for retry ({pending} pending)",
            "⚠".yellow(),
            op.operation_type,
            short_id(op.id.as_str()),
        );
        return;
    }

    if report.pulled.is_empty()
        && report.pushed.is_empty()
        && report.conflicts.is_empty()
        && report.settled.is_empty()
    {
        println!("{} '{project}' is up to date", "✓".green());
        return;
    }

    let mark = if report.unresolved.is_empty() {
        "✓".green()
    } else {
        "!".red()
    };
    println!(
        "{mark} '{project}' {} ({} pulled, {} pushed, {} conflict(s))",
        op.operation_type,
        report.pulled.len(),
        report.pushed.len(),
        report.conflicts.len(),
    );
    for path in &report.pulled {
        println!("  ↓  {path}");
    }
    for path in &report.pushed {
        println!("  ↑  {path}");
    }
    for record in &report.settled {
        println!(
            "  ✓  {}  conflict {} settled by hand",
            record.file_path,
            short_id(record.id.as_str())
        );
    }
    for record in &report.conflicts {
        match record.resolution {
            Some(resolution) => println!(
                "  ✓  {}  conflict {} resolved ({resolution})",
                record.file_path,
                short_id(record.id.as_str())
            ),
            None => println!(
                "  {}  {}  conflict {}",
                "!".red(),
                record.file_path,
                record.id
            ),
        }
    }
}
