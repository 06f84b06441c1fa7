//! `teamsync resolve <id> --keep-local | --keep-remote | --merge-file <path>`

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args};
use colored::Colorize;

use teamsync_core::types::{ConflictId, Resolution};
use teamsync_engine::Strategy;

use super::{short_id, ProjectArg};

/// Settle an open conflict.
#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("strategy")
        .required(true)
        .args(["keep_local", "keep_remote", "merge_file"]),
))]
pub struct ResolveArgs {
    #[command(flatten)]
    pub project: ProjectArg,

    /// Conflict id (as printed by `sync` or `conflicts list`).
    pub id: String,

    /// Keep your version; the remote one is archived.
    #[arg(long)]
    pub keep_local: bool,

    /// Take the remote version; yours is archived.
    #[arg(long)]
    pub keep_remote: bool,

    /// Use the contents of this file as the merged result; both sides are
    /// archived.
    #[arg(long, value_name = "FILE")]
    pub merge_file: Option<PathBuf>,
}

impl ResolveArgs {
    pub fn run(self) -> Result<()> {
        let strategy = if self.keep_local {
            Strategy::KeepLocal
        } else if self.keep_remote {
            Strategy::KeepRemote
        } else if let Some(path) = &self.merge_file {
            let merged = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read merged content from '{}'", path.display()))?;
            Strategy::ManualMerge(merged)
        } else {
            bail!("choose one of --keep-local, --keep-remote or --merge-file");
        };

        let session = self.project.open()?;
        let mut coordinator = session.coordinator();
        let id = ConflictId::from(self.id);
        let outcome = coordinator
            .resolve(&id, strategy)
            .with_context(|| format!("failed to resolve conflict '{id}'"))?;
        session.deliver(coordinator.batcher())?;

        if outcome.already_resolved {
            println!(
                "✓ conflict {} on {} was already resolved ({})",
                short_id(id.as_str()),
                outcome.file.path,
                outcome.file.resolution
            );
            return Ok(());
        }

        let effect = match &outcome.file.content {
            Some(_) => "written",
            None => "deleted",
        };
        println!(
            "{} {} {effect} ({})",
            "✓".green(),
            outcome.file.path,
            outcome.file.resolution
        );
        for op in &outcome.completed_operations {
            println!("  operation {} completed", short_id(op.as_str()));
        }
        if outcome.file.resolution != Resolution::KeepRemote {
            println!("Run 'teamsync sync' to publish the resolution.");
        }
        Ok(())
    }
}
