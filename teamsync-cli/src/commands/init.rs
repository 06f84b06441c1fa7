//! `teamsync init <path> --project <name> --member <id> [--track <file>]...`

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;

use teamsync_core::config::{self, AutoStrategy};
use teamsync_core::types::{MemberId, ProjectName};
use teamsync_engine::NotificationStore;

/// Register a working tree as a synced project.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Working tree holding the shared files (a git checkout).
    pub path: PathBuf,

    /// Project name. Creates ~/.teamsync/projects/<project>/project.yaml
    #[arg(long, short = 'p')]
    pub project: String,

    /// Your identity on the team (usually an email); becomes the owner.
    #[arg(long, short = 'm')]
    pub member: String,

    /// Shared file to track, relative to the working tree. Repeatable;
    /// defaults to the standard memory files.
    #[arg(long = "track", value_name = "FILE")]
    pub tracked: Vec<String>,

    /// Git remote to sync with.
    #[arg(long)]
    pub remote: Option<String>,

    /// Remote branch holding the shared files.
    #[arg(long)]
    pub branch: Option<String>,

    /// Resolve conflicts automatically during sync: keep-local | keep-remote.
    #[arg(long, value_name = "STRATEGY", value_parser = parse_strategy)]
    pub strategy: Option<AutoStrategy>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = super::home()?;
        let root = self
            .path
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", self.path.display()))?;
        let name = ProjectName::from(self.project);

        if config::config_path_at(&home, &name).exists() {
            println!("✓ Project '{name}' is already registered; leaving it unchanged");
            return Ok(());
        }

        let tracked = (!self.tracked.is_empty()).then_some(self.tracked);
        let mut project = config::init_at(
            &home,
            name.clone(),
            root.clone(),
            MemberId::from(self.member),
            tracked,
        )
        .with_context(|| format!("failed to init project '{name}' at '{}'", root.display()))?;

        if let Some(remote) = self.remote {
            project.settings.remote = remote;
        }
        if let Some(branch) = self.branch {
            project.settings.branch = branch;
        }
        project.settings.conflict_strategy = self.strategy;
        config::save_at(&home, &project)
            .with_context(|| format!("failed to save project '{name}'"))?;

        let state_dir = config::state_dir_at(&home, &name);
        NotificationStore::new(&state_dir)
            .sync_settings(&project.settings, Utc::now())
            .context("failed to initialise notification settings")?;

        println!("✓ Registered project '{name}' at {}", root.display());
        println!("  Owner:   {}", project.member);
        println!("  Remote:  {} ({})", project.settings.remote, project.settings.branch);
        println!("  Tracked: {}", project.tracked.join(", "));
        println!("  Saved to: ~/.teamsync/projects/{name}/project.yaml");
        Ok(())
    }
}

fn parse_strategy(s: &str) -> std::result::Result<AutoStrategy, String> {
    match s.to_ascii_lowercase().replace('_', "-").as_str() {
        "keep-local" => Ok(AutoStrategy::KeepLocal),
        "keep-remote" => Ok(AutoStrategy::KeepRemote),
        other => Err(format!(
            "unknown strategy '{other}'; expected: keep-local, keep-remote"
        )),
    }
}
