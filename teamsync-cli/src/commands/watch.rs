//! `teamsync watch`: run the watcher in the foreground until Ctrl-C.

use anyhow::{Context, Result};
use clap::Args;

use teamsync_daemon::{start_blocking, WatchOptions};

use super::ProjectArg;

/// Arguments for `teamsync watch`.
#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub project: ProjectArg,

    /// Also run a sync after each local change settles.
    #[arg(long)]
    pub sync: bool,
}

impl WatchArgs {
    pub fn run(self) -> Result<()> {
        let session = self.project.open()?;
        let options = WatchOptions {
            sync_on_change: self.sync,
            ..WatchOptions::default()
        };
        start_blocking(session.coordinator(), options).context("watcher exited with error")?;
        Ok(())
    }
}
