//! Subcommands plus the project session they share.

pub mod conflicts;
pub mod init;
pub mod notifications;
pub mod queue;
pub mod resolve;
pub mod status;
pub mod sync;
pub mod team;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Args;

use teamsync_core::config::{self, ProjectConfig};
use teamsync_core::types::ProjectName;
use teamsync_engine::{
    BatcherConfig, GitPort, NotificationBatcher, NotificationStore, SyncCoordinator,
};

/// `--project` selector shared by every project-scoped command.
#[derive(Args, Debug, Clone, Default)]
pub struct ProjectArg {
    /// Project name; may be omitted when exactly one project is registered.
    #[arg(long, short = 'p', global = true)]
    pub project: Option<String>,
}

impl ProjectArg {
    pub fn open(&self) -> Result<Session> {
        let home = home()?;
        let name = select_project(&home, self.project.as_deref())?;
        let config = config::load_at(&home, &name)
            .with_context(|| format!("failed to load project '{name}'"))?;
        let state_dir = config::state_dir_at(&home, &name);
        Ok(Session {
            home,
            config,
            state_dir,
        })
    }
}

/// A loaded project and where its state lives.
pub struct Session {
    pub home: PathBuf,
    pub config: ProjectConfig,
    pub state_dir: PathBuf,
}

impl Session {
    pub fn batcher(&self) -> Arc<NotificationBatcher> {
        Arc::new(NotificationBatcher::new(
            BatcherConfig::from_settings(&self.config.settings),
            Utc::now(),
        ))
    }

    pub fn coordinator(&self) -> SyncCoordinator<GitPort> {
        SyncCoordinator::new(
            self.config.clone(),
            &self.state_dir,
            GitPort::from_config(&self.config, &self.state_dir),
            self.batcher(),
        )
    }

    pub fn notifications(&self) -> NotificationStore {
        NotificationStore::new(&self.state_dir)
    }

    /// Persist everything still queued in `batcher`. A one-shot command is
    /// its own batch window, so nothing is left behind when it exits.
    pub fn deliver(&self, batcher: &NotificationBatcher) -> Result<usize> {
        let store = self.notifications();
        let mut delivered = 0;
        while !batcher.is_empty() || batcher.dropped() > 0 {
            let batch = batcher.flush(Utc::now());
            delivered += store
                .append_batch(batch, Utc::now())
                .context("failed to store notifications")?;
        }
        Ok(delivered)
    }

    pub fn save_config(&self) -> Result<()> {
        config::save_at(&self.home, &self.config)
            .with_context(|| format!("failed to save project '{}'", self.config.name))
    }
}

pub(crate) fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

fn select_project(home: &std::path::Path, requested: Option<&str>) -> Result<ProjectName> {
    if let Some(name) = requested {
        return Ok(ProjectName::from(name));
    }
    let mut projects =
        config::list_projects_at(home).context("failed to list registered projects")?;
    match projects.len() {
        0 => bail!("no projects registered. Run `teamsync init` first."),
        1 => Ok(projects.remove(0)),
        _ => bail!(
            "several projects registered ({}); pick one with --project",
            projects
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// `a, b, +3 more`
pub(crate) fn summarize_files(files: &[String]) -> String {
    if files.is_empty() {
        return "-".to_string();
    }
    let mut names: Vec<String> = files.iter().take(2).cloned().collect();
    if files.len() > names.len() {
        names.push(format!("+{} more", files.len() - names.len()));
    }
    names.join(", ")
}

/// First eight characters of an id, enough to tell records apart in a table.
pub(crate) fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
