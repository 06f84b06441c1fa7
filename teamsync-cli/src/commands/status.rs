//! `teamsync status`: per-file sync state and everything waiting on you.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use teamsync_engine::status::{format_datetime_age, FileStatus};
use teamsync_engine::{project_status, FileState, ProjectStatus};

use super::{short_id, ProjectArg};

/// Arguments for `teamsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub project: ProjectArg,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let session = self.project.open()?;
        let status = project_status(&session.config, &session.state_dir)
            .with_context(|| format!("failed to read state for '{}'", session.config.name))?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&status).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        print_table(&status);
        Ok(())
    }
}

#[derive(Tabled)]
struct FileRow {
    #[tabled(rename = "File")]
    path: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Base")]
    base: String,
    #[tabled(rename = "Last modified by")]
    modified_by: String,
    #[tabled(rename = "Conflict")]
    conflict: String,
}

impl From<&FileStatus> for FileRow {
    fn from(file: &FileStatus) -> Self {
        Self {
            path: file.path.clone(),
            state: format!("{} {}", state_indicator(file.state), file.state),
            base: file
                .base_version
                .as_deref()
                .map(|v| short_id(v).to_string())
                .unwrap_or_else(|| "-".to_string()),
            modified_by: file
                .last_modified_by
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "-".to_string()),
            conflict: if file.open_conflict { "open" } else { "" }.to_string(),
        }
    }
}

fn print_table(status: &ProjectStatus) {
    let last_sync = status
        .last_sync
        .map(format_datetime_age)
        .unwrap_or_else(|| "never".to_string());
    println!(
        "teamsync v{} | {} | {} | last sync {}",
        env!("CARGO_PKG_VERSION"),
        status.project.bold(),
        status.member,
        last_sync,
    );

    let separator = "■".repeat(67).bright_black().to_string();
    println!("{separator}");
    if status.files.is_empty() {
        println!("No tracked files.");
    } else {
        let rows: Vec<FileRow> = status.files.iter().map(FileRow::from).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }
    println!("{separator}");

    if !status.open_conflicts.is_empty() {
        println!(
            "{} {} open conflict(s):",
            "!".red().bold(),
            status.open_conflicts.len()
        );
        for record in &status.open_conflicts {
            println!("  {}  {}", record.id, record.file_path);
        }
    }
    if status.pending_operations > 0 {
        println!(
            "{} {} operation(s) queued for retry. Run 'teamsync queue drain' once online.",
            "⚠".yellow(),
            status.pending_operations
        );
    }
    if status.unread_notifications > 0 {
        println!(
            "✉ {} unread notification(s). Run 'teamsync notifications list'.",
            status.unread_notifications
        );
    }
    if status.is_clean() {
        println!("{} everything is in sync", "✓".green());
    } else if status
        .files
        .iter()
        .any(|f| matches!(f.state, FileState::Modified | FileState::New | FileState::Missing))
    {
        println!("Run 'teamsync sync' to publish local changes.");
    }
}

fn state_indicator(state: FileState) -> String {
    match state {
        FileState::NeverSynced => "■".bright_black().bold().to_string(),
        FileState::Current => "■".green().bold().to_string(),
        FileState::Modified => "■".yellow().bold().to_string(),
        FileState::New => "■".cyan().bold().to_string(),
        FileState::Missing => "■".red().bold().to_string(),
    }
}
