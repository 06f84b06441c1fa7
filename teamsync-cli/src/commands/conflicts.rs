//! `teamsync conflicts list|show`

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use teamsync_core::types::{ConflictId, ConflictRecord, ConflictVersion};
use teamsync_engine::status::format_datetime_age;
use teamsync_engine::{conflict_diff, ConflictArchive};

use super::{short_id, ProjectArg};

#[derive(Subcommand, Debug)]
pub enum ConflictsCommand {
    /// List open conflicts (all records with --all).
    List {
        #[arg(long)]
        all: bool,
    },
    /// Show both sides of a conflict as a unified diff.
    Show {
        /// Conflict id (as printed by `sync` or `conflicts list`).
        id: String,
    },
}

#[derive(Tabled)]
struct ConflictRow {
    #[tabled(rename = "Id")]
    id: String,
    #[tabled(rename = "File")]
    file: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Local by")]
    local_by: String,
    #[tabled(rename = "Remote by")]
    remote_by: String,
    #[tabled(rename = "Age")]
    age: String,
    #[tabled(rename = "Resolution")]
    resolution: String,
}

impl From<&ConflictRecord> for ConflictRow {
    fn from(record: &ConflictRecord) -> Self {
        Self {
            id: record.id.to_string(),
            file: record.file_path.clone(),
            kind: kind_label(record).to_string(),
            local_by: author(&record.local_version),
            remote_by: author(&record.remote_version),
            age: format_datetime_age(record.created_at),
            resolution: record
                .resolution
                .map(|r| r.to_string())
                .unwrap_or_else(|| "open".to_string()),
        }
    }
}

pub fn run(project: ProjectArg, command: ConflictsCommand) -> Result<()> {
    let session = project.open()?;
    let archive = ConflictArchive::new(&session.state_dir);

    match command {
        ConflictsCommand::List { all } => {
            let records = if all {
                archive.list_records()
            } else {
                archive.open_records()
            }
            .context("failed to read conflict records")?;
            if records.is_empty() {
                println!("{} no {}conflicts", "✓".green(), if all { "" } else { "open " });
                return Ok(());
            }
            let rows: Vec<ConflictRow> = records.iter().map(ConflictRow::from).collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        ConflictsCommand::Show { id } => {
            let id = ConflictId::from(id);
            let record = archive
                .load_record(&id)
                .with_context(|| format!("failed to load conflict '{id}'"))?;
            print_record(&record);
        }
    }
    Ok(())
}

fn print_record(record: &ConflictRecord) {
    println!("conflict {} on {}", record.id, record.file_path.bold());
    println!("  operation: {}", record.sync_operation_id);
    println!("  kind:      {}", kind_label(record));
    println!(
        "  local:     {} ({})",
        author(&record.local_version),
        version_label(&record.local_version)
    );
    println!(
        "  remote:    {} ({})",
        author(&record.remote_version),
        version_label(&record.remote_version)
    );
    match (record.resolution, &record.resolved_by) {
        (Some(resolution), by) => println!(
            "  resolved:  {resolution} by {}",
            by.as_ref().map(|m| m.to_string()).unwrap_or_else(|| "-".to_string())
        ),
        (None, _) => println!("  resolved:  {}", "open".red()),
    }
    println!();

    let diff = conflict_diff(record);
    if diff.is_empty() {
        println!("(both sides are equivalent)");
        return;
    }
    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            println!("{}", line.bold());
        } else if line.starts_with('+') {
            println!("{}", line.green());
        } else if line.starts_with('-') {
            println!("{}", line.red());
        } else if line.starts_with("@@") {
            println!("{}", line.cyan());
        } else {
            println!("{line}");
        }
    }
}

fn kind_label(record: &ConflictRecord) -> &'static str {
    if record.is_delete_modify() {
        "delete/modify"
    } else {
        "edit/edit"
    }
}

fn author(version: &ConflictVersion) -> String {
    version
        .modified_by
        .as_ref()
        .map(|m| m.to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn version_label(version: &ConflictVersion) -> String {
    match (&version.content, &version.version) {
        (None, _) => "deleted".to_string(),
        (Some(_), Some(token)) => short_id(token).to_string(),
        (Some(_), None) => "unversioned".to_string(),
    }
}
