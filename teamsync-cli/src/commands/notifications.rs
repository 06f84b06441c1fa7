//! `teamsync notifications list|read`

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use teamsync_core::types::{Notification, NotificationId};
use teamsync_engine::status::format_datetime_age;

use super::{summarize_files, ProjectArg};

#[derive(Subcommand, Debug)]
pub enum NotificationsCommand {
    /// Show unread notifications (everything not yet expired with --all).
    List {
        #[arg(long)]
        all: bool,
    },
    /// Mark one notification read, or all of them when no id is given.
    Read {
        id: Option<String>,
    },
}

#[derive(Tabled)]
struct NotificationRow {
    #[tabled(rename = "Id")]
    id: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "From")]
    from: String,
    #[tabled(rename = "Files")]
    files: String,
    #[tabled(rename = "Age")]
    age: String,
}

impl From<&Notification> for NotificationRow {
    fn from(n: &Notification) -> Self {
        let kind = if n.read {
            n.kind.to_string()
        } else {
            format!("{} *", n.kind)
        };
        Self {
            id: n.id.to_string(),
            kind,
            title: n.title.clone(),
            from: n
                .source_member
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "-".to_string()),
            files: summarize_files(&n.affected_files),
            age: format_datetime_age(n.created_at),
        }
    }
}

pub fn run(project: ProjectArg, command: NotificationsCommand) -> Result<()> {
    let session = project.open()?;
    let store = session.notifications();
    let now = Utc::now();

    match command {
        NotificationsCommand::List { all } => {
            let notifications = if all {
                store.load(now).map(|file| file.notifications)
            } else {
                store.unread(now)
            }
            .context("failed to read notifications")?;
            if notifications.is_empty() {
                println!("{} no {}notifications", "✓".green(), if all { "" } else { "unread " });
                return Ok(());
            }
            let rows: Vec<NotificationRow> =
                notifications.iter().map(NotificationRow::from).collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        NotificationsCommand::Read { id } => {
            let id = id.map(NotificationId::from);
            let changed = store
                .mark_read(id.as_ref(), now)
                .context("failed to update notifications")?;
            match (&id, changed) {
                (Some(id), 0) => println!("notification {id} was already read or does not exist"),
                (_, n) => println!("{} marked {n} notification(s) read", "✓".green()),
            }
        }
    }
    Ok(())
}
