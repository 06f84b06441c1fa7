//! `teamsync team list|add|set-permission|set-role|remove`

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use teamsync_core::types::{MemberId, TeamMember};
use teamsync_engine::status::format_datetime_age;
use teamsync_engine::{apply_team_change, TeamChange};

use super::ProjectArg;
use crate::{PermissionArg, RoleArg};

#[derive(Subcommand, Debug)]
pub enum TeamCommand {
    /// Show the roster.
    List,
    /// Add a member.
    Add {
        member: String,
        /// owner | member
        #[arg(long, default_value = "member")]
        role: RoleArg,
        /// read-write | read-only
        #[arg(long, default_value = "read-write")]
        permission: PermissionArg,
    },
    /// Change a member's write permission.
    SetPermission {
        member: String,
        /// read-write | read-only
        permission: PermissionArg,
    },
    /// Change a member's role.
    SetRole {
        member: String,
        /// owner | member
        role: RoleArg,
    },
    /// Remove a member.
    Remove { member: String },
}

#[derive(Tabled)]
struct MemberRow {
    #[tabled(rename = "Member")]
    id: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Permission")]
    permission: String,
    #[tabled(rename = "Notifications")]
    notifications: String,
    #[tabled(rename = "Last sync")]
    last_sync: String,
}

impl From<&TeamMember> for MemberRow {
    fn from(m: &TeamMember) -> Self {
        Self {
            id: m.id.to_string(),
            role: m.role.to_string(),
            permission: m.permission.to_string(),
            notifications: if m.notifications { "on" } else { "off" }.to_string(),
            last_sync: m
                .last_sync
                .map(|t| format!("{} ago", format_datetime_age(t)))
                .unwrap_or_else(|| "never".to_string()),
        }
    }
}

pub fn run(project: ProjectArg, command: TeamCommand) -> Result<()> {
    let mut session = project.open()?;

    let change = match command {
        TeamCommand::List => {
            let team = &session.config.team;
            println!("{} (owner {})", team.name.bold(), team.owner);
            let rows: Vec<MemberRow> = team.members.iter().map(MemberRow::from).collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
            return Ok(());
        }
        TeamCommand::Add {
            member,
            role,
            permission,
        } => TeamChange::AddMember(TeamMember::new(member, role.into(), permission.into())),
        TeamCommand::SetPermission { member, permission } => TeamChange::SetPermission {
            member: MemberId::from(member),
            permission: permission.into(),
        },
        TeamCommand::SetRole { member, role } => TeamChange::SetRole {
            member: MemberId::from(member),
            role: role.into(),
        },
        TeamCommand::Remove { member } => TeamChange::RemoveMember(MemberId::from(member)),
    };

    let actor = session.config.member.clone();
    let notification = apply_team_change(&mut session.config.team, &actor, change, Utc::now())
        .context("team change rejected")?;
    session.save_config()?;

    let batcher = session.batcher();
    batcher.enqueue(notification.clone());
    session.deliver(&batcher)?;

    println!("{} {}", "✓".green(), notification.title);
    Ok(())
}
