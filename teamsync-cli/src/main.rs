//! teamsync: keep a team's shared memory files in sync.
//!
//! # Usage
//!
//! ```text
//! teamsync init <path> --project <name> --member <id> [--track <file>]...
//! teamsync sync [--pull | --push] [--project <name>]
//! teamsync status [--json]
//! teamsync conflicts list [--all] | show <id>
//! teamsync resolve <id> --keep-local | --keep-remote | --merge-file <path>
//! teamsync queue list | drain
//! teamsync notifications list [--all] | read [<id>]
//! teamsync team list | add | set-permission | set-role | remove
//! teamsync watch [--sync]
//! ```
//!
//! Every command except `init` takes `--project`; it may be omitted when
//! exactly one project is registered.

mod commands;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    conflicts::ConflictsCommand, init::InitArgs, notifications::NotificationsCommand,
    queue::QueueCommand, resolve::ResolveArgs, status::StatusArgs, sync::SyncArgs,
    team::TeamCommand, watch::WatchArgs, ProjectArg,
};
use teamsync_core::types::{Permission, Role};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "teamsync",
    version,
    about = "Sync a team's shared memory files and resolve conflicting edits",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a working tree as a synced project.
    Init(InitArgs),

    /// Exchange changes with the team remote.
    Sync(SyncArgs),

    /// Show per-file sync state, open conflicts and queued operations.
    Status(StatusArgs),

    /// Inspect conflict records.
    Conflicts {
        #[command(flatten)]
        project: ProjectArg,
        #[command(subcommand)]
        command: ConflictsCommand,
    },

    /// Settle an open conflict.
    Resolve(ResolveArgs),

    /// Inspect or replay operations waiting for the remote.
    Queue {
        #[command(flatten)]
        project: ProjectArg,
        #[command(subcommand)]
        command: QueueCommand,
    },

    /// Read delivered notifications.
    Notifications {
        #[command(flatten)]
        project: ProjectArg,
        #[command(subcommand)]
        command: NotificationsCommand,
    },

    /// Manage the team roster (owners only).
    Team {
        #[command(flatten)]
        project: ProjectArg,
        #[command(subcommand)]
        command: TeamCommand,
    },

    /// Watch shared files and deliver change notifications until Ctrl-C.
    Watch(WatchArgs),
}

// ---------------------------------------------------------------------------
// Shared roster arguments: parsed from CLI strings, convert to core types
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse `Role` from CLI args.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleArg(pub Role);

impl FromStr for RoleArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "owner" => Ok(Self(Role::Owner)),
            "member" => Ok(Self(Role::Member)),
            other => Err(format!("unknown role '{other}'; expected: owner, member")),
        }
    }
}

impl fmt::Display for RoleArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<RoleArg> for Role {
    fn from(r: RoleArg) -> Self {
        r.0
    }
}

/// Thin wrapper so clap can parse `Permission` from CLI args.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionArg(pub Permission);

impl FromStr for PermissionArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "read-write" | "rw" => Ok(Self(Permission::ReadWrite)),
            "read-only" | "ro" => Ok(Self(Permission::ReadOnly)),
            other => Err(format!(
                "unknown permission '{other}'; expected: read-write, read-only"
            )),
        }
    }
}

impl fmt::Display for PermissionArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<PermissionArg> for Permission {
    fn from(p: PermissionArg) -> Self {
        p.0
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    // Engine warnings (oversized files, corrupt state) go to stderr; the
    // watcher also reports its progress.
    let default_level = if matches!(cli.command, Commands::Watch(_)) {
        "info"
    } else {
        "warn"
    };
    teamsync_daemon::init_tracing(default_level);

    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Conflicts { project, command } => commands::conflicts::run(project, command),
        Commands::Resolve(args) => args.run(),
        Commands::Queue { project, command } => commands::queue::run(project, command),
        Commands::Notifications { project, command } => {
            commands::notifications::run(project, command)
        }
        Commands::Team { project, command } => commands::team::run(project, command),
        Commands::Watch(args) => args.run(),
    }
}
