//! teamsync core library: domain types, team roster, project configuration.
//!
//! - [`types`]: newtypes and the persisted data model
//! - [`team`]: roster invariants and membership changes
//! - [`config`]: per-project YAML configuration (load / save / init)
//! - [`error`]: [`RosterError`], [`TransitionError`]

pub mod config;
pub mod error;
pub mod team;
pub mod types;

pub use config::{AutoStrategy, ProjectConfig, SyncSettings};
pub use error::{RosterError, TransitionError};
pub use types::{
    ConflictId, ConflictRecord, ConflictVersion, MemberId, Notification, NotificationId,
    NotificationKind, OperationId, OperationKind, OperationStatus, Permission, ProjectName,
    Resolution, Role, SharedFile, Side, SyncOperation, Team, TeamId, TeamMember,
};
