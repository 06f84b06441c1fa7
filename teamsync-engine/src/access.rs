//! AccessGate: advisory permission checks against the team roster.
//!
//! This gate governs what the engine itself will send through the version
//! control port. It is not a security boundary: anyone with write access to
//! the underlying repository can edit and commit the shared files directly
//! and bypass it entirely.

use std::fmt;

use teamsync_core::types::{MemberId, Permission, Role, Team, TeamMember};

use crate::error::SyncError;

/// Actions the engine performs on a member's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Push,
    ModifySharedFile,
    ManageTeam,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Push => write!(f, "push"),
            Action::ModifySharedFile => write!(f, "modify_shared_file"),
            Action::ManageTeam => write!(f, "manage_team"),
        }
    }
}

impl Action {
    fn requirement(self) -> &'static str {
        match self {
            Action::Push | Action::ModifySharedFile => "read-write permission",
            Action::ManageTeam => "owner role",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Pure decision for one member and action.
pub fn authorize(member: &TeamMember, action: Action) -> Decision {
    let allowed = match action {
        Action::Push | Action::ModifySharedFile => member.permission == Permission::ReadWrite,
        Action::ManageTeam => member.role == Role::Owner,
    };
    if allowed {
        Decision::Allow
    } else {
        Decision::Deny {
            reason: format!(
                "{} ({} / {}) lacks {} for {action}",
                member.id,
                member.role,
                member.permission,
                action.requirement()
            ),
        }
    }
}

/// Gate bound to a roster snapshot.
#[derive(Debug, Clone, Copy)]
pub struct AccessGate<'a> {
    team: &'a Team,
}

impl<'a> AccessGate<'a> {
    pub fn new(team: &'a Team) -> Self {
        Self { team }
    }

    /// Members missing from the roster are denied everything.
    pub fn authorize(&self, member: &MemberId, action: Action) -> Decision {
        match self.team.member(member) {
            Some(m) => authorize(m, action),
            None => Decision::Deny {
                reason: format!("{member} is not on team '{}'", self.team.name),
            },
        }
    }

    /// `authorize` as a typed error.
    pub fn require(&self, member: &MemberId, action: Action) -> Result<(), SyncError> {
        match self.authorize(member, action) {
            Decision::Allow => Ok(()),
            Decision::Deny { reason } => {
                tracing::warn!(member = %member, action = %action, reason = %reason, "access denied");
                Err(SyncError::PermissionDenied {
                    member: member.clone(),
                    action,
                    required: action.requirement().to_string(),
                })
            }
        }
    }
}
