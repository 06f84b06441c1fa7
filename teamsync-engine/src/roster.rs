//! Team administration: owner-only roster changes that announce themselves
//! as notifications.

use chrono::{DateTime, Utc};

use teamsync_core::types::{
    MemberId, Notification, NotificationKind, Permission, Role, Team, TeamMember,
};

use crate::access::{AccessGate, Action};
use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeamChange {
    AddMember(TeamMember),
    SetPermission { member: MemberId, permission: Permission },
    SetRole { member: MemberId, role: Role },
    RemoveMember(MemberId),
}

/// Apply `change` on behalf of `actor`, who must be an owner. On success the
/// team is updated in place and the returned notification describes it.
/// On failure `team` is untouched.
pub fn apply_team_change(
    team: &mut Team,
    actor: &MemberId,
    change: TeamChange,
    now: DateTime<Utc>,
) -> Result<Notification, SyncError> {
    AccessGate::new(team).require(actor, Action::ManageTeam)?;

    let mut updated = team.clone();
    let notification = match change {
        TeamChange::AddMember(member) => {
            let id = member.id.clone();
            let summary = format!("{id} joined as {} ({})", member.role, member.permission);
            updated.add_member(member)?;
            Notification::new(
                NotificationKind::MemberJoined,
                format!("{id} joined {}", team.name),
                summary,
                Some(actor.clone()),
                Vec::new(),
                now,
            )
        }
        TeamChange::SetPermission { member, permission } => {
            let previous = updated.set_permission(&member, permission)?;
            Notification::new(
                NotificationKind::PermissionChanged,
                format!("{member} is now {permission}"),
                format!("{actor} changed {member} from {previous} to {permission}"),
                Some(actor.clone()),
                Vec::new(),
                now,
            )
        }
        TeamChange::SetRole { member, role } => {
            let previous = updated.set_role(&member, role)?;
            Notification::new(
                NotificationKind::PermissionChanged,
                format!("{member} is now {role}"),
                format!("{actor} changed {member} from {previous} to {role}"),
                Some(actor.clone()),
                Vec::new(),
                now,
            )
        }
        TeamChange::RemoveMember(member) => {
            updated.remove_member(&member)?;
            Notification::new(
                NotificationKind::PermissionChanged,
                format!("{member} left {}", team.name),
                format!("{actor} removed {member} from the team"),
                Some(actor.clone()),
                Vec::new(),
                now,
            )
        }
    };
    updated.validate()?;
    *team = updated;
    tracing::info!(actor = %actor, title = %notification.title, "team roster changed");
    Ok(notification)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team() -> Team {
        Team::new("t", "core", "owner@x.dev")
    }

    #[test]
    fn owner_adds_member_and_announces_it() {
        let mut t = team();
        let owner = MemberId::from("owner@x.dev");
        let n = apply_team_change(
            &mut t,
            &owner,
            TeamChange::AddMember(TeamMember::new("bo@x.dev", Role::Member, Permission::ReadOnly)),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(n.kind, NotificationKind::MemberJoined);
        assert!(t.member(&MemberId::from("bo@x.dev")).is_some());
    }

    #[test]
    fn non_owner_is_denied_and_team_unchanged() {
        let mut t = team();
        let owner = MemberId::from("owner@x.dev");
        apply_team_change(
            &mut t,
            &owner,
            TeamChange::AddMember(TeamMember::new("bo@x.dev", Role::Member, Permission::ReadWrite)),
            Utc::now(),
        )
        .unwrap();
        let before = t.clone();
        let err = apply_team_change(
            &mut t,
            &MemberId::from("bo@x.dev"),
            TeamChange::RemoveMember(owner),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::PermissionDenied { .. }));
        assert_eq!(t, before);
    }

    #[test]
    fn last_owner_cannot_be_demoted() {
        let mut t = team();
        let owner = MemberId::from("owner@x.dev");
        let err = apply_team_change(
            &mut t,
            &owner,
            TeamChange::SetRole {
                member: owner.clone(),
                role: Role::Member,
            },
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::Roster(_)));
        assert_eq!(t.member(&owner).unwrap().role, Role::Owner);
    }

    #[test]
    fn permission_change_is_announced() {
        let mut t = team();
        let owner = MemberId::from("owner@x.dev");
        apply_team_change(
            &mut t,
            &owner,
            TeamChange::AddMember(TeamMember::new("bo@x.dev", Role::Member, Permission::ReadWrite)),
            Utc::now(),
        )
        .unwrap();
        let n = apply_team_change(
            &mut t,
            &owner,
            TeamChange::SetPermission {
                member: MemberId::from("bo@x.dev"),
                permission: Permission::ReadOnly,
            },
            Utc::now(),
        )
        .unwrap();
        assert_eq!(n.kind, NotificationKind::PermissionChanged);
        assert!(n.content.contains("read-write"));
    }
}
