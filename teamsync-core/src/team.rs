//! Team roster invariants and membership changes.
//!
//! Every mutating method validates before it changes anything, so a rejected
//! call leaves the roster exactly as it was.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::RosterError;
use crate::types::{MemberId, Permission, Role, Team, TeamId, TeamMember};

impl Team {
    /// New team whose single member is the owner, with read-write access.
    pub fn new(id: impl Into<TeamId>, name: impl Into<String>, owner: impl Into<MemberId>) -> Self {
        let owner = owner.into();
        Self {
            id: id.into(),
            name: name.into(),
            owner: owner.clone(),
            members: vec![TeamMember::new(owner, Role::Owner, Permission::ReadWrite)],
        }
    }

    /// Check roster invariants: unique identities, at least one owner, and the
    /// recorded `owner` present with role `owner`.
    pub fn validate(&self) -> Result<(), RosterError> {
        let mut seen = HashSet::new();
        for member in &self.members {
            if !seen.insert(&member.id) {
                return Err(RosterError::DuplicateMember(member.id.clone()));
            }
        }
        if self.owner_count() == 0 {
            return Err(RosterError::Invalid(format!(
                "team '{}' has no member with role owner",
                self.name
            )));
        }
        match self.member(&self.owner) {
            Some(m) if m.role == Role::Owner => Ok(()),
            Some(_) => Err(RosterError::Invalid(format!(
                "recorded owner '{}' does not hold role owner",
                self.owner
            ))),
            None => Err(RosterError::Invalid(format!(
                "recorded owner '{}' is not a member",
                self.owner
            ))),
        }
    }

    pub fn member(&self, id: &MemberId) -> Option<&TeamMember> {
        self.members.iter().find(|m| &m.id == id)
    }

    fn member_mut(&mut self, id: &MemberId) -> Result<&mut TeamMember, RosterError> {
        self.members
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or_else(|| RosterError::UnknownMember(id.clone()))
    }

    pub fn owner_count(&self) -> usize {
        self.members.iter().filter(|m| m.role == Role::Owner).count()
    }

    pub fn add_member(&mut self, member: TeamMember) -> Result<(), RosterError> {
        if self.member(&member.id).is_some() {
            return Err(RosterError::DuplicateMember(member.id));
        }
        self.members.push(member);
        Ok(())
    }

    /// Returns the previous permission.
    pub fn set_permission(
        &mut self,
        id: &MemberId,
        permission: Permission,
    ) -> Result<Permission, RosterError> {
        let member = self.member_mut(id)?;
        let previous = member.permission;
        member.permission = permission;
        Ok(previous)
    }

    /// Returns the previous role. Demoting the last owner is rejected.
    pub fn set_role(&mut self, id: &MemberId, role: Role) -> Result<Role, RosterError> {
        let current = self
            .member(id)
            .ok_or_else(|| RosterError::UnknownMember(id.clone()))?
            .role;
        if current == Role::Owner && role != Role::Owner && self.owner_count() == 1 {
            return Err(RosterError::LastOwner(id.clone()));
        }
        self.member_mut(id)?.role = role;
        if role != Role::Owner && &self.owner == id {
            self.promote_recorded_owner();
        }
        Ok(current)
    }

    pub fn remove_member(&mut self, id: &MemberId) -> Result<TeamMember, RosterError> {
        let idx = self
            .members
            .iter()
            .position(|m| &m.id == id)
            .ok_or_else(|| RosterError::UnknownMember(id.clone()))?;
        if self.members[idx].role == Role::Owner && self.owner_count() == 1 {
            return Err(RosterError::LastOwner(id.clone()));
        }
        let removed = self.members.remove(idx);
        if &self.owner == id {
            self.promote_recorded_owner();
        }
        Ok(removed)
    }

    /// Stamp `id`'s own last successful sync.
    pub fn record_sync(&mut self, id: &MemberId, at: DateTime<Utc>) -> Result<(), RosterError> {
        self.member_mut(id)?.last_sync = Some(at);
        Ok(())
    }

    fn promote_recorded_owner(&mut self) {
        if let Some(next) = self.members.iter().find(|m| m.role == Role::Owner) {
            self.owner = next.id.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team() -> Team {
        let mut t = Team::new("t1", "core", "ana@x.dev");
        t.add_member(TeamMember::new("bo@x.dev", Role::Member, Permission::ReadOnly))
            .unwrap();
        t
    }

    #[test]
    fn new_team_is_valid() {
        team().validate().expect("valid");
    }

    #[test]
    fn duplicate_member_rejected() {
        let mut t = team();
        let err = t
            .add_member(TeamMember::new("bo@x.dev", Role::Member, Permission::ReadWrite))
            .unwrap_err();
        assert!(matches!(err, RosterError::DuplicateMember(_)));
        assert_eq!(t.members.len(), 2);
    }

    #[test]
    fn last_owner_cannot_be_demoted_or_removed() {
        let mut t = team();
        let owner = MemberId::from("ana@x.dev");
        assert!(matches!(
            t.set_role(&owner, Role::Member),
            Err(RosterError::LastOwner(_))
        ));
        assert!(matches!(
            t.remove_member(&owner),
            Err(RosterError::LastOwner(_))
        ));
        assert_eq!(t.owner_count(), 1);
    }

    #[test]
    fn demoting_recorded_owner_hands_over_to_other_owner() {
        let mut t = team();
        let bo = MemberId::from("bo@x.dev");
        t.set_role(&bo, Role::Owner).unwrap();
        t.set_role(&MemberId::from("ana@x.dev"), Role::Member).unwrap();
        assert_eq!(t.owner, bo);
        t.validate().expect("still valid");
    }

    #[test]
    fn set_permission_returns_previous() {
        let mut t = team();
        let prev = t
            .set_permission(&MemberId::from("bo@x.dev"), Permission::ReadWrite)
            .unwrap();
        assert_eq!(prev, Permission::ReadOnly);
    }

    #[test]
    fn zero_owner_roster_is_invalid() {
        let t = Team {
            id: TeamId::from("t"),
            name: "x".into(),
            owner: MemberId::from("a"),
            members: vec![TeamMember::new("a", Role::Member, Permission::ReadWrite)],
        };
        assert!(matches!(t.validate(), Err(RosterError::Invalid(_))));
    }

    #[test]
    fn record_sync_touches_only_that_member() {
        let mut t = team();
        let at = Utc::now();
        t.record_sync(&MemberId::from("bo@x.dev"), at).unwrap();
        assert_eq!(t.member(&MemberId::from("bo@x.dev")).unwrap().last_sync, Some(at));
        assert_eq!(t.member(&MemberId::from("ana@x.dev")).unwrap().last_sync, None);
        assert!(matches!(
            t.record_sync(&MemberId::from("zed@x.dev"), at),
            Err(RosterError::UnknownMember(_))
        ));
    }
}
