//! Domain types for the team sync engine.
//!
//! Every persisted struct serializes with the field names of the on-disk JSON
//! layouts (operation history, notification queue, conflict archive). All
//! timestamps are UTC and serialize as RFC 3339.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransitionError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }
    };
}

string_newtype!(
    /// Stable identity of a team member (usually an email address).
    MemberId
);
string_newtype!(
    /// Identifier of a team.
    TeamId
);
string_newtype!(
    /// Name of a project registered under `~/.teamsync/projects/`.
    ProjectName
);
string_newtype!(
    /// Identifier of a [`SyncOperation`].
    OperationId
);
string_newtype!(
    /// Identifier of a [`ConflictRecord`].
    ConflictId
);
string_newtype!(
    /// Identifier of a [`Notification`].
    NotificationId
);

impl OperationId {
    pub fn generate() -> Self {
        Self(format!("op-{}", Uuid::new_v4()))
    }
}

impl ConflictId {
    pub fn generate() -> Self {
        Self(format!("conflict-{}", Uuid::new_v4()))
    }
}

impl NotificationId {
    pub fn generate() -> Self {
        Self(format!("notif-{}", Uuid::new_v4()))
    }
}

// ---------------------------------------------------------------------------
// Team roster
// ---------------------------------------------------------------------------

/// Role of a member within a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    #[default]
    Member,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Owner => write!(f, "owner"),
            Role::Member => write!(f, "member"),
        }
    }
}

/// Write permission on the shared files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Permission {
    #[default]
    ReadWrite,
    ReadOnly,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::ReadWrite => write!(f, "read-write"),
            Permission::ReadOnly => write!(f, "read-only"),
        }
    }
}

fn default_true() -> bool {
    true
}

/// A member of a [`Team`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub id: MemberId,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub permission: Permission,
    /// Opt-in for change notifications.
    #[serde(default = "default_true")]
    pub notifications: bool,
    /// Only ever written by this member's own successful sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
}

impl TeamMember {
    pub fn new(id: impl Into<MemberId>, role: Role, permission: Permission) -> Self {
        Self {
            id: id.into(),
            role,
            permission,
            notifications: true,
            last_sync: None,
        }
    }
}

/// A team sharing one project's memory files.
///
/// Invariants (checked by [`Team::validate`]): at least one `owner`, member
/// identities unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub owner: MemberId,
    #[serde(default)]
    pub members: Vec<TeamMember>,
}

// ---------------------------------------------------------------------------
// Shared files
// ---------------------------------------------------------------------------

/// Last-synced metadata for one shared file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedFile {
    /// Relative logical path, `/`-separated, no leading separator.
    pub path: String,
    /// Version token (SHA-256 of the LF-normalised content).
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<MemberId>,
    pub modified_at: DateTime<Utc>,
    pub size: u64,
}

// ---------------------------------------------------------------------------
// Sync operations
// ---------------------------------------------------------------------------

/// Direction of a sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Push,
    Pull,
    #[default]
    Bidirectional,
}

impl OperationKind {
    /// Whether this kind may send local changes through the transport.
    pub fn pushes(self) -> bool {
        !matches!(self, OperationKind::Pull)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Push => write!(f, "push"),
            OperationKind::Pull => write!(f, "pull"),
            OperationKind::Bidirectional => write!(f, "bidirectional"),
        }
    }
}

/// Lifecycle state of a [`SyncOperation`].
///
/// ```text
/// pending -> in_progress -> success | conflict | error
/// in_progress -> pending            (handed to the offline queue)
/// pending -> error                  (retries exhausted)
/// conflict -> resolved -> success
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    #[default]
    Pending,
    InProgress,
    Success,
    Conflict,
    Resolved,
    Error,
}

impl OperationStatus {
    pub fn can_transition_to(self, next: OperationStatus) -> bool {
        use OperationStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Error)
                | (InProgress, Success)
                | (InProgress, Conflict)
                | (InProgress, Error)
                | (InProgress, Pending)
                | (Conflict, Resolved)
                | (Resolved, Success)
        )
    }

    /// `success` and `error` never change again. `conflict` is resumable.
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationStatus::Success | OperationStatus::Error)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OperationStatus::Pending => "pending",
            OperationStatus::InProgress => "in_progress",
            OperationStatus::Success => "success",
            OperationStatus::Conflict => "conflict",
            OperationStatus::Resolved => "resolved",
            OperationStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// One sync attempt, as recorded in the operation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub id: OperationId,
    pub member_id: MemberId,
    pub operation_type: OperationKind,
    pub status: OperationStatus,
    #[serde(default)]
    pub files_affected: Vec<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub conflict_id: Option<ConflictId>,
}

impl SyncOperation {
    pub fn new(member_id: MemberId, kind: OperationKind, now: DateTime<Utc>) -> Self {
        Self {
            id: OperationId::generate(),
            member_id,
            operation_type: kind,
            status: OperationStatus::Pending,
            files_affected: Vec::new(),
            started_at: now,
            completed_at: None,
            error_message: None,
            conflict_id: None,
        }
    }

    /// Move to `next`, stamping `completed_at` on terminal states.
    pub fn transition(
        &mut self,
        next: OperationStatus,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        match next {
            OperationStatus::Success | OperationStatus::Error | OperationStatus::Conflict => {
                self.completed_at = Some(now);
            }
            OperationStatus::Pending | OperationStatus::InProgress => {
                self.completed_at = None;
            }
            OperationStatus::Resolved => {}
        }
        Ok(())
    }

    /// Terminal failure with a message.
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(OperationStatus::Error, now)?;
        self.error_message = Some(message.into());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Conflicts
// ---------------------------------------------------------------------------

/// Which side of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Local,
    Remote,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Local => "local",
            Side::Remote => "remote",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a conflict. `content == None` means the side deleted the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictVersion {
    pub content: Option<String>,
    #[serde(default)]
    pub modified_by: Option<MemberId>,
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub version: Option<String>,
}

impl ConflictVersion {
    pub fn is_deleted(&self) -> bool {
        self.content.is_none()
    }
}

/// How a conflict was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    KeepLocal,
    KeepRemote,
    ManualMerge,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::KeepLocal => write!(f, "keep_local"),
            Resolution::KeepRemote => write!(f, "keep_remote"),
            Resolution::ManualMerge => write!(f, "manual_merge"),
        }
    }
}

/// A detected divergence on one file. `open` until `resolution` is set;
/// resolved records are never reopened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: ConflictId,
    pub sync_operation_id: OperationId,
    pub file_path: String,
    pub local_version: ConflictVersion,
    pub remote_version: ConflictVersion,
    #[serde(default)]
    pub resolution: Option<Resolution>,
    #[serde(default)]
    pub resolved_by: Option<MemberId>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Content chosen by a `manual_merge`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_content: Option<String>,
}

impl ConflictRecord {
    pub fn open(
        sync_operation_id: OperationId,
        file_path: impl Into<String>,
        local_version: ConflictVersion,
        remote_version: ConflictVersion,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ConflictId::generate(),
            sync_operation_id,
            file_path: file_path.into(),
            local_version,
            remote_version,
            resolution: None,
            resolved_by: None,
            resolved_at: None,
            created_at: now,
            merged_content: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// True when either side is a deletion.
    pub fn is_delete_modify(&self) -> bool {
        self.local_version.is_deleted() || self.remote_version.is_deleted()
    }

    pub fn version(&self, side: Side) -> &ConflictVersion {
        match side {
            Side::Local => &self.local_version,
            Side::Remote => &self.remote_version,
        }
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Default notification lifetime.
pub const NOTIFICATION_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    MemoryChanged,
    ConflictDetected,
    MemberJoined,
    PermissionChanged,
}

impl NotificationKind {
    /// High-priority events flush the batcher immediately.
    pub fn is_high_priority(self) -> bool {
        matches!(self, NotificationKind::ConflictDetected)
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationKind::MemoryChanged => "memory_changed",
            NotificationKind::ConflictDetected => "conflict_detected",
            NotificationKind::MemberJoined => "member_joined",
            NotificationKind::PermissionChanged => "permission_changed",
        };
        f.write_str(s)
    }
}

/// A change event delivered to team members. Immutable except `read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub source_member: Option<MemberId>,
    #[serde(default)]
    pub affected_files: Vec<String>,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        content: impl Into<String>,
        source_member: Option<MemberId>,
        affected_files: Vec<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::generate(),
            kind,
            title: title.into(),
            content: content.into(),
            source_member,
            affected_files,
            read: false,
            created_at: now,
            expires_at: now + Duration::days(NOTIFICATION_TTL_DAYS),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display_and_equality() {
        assert_eq!(MemberId::from("a@x.dev").to_string(), "a@x.dev");
        assert_eq!(MemberId::from("a"), MemberId::from(String::from("a")));
    }

    #[test]
    fn generated_ids_are_prefixed_and_unique() {
        let a = ConflictId::generate();
        let b = ConflictId::generate();
        assert!(a.0.starts_with("conflict-"));
        assert_ne!(a, b);
    }

    #[test]
    fn operation_happy_path_transitions() {
        let now = Utc::now();
        let mut op = SyncOperation::new(MemberId::from("a"), OperationKind::Push, now);
        assert_eq!(op.status, OperationStatus::Pending);
        op.transition(OperationStatus::InProgress, now).unwrap();
        op.transition(OperationStatus::Conflict, now).unwrap();
        assert!(op.completed_at.is_some());
        op.transition(OperationStatus::Resolved, now).unwrap();
        op.transition(OperationStatus::Success, now).unwrap();
        assert!(op.status.is_terminal());
    }

    #[test]
    fn terminal_operation_rejects_further_transitions() {
        let now = Utc::now();
        let mut op = SyncOperation::new(MemberId::from("a"), OperationKind::Pull, now);
        op.transition(OperationStatus::InProgress, now).unwrap();
        op.transition(OperationStatus::Success, now).unwrap();
        let err = op.transition(OperationStatus::InProgress, now).unwrap_err();
        assert_eq!(err.from, OperationStatus::Success);
        assert_eq!(err.to, OperationStatus::InProgress);
    }

    #[test]
    fn requeue_clears_completed_at() {
        let now = Utc::now();
        let mut op = SyncOperation::new(MemberId::from("a"), OperationKind::Push, now);
        op.transition(OperationStatus::InProgress, now).unwrap();
        op.transition(OperationStatus::Pending, now).unwrap();
        assert_eq!(op.completed_at, None);
    }

    #[test]
    fn operation_serializes_with_history_field_names() {
        let now = Utc::now();
        let op = SyncOperation::new(MemberId::from("a"), OperationKind::Bidirectional, now);
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["operation_type"], "bidirectional");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["member_id"], "a");
        assert!(json["conflict_id"].is_null());
    }

    #[test]
    fn notification_expires_after_seven_days() {
        let now = Utc::now();
        let n = Notification::new(
            NotificationKind::MemoryChanged,
            "t",
            "c",
            None,
            vec![],
            now,
        );
        assert!(!n.is_expired(now + Duration::days(6)));
        assert!(n.is_expired(now + Duration::days(7)));
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "memory_changed");
    }

    #[test]
    fn permission_uses_kebab_case() {
        let yaml = serde_yaml::to_string(&Permission::ReadOnly).unwrap();
        assert_eq!(yaml.trim(), "read-only");
    }
}
