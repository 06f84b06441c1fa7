//! Error types for teamsync-engine.

use std::path::PathBuf;

use thiserror::Error;

use teamsync_core::types::{ConflictId, MemberId, OperationId};
use teamsync_core::{RosterError, TransitionError};

use crate::access::Action;

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport unreachable or timed out. The only retryable kind.
    #[error("network error: {message}")]
    Network { message: String },

    /// Advisory access check refused the action.
    #[error("permission denied: {member} may not {action} (requires {required})")]
    PermissionDenied {
        member: MemberId,
        action: Action,
        required: String,
    },

    /// Conflicts on these files are still open; everything else was synced.
    #[error("{} unresolved conflict(s) in operation {operation}: {}", .files.len(), .files.join(", "))]
    ConflictUnresolved {
        operation: OperationId,
        files: Vec<String>,
    },

    /// A local state file could not be parsed.
    #[error("corrupt state file {path}: {source}")]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// File exceeds the hard size cap; nothing was written.
    #[error("{path} is {size} bytes, over the {limit}-byte limit")]
    SizeLimitExceeded { path: String, size: u64, limit: u64 },

    /// Malformed request (e.g. manual merge without content).
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid shared file path '{0}'")]
    InvalidPath(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("sync already in progress (lock held at {})", .lock.display())]
    SyncInProgress { lock: PathBuf },

    #[error("sync cancelled by user")]
    Cancelled,

    /// The working copy moved on after the conflict was recorded; resolving
    /// it now would overwrite edits nobody archived.
    #[error("{path} changed since conflict {conflict} was detected; run sync again")]
    StaleConflict { conflict: ConflictId, path: String },

    #[error("unknown conflict '{0}'")]
    UnknownConflict(ConflictId),

    #[error("member '{0}' is not on the team roster")]
    UnknownMember(MemberId),

    /// Transport refused the request for a reason retrying will not fix.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("roster error: {0}")]
    Roster(#[from] RosterError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Only network failures are handed to the offline queue.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network { .. })
    }

    pub fn network(message: impl Into<String>) -> Self {
        SyncError::Network {
            message: message.into(),
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_is_retryable() {
        assert!(SyncError::network("down").is_retryable());
        assert!(!SyncError::Validation("x".into()).is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn permission_denied_names_action_and_requirement() {
        let err = SyncError::PermissionDenied {
            member: MemberId::from("bo@x.dev"),
            action: Action::Push,
            required: "read-write".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("push"));
        assert!(msg.contains("read-write"));
    }

    #[test]
    fn unresolved_lists_files() {
        let err = SyncError::ConflictUnresolved {
            operation: OperationId::from("op-1"),
            files: vec!["a.md".into(), "b.md".into()],
        };
        assert!(err.to_string().contains("2 unresolved"));
        assert!(err.to_string().contains("a.md, b.md"));
    }
}
