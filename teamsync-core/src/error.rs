//! Error types for teamsync-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{MemberId, OperationStatus};

/// All errors that can arise from roster and project-config operations.
#[derive(Debug, Error)]
pub enum RosterError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file path.
    #[error("failed to parse project config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The project config file did not exist at the expected path.
    #[error("project config not found at {path}")]
    NotFound { path: PathBuf },

    /// Identity already present in the team.
    #[error("member '{0}' is already on the team")]
    DuplicateMember(MemberId),

    /// Identity not present in the team.
    #[error("member '{0}' is not on the team")]
    UnknownMember(MemberId),

    /// The change would leave the team without an owner.
    #[error("team must keep at least one owner; refusing to demote or remove '{0}'")]
    LastOwner(MemberId),

    /// Structural invariant violated by a loaded or constructed roster.
    #[error("invalid team roster: {0}")]
    Invalid(String),
}

/// Rejected [`SyncOperation`](crate::types::SyncOperation) status change.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal sync operation transition {from} -> {to}")]
pub struct TransitionError {
    pub from: OperationStatus,
    pub to: OperationStatus,
}
