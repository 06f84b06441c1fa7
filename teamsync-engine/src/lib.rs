//! # teamsync-engine
//!
//! Sync and conflict resolution for a team's shared memory files.
//!
//! Build a [`SyncCoordinator`] from a [`ProjectConfig`](teamsync_core::ProjectConfig),
//! a state directory and a [`VersionControlPort`], then call
//! [`SyncCoordinator::sync`]. Open conflicts are settled with
//! [`SyncCoordinator::resolve`]; operations that hit an unreachable
//! transport are replayed by [`SyncCoordinator::drain_offline_queue`].

pub mod access;
mod atomic;
pub mod archive;
pub mod batcher;
pub mod coordinator;
pub mod detector;
pub mod diff;
pub mod error;
pub mod git_port;
pub mod lock;
pub mod notification_store;
pub mod offline_queue;
pub mod port;
pub mod resolver;
pub mod roster;
pub mod state_store;
pub mod status;
pub mod workspace;

pub use access::{AccessGate, Action, Decision};
pub use archive::ConflictArchive;
pub use batcher::{BatcherConfig, Enqueued, NotificationBatcher};
pub use coordinator::{CancelHandle, ResolveOutcome, SyncCoordinator, SyncReport};
pub use detector::{classify, Outcome};
pub use diff::conflict_diff;
pub use error::SyncError;
pub use git_port::GitPort;
pub use notification_store::NotificationStore;
pub use offline_queue::{DrainReport, OfflineQueue};
pub use port::{MemoryPort, MemoryRemote, Snapshot, VersionControlPort};
pub use resolver::{ConflictResolver, ResolvedFile, Strategy};
pub use roster::{apply_team_change, TeamChange};
pub use state_store::StateStore;
pub use status::{project_status, FileState, ProjectStatus};
