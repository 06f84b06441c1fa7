use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the watcher runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("roster error: {0}")]
    Roster(#[from] teamsync_core::RosterError),

    #[error("sync error: {0}")]
    Sync(#[from] teamsync_engine::SyncError),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("{task} task failed: {message}")]
    Task { task: &'static str, message: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
