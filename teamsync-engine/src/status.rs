//! Local sync status: how each tracked file compares to its last-synced base,
//! plus queue, conflict and notification counts.
//!
//! Purely local. Nothing here touches the transport.
//!
//! File state precedence:
//! 1. `NeverSynced` (no base and no local file)
//! 2. `New` (local file without a base)
//! 3. `Missing` (base without a local file)
//! 4. `Modified` (local token differs from the base token)
//! 5. `Current`

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use teamsync_core::config::ProjectConfig;
use teamsync_core::types::{ConflictRecord, MemberId};

use crate::archive::ConflictArchive;
use crate::error::SyncError;
use crate::notification_store::NotificationStore;
use crate::state_store::StateStore;
use crate::workspace::{version_token, WorkingTree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    NeverSynced,
    Current,
    Modified,
    Missing,
    New,
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileState::NeverSynced => "never synced",
            FileState::Current => "current",
            FileState::Modified => "modified",
            FileState::Missing => "missing",
            FileState::New => "new",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStatus {
    pub path: String,
    pub state: FileState,
    pub base_version: Option<String>,
    pub last_modified_by: Option<MemberId>,
    pub open_conflict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectStatus {
    pub project: String,
    pub member: MemberId,
    pub files: Vec<FileStatus>,
    pub last_sync: Option<DateTime<Utc>>,
    pub pending_operations: usize,
    pub open_conflicts: Vec<ConflictRecord>,
    pub unread_notifications: usize,
}

impl ProjectStatus {
    pub fn is_clean(&self) -> bool {
        self.pending_operations == 0
            && self.open_conflicts.is_empty()
            && self.files.iter().all(|f| f.state == FileState::Current)
    }
}

/// Compute status for `config` using the state stored in `state_dir`.
pub fn project_status(config: &ProjectConfig, state_dir: &Path) -> Result<ProjectStatus, SyncError> {
    let tree = WorkingTree::new(&config.root);
    let store = StateStore::new(state_dir);
    let archive = ConflictArchive::new(state_dir);
    let now = Utc::now();

    let table = store.load_files()?;
    let open_conflicts = archive.open_records()?;
    let mut files = Vec::with_capacity(config.tracked.len());
    for path in &config.tracked {
        let base = table.files.get(path);
        let local = tree.read(path)?;
        let state = match (base, &local) {
            (None, None) => FileState::NeverSynced,
            (None, Some(_)) => FileState::New,
            (Some(_), None) => FileState::Missing,
            (Some(base), Some(local)) if version_token(&local.content) != base.version => {
                FileState::Modified
            }
            (Some(_), Some(_)) => FileState::Current,
        };
        files.push(FileStatus {
            path: path.clone(),
            state,
            base_version: base.map(|b| b.version.clone()),
            last_modified_by: base.and_then(|b| b.modified_by.clone()),
            open_conflict: open_conflicts.iter().any(|c| &c.file_path == path),
        });
    }

    let history = store.load_history()?;
    let unread_notifications = NotificationStore::new(state_dir).unread(now)?.len();
    Ok(ProjectStatus {
        project: config.name.to_string(),
        member: config.member.clone(),
        files,
        last_sync: history.last_sync,
        pending_operations: history.pending_operations.len(),
        open_conflicts,
        unread_notifications,
    })
}

/// Format age from a chrono timestamp (`last_sync`, notification times).
pub fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let age = Utc::now().signed_duration_since(timestamp).num_seconds().max(0) as u64;
    format_seconds(age)
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use teamsync_core::types::{ProjectName, Team};
    use tempfile::TempDir;

    fn config(root: &Path) -> ProjectConfig {
        ProjectConfig {
            name: ProjectName::from("atlas"),
            root: root.to_path_buf(),
            member: MemberId::from("ana"),
            tracked: vec!["a.md".into(), "b.md".into(), "c.md".into(), "d.md".into()],
            team: Team::new("t", "core", "ana"),
            settings: Default::default(),
        }
    }

    #[test]
    fn classifies_each_tracked_file() {
        let root = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        let store = StateStore::new(state.path());
        let mut table = store.load_files().unwrap();
        for path in ["a.md", "b.md", "c.md"] {
            store
                .record_base(&mut table, path, Some("base"), None, Utc::now())
                .unwrap();
        }
        store.save_files(&table).unwrap();
        fs::write(root.path().join("a.md"), "base").unwrap();
        fs::write(root.path().join("b.md"), "edited").unwrap();
        fs::write(root.path().join("d.md"), "fresh").unwrap();

        let status = project_status(&config(root.path()), state.path()).unwrap();
        let states: Vec<_> = status.files.iter().map(|f| f.state).collect();
        assert_eq!(
            states,
            vec![FileState::Current, FileState::Modified, FileState::Missing, FileState::New]
        );
        assert!(!status.is_clean());
        assert_eq!(status.pending_operations, 0);
    }

    #[test]
    fn compact_ages() {
        assert_eq!(format_seconds(5), "5s");
        assert_eq!(format_seconds(65), "1m");
        assert_eq!(format_seconds(7200), "2h");
        assert_eq!(format_seconds(3 * 86400), "3d");
        assert_eq!(format_datetime_age(Utc::now()), "0s");
    }
}
