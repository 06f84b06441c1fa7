//! SyncStateStore: durable local record of what was last synced.
//!
//! Layout under the project's state directory:
//!
//! ```text
//! state/
//!   files.json     last-synced SharedFile per logical path
//!   objects/<tok>  base content, content-addressed by version token
//!   history.json   operation history + offline queue (pending_operations)
//! ```
//!
//! Everything here is local-only and single-writer; it is never transported.
//! All writes use the atomic `.tmp` + rename pattern. A corrupt JSON file is
//! reinitialized empty with a warning instead of failing the caller.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use teamsync_core::types::{MemberId, OperationStatus, SharedFile, SyncOperation};

use crate::atomic::{load_json_or_default, save_json, write_atomic};
use crate::error::{io_err, SyncError};
use crate::workspace::version_token;

pub const FILES_FILE: &str = "files.json";
pub const HISTORY_FILE: &str = "history.json";
pub const OBJECTS_DIR: &str = "objects";

/// History keeps at most this many entries (error/conflict entries exempt).
pub const HISTORY_LIMIT: usize = 100;
/// Successful operations older than this are purged.
pub const SUCCESS_RETENTION_DAYS: i64 = 30;

/// On-disk table of last-synced files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTable {
    #[serde(default)]
    pub synced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub files: BTreeMap<String, SharedFile>,
}

/// A sync operation parked in the offline queue, with retry bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    #[serde(flatten)]
    pub operation: SyncOperation,
    #[serde(default)]
    pub retries: u32,
    pub enqueued_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
}

/// On-disk operation history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHistory {
    #[serde(default)]
    pub operations: Vec<SyncOperation>,
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pending_operations: Vec<PendingOperation>,
}

impl OperationHistory {
    /// Insert or replace by operation id, preserving first-seen order.
    pub fn upsert(&mut self, op: SyncOperation) {
        match self.operations.iter_mut().find(|o| o.id == op.id) {
            Some(slot) => *slot = op,
            None => self.operations.push(op),
        }
    }

    pub fn find(&self, id: &teamsync_core::types::OperationId) -> Option<&SyncOperation> {
        self.operations.iter().find(|o| &o.id == id)
    }
}

/// Apply retention: purge successes older than 30 days, then trim to
/// [`HISTORY_LIMIT`] by dropping the oldest entries that are neither `error`
/// nor `conflict`.
pub fn prune_history(ops: &mut Vec<SyncOperation>, now: DateTime<Utc>) {
    let cutoff = now - Duration::days(SUCCESS_RETENTION_DAYS);
    ops.retain(|op| {
        op.status != OperationStatus::Success || op.completed_at.unwrap_or(op.started_at) >= cutoff
    });
    while ops.len() > HISTORY_LIMIT {
        match ops.iter().position(|op| !always_retained(op)) {
            Some(idx) => {
                ops.remove(idx);
            }
            None => break,
        }
    }
}

fn always_retained(op: &SyncOperation) -> bool {
    matches!(op.status, OperationStatus::Error | OperationStatus::Conflict)
}

/// Handle on one project's state directory.
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn files_path(&self) -> PathBuf {
        self.dir.join(FILES_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    fn object_path(&self, token: &str) -> PathBuf {
        self.dir.join(OBJECTS_DIR).join(token)
    }

    // -- files ---------------------------------------------------------------

    pub fn load_files(&self) -> Result<FileTable, SyncError> {
        load_json_or_default(&self.files_path())
    }

    pub fn save_files(&self, table: &FileTable) -> Result<(), SyncError> {
        save_json(&self.files_path(), table)
    }

    /// Base content for a version token, if the object is present.
    pub fn base_content(&self, token: &str) -> Result<Option<String>, SyncError> {
        let path = self.object_path(token);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err(&path, err)),
        }
    }

    /// Store content under its version token. Objects are write-once.
    pub fn store_object(&self, content: &str) -> Result<String, SyncError> {
        let token = version_token(content);
        let path = self.object_path(&token);
        if !path.exists() {
            write_atomic(&path, content.as_bytes())?;
        }
        Ok(token)
    }

    /// Record `content` as the new common base for `path` in `table`
    /// (in memory; the caller saves). `None` forgets the file.
    pub fn record_base(
        &self,
        table: &mut FileTable,
        path: &str,
        content: Option<&str>,
        modified_by: Option<MemberId>,
        modified_at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        match content {
            Some(content) => {
                let version = self.store_object(content)?;
                table.files.insert(
                    path.to_string(),
                    SharedFile {
                        path: path.to_string(),
                        version,
                        modified_by,
                        modified_at,
                        size: content.len() as u64,
                    },
                );
            }
            None => {
                table.files.remove(path);
            }
        }
        Ok(())
    }

    // -- history -------------------------------------------------------------

    pub fn load_history(&self) -> Result<OperationHistory, SyncError> {
        load_json_or_default(&self.history_path())
    }

    /// Prune, then save atomically.
    pub fn save_history(&self, history: &mut OperationHistory) -> Result<(), SyncError> {
        prune_history(&mut history.operations, Utc::now());
        save_json(&self.history_path(), history)
    }

    /// Upsert one operation into the history file.
    pub fn record_operation(&self, op: &SyncOperation) -> Result<(), SyncError> {
        let mut history = self.load_history()?;
        history.upsert(op.clone());
        if op.status == OperationStatus::Success {
            history.last_sync = op.completed_at.or(history.last_sync);
        }
        self.save_history(&mut history)?;
        tracing::debug!(operation = %op.id, status = %op.status, "recorded sync operation");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teamsync_core::types::{OperationKind, OperationStatus};
    use tempfile::TempDir;

    fn op_with(status: OperationStatus, completed: DateTime<Utc>) -> SyncOperation {
        let mut op = SyncOperation::new(MemberId::from("a"), OperationKind::Push, completed);
        op.status = status;
        op.completed_at = Some(completed);
        op
    }

    #[test]
    fn empty_state_when_files_missing() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path());
        assert!(store.load_files().unwrap().files.is_empty());
        assert!(store.load_history().unwrap().operations.is_empty());
    }

    #[test]
    fn record_base_stores_object_and_metadata() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path());
        let mut table = FileTable::default();
        let now = Utc::now();
        store
            .record_base(&mut table, "memory/roadmap.md", Some("v1"), None, now)
            .unwrap();
        store.save_files(&table).unwrap();

        let loaded = store.load_files().unwrap();
        let entry = &loaded.files["memory/roadmap.md"];
        assert_eq!(entry.size, 2);
        assert_eq!(store.base_content(&entry.version).unwrap().as_deref(), Some("v1"));

        store
            .record_base(&mut table, "memory/roadmap.md", None, None, now)
            .unwrap();
        assert!(table.files.is_empty());
    }

    #[test]
    fn corrupt_history_reinitializes_empty() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path());
        std::fs::write(store.history_path(), "{{{").unwrap();
        let history = store.load_history().unwrap();
        assert!(history.operations.is_empty());
    }

    #[test]
    fn record_operation_upserts_and_sets_last_sync() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path());
        let now = Utc::now();
        let mut op = SyncOperation::new(MemberId::from("a"), OperationKind::Pull, now);
        op.transition(OperationStatus::InProgress, now).unwrap();
        store.record_operation(&op).unwrap();
        op.transition(OperationStatus::Success, now).unwrap();
        store.record_operation(&op).unwrap();

        let history = store.load_history().unwrap();
        assert_eq!(history.operations.len(), 1);
        assert_eq!(history.operations[0].status, OperationStatus::Success);
        assert_eq!(history.last_sync, Some(now));
    }

    #[test]
    fn old_successes_purged_but_errors_kept() {
        let now = Utc::now();
        let old = now - Duration::days(45);
        let mut ops = vec![
            op_with(OperationStatus::Success, old),
            op_with(OperationStatus::Error, old),
            op_with(OperationStatus::Conflict, old),
            op_with(OperationStatus::Success, now),
        ];
        prune_history(&mut ops, now);
        let statuses: Vec<_> = ops.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                OperationStatus::Error,
                OperationStatus::Conflict,
                OperationStatus::Success
            ]
        );
    }

    #[test]
    fn history_capped_at_limit_keeping_errors() {
        let now = Utc::now();
        let mut ops = vec![op_with(OperationStatus::Error, now)];
        for _ in 0..HISTORY_LIMIT + 20 {
            ops.push(op_with(OperationStatus::Success, now));
        }
        prune_history(&mut ops, now);
        assert_eq!(ops.len(), HISTORY_LIMIT);
        assert_eq!(ops[0].status, OperationStatus::Error);
    }

    #[test]
    fn pending_operation_flattens_operation_fields() {
        let now = Utc::now();
        let pending = PendingOperation {
            operation: SyncOperation::new(MemberId::from("a"), OperationKind::Push, now),
            retries: 2,
            enqueued_at: now,
            next_attempt_at: now,
            last_error: Some("offline".into()),
        };
        let json = serde_json::to_value(&pending).unwrap();
        assert_eq!(json["operation_type"], "push");
        assert_eq!(json["retries"], 2);
        let back: PendingOperation = serde_json::from_value(json).unwrap();
        assert_eq!(back, pending);
    }
}
