//! Conflict archive: conflict records plus write-once copies of discarded
//! versions.
//!
//! ```text
//! state/conflicts/
//!   <conflict_id>.json            one ConflictRecord per file
//!   archive/
//!     manifest.json               index of every archived (conflict_id, side)
//!     <conflict_id>/local         raw content of the archived local version
//!     <conflict_id>/remote        raw content of the archived remote version
//! ```
//!
//! Archived content is keyed by `(conflict_id, side)`, never rewritten and
//! never deleted by the engine. Recovering one version reads one file; the
//! manifest answers "what is archived" without opening any content.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use teamsync_core::types::{ConflictId, ConflictRecord, ConflictVersion, Side};

use crate::atomic::{load_json_or_default, load_json_strict, save_json, write_atomic};
use crate::error::{io_err, SyncError};

pub const CONFLICTS_DIR: &str = "conflicts";
pub const ARCHIVE_DIR: &str = "archive";
pub const MANIFEST_FILE: &str = "manifest.json";

/// One archived version in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub conflict_id: ConflictId,
    pub side: Side,
    pub file_path: String,
    #[serde(default)]
    pub version: Option<String>,
    pub size: u64,
    pub archived_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub entries: Vec<ManifestEntry>,
}

/// What [`ConflictArchive::archive_version`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveWrite {
    Written,
    /// Already archived earlier; nothing was touched.
    AlreadyArchived,
    /// The side was a deletion; there is no content to keep.
    NothingToArchive,
}

#[derive(Debug, Clone)]
pub struct ConflictArchive {
    root: PathBuf,
}

impl ConflictArchive {
    /// `state_dir` is the project state directory; records live in
    /// `state_dir/conflicts/`.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            root: state_dir.join(CONFLICTS_DIR),
        }
    }

    pub fn record_path(&self, id: &ConflictId) -> PathBuf {
        self.root.join(format!("{}.json", id.0))
    }

    fn archive_dir(&self) -> PathBuf {
        self.root.join(ARCHIVE_DIR)
    }

    pub fn content_path(&self, id: &ConflictId, side: Side) -> PathBuf {
        self.archive_dir().join(&id.0).join(side.as_str())
    }

    fn manifest_path(&self) -> PathBuf {
        self.archive_dir().join(MANIFEST_FILE)
    }

    // -- records -------------------------------------------------------------

    pub fn save_record(&self, record: &ConflictRecord) -> Result<(), SyncError> {
        save_json(&self.record_path(&record.id), record)
    }

    pub fn load_record(&self, id: &ConflictId) -> Result<ConflictRecord, SyncError> {
        load_json_strict(&self.record_path(id))?.ok_or_else(|| SyncError::UnknownConflict(id.clone()))
    }

    /// Every record, oldest first (ties broken by path). Unreadable records
    /// are skipped with a warning.
    pub fn list_records(&self) -> Result<Vec<ConflictRecord>, SyncError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(err) => return Err(io_err(&self.root, err)),
        };
        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.root, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match load_json_strict::<ConflictRecord>(&path) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => tracing::warn!(path = %path.display(), error = %err, "skipping unreadable conflict record"),
            }
        }
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.file_path.cmp(&b.file_path))
        });
        Ok(records)
    }

    pub fn open_records(&self) -> Result<Vec<ConflictRecord>, SyncError> {
        Ok(self
            .list_records()?
            .into_iter()
            .filter(|r| !r.is_resolved())
            .collect())
    }

    /// The open record for `path`, if any.
    pub fn find_open(&self, path: &str) -> Result<Option<ConflictRecord>, SyncError> {
        Ok(self
            .open_records()?
            .into_iter()
            .find(|r| r.file_path == path))
    }

    // -- archived versions ---------------------------------------------------

    /// Write-once copy of one side of a conflict.
    pub fn archive_version(
        &self,
        record: &ConflictRecord,
        side: Side,
        now: DateTime<Utc>,
    ) -> Result<ArchiveWrite, SyncError> {
        let version: &ConflictVersion = record.version(side);
        let Some(content) = version.content.as_deref() else {
            return Ok(ArchiveWrite::NothingToArchive);
        };
        let path = self.content_path(&record.id, side);
        if path.exists() {
            return Ok(ArchiveWrite::AlreadyArchived);
        }
        write_atomic(&path, content.as_bytes())?;

        let mut manifest = self.manifest()?;
        manifest.entries.push(ManifestEntry {
            conflict_id: record.id.clone(),
            side,
            file_path: record.file_path.clone(),
            version: version.version.clone(),
            size: content.len() as u64,
            archived_at: now,
        });
        save_json(&self.manifest_path(), &manifest)?;
        tracing::info!(
            conflict = %record.id,
            side = %side,
            path = %record.file_path,
            "archived discarded version",
        );
        Ok(ArchiveWrite::Written)
    }

    pub fn read_archived(&self, id: &ConflictId, side: Side) -> Result<Option<String>, SyncError> {
        let path = self.content_path(id, side);
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(io_err(&path, err)),
        }
    }

    pub fn manifest(&self) -> Result<Manifest, SyncError> {
        load_json_or_default(&self.manifest_path())
    }
}
