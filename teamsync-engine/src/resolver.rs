//! ConflictResolver: settles one conflict and archives what was discarded.
//!
//! | strategy       | new content        | archived        |
//! |----------------|--------------------|-----------------|
//! | `KeepLocal`    | local              | remote          |
//! | `KeepRemote`   | remote             | local           |
//! | `ManualMerge`  | caller-supplied    | local + remote  |
//!
//! Resolving is idempotent: a record that already carries a resolution is
//! returned as-is, with no archive writes.

use chrono::{DateTime, Utc};

use teamsync_core::types::{ConflictRecord, MemberId, Resolution, Side};

use crate::archive::ConflictArchive;
use crate::error::SyncError;
use crate::workspace::{check_size, version_token};

/// A resolution choice. Manual merges always carry their content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    KeepLocal,
    KeepRemote,
    ManualMerge(String),
}

impl Strategy {
    /// Validate a raw request from a resolution UI.
    pub fn from_request(resolution: Resolution, content: Option<String>) -> Result<Self, SyncError> {
        match (resolution, content) {
            (Resolution::KeepLocal, _) => Ok(Strategy::KeepLocal),
            (Resolution::KeepRemote, _) => Ok(Strategy::KeepRemote),
            (Resolution::ManualMerge, Some(content)) => Ok(Strategy::ManualMerge(content)),
            (Resolution::ManualMerge, None) => Err(SyncError::Validation(
                "manual_merge requires merged content".to_string(),
            )),
        }
    }

    pub fn resolution(&self) -> Resolution {
        match self {
            Strategy::KeepLocal => Resolution::KeepLocal,
            Strategy::KeepRemote => Resolution::KeepRemote,
            Strategy::ManualMerge(_) => Resolution::ManualMerge,
        }
    }

    fn discarded_sides(&self) -> &'static [Side] {
        match self {
            Strategy::KeepLocal => &[Side::Remote],
            Strategy::KeepRemote => &[Side::Local],
            Strategy::ManualMerge(_) => &[Side::Local, Side::Remote],
        }
    }
}

/// Outcome of a resolution: what the file should now contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFile {
    pub path: String,
    /// `None` when the resolution keeps a deletion.
    pub content: Option<String>,
    pub version: Option<String>,
    pub resolution: Resolution,
}

impl ResolvedFile {
    /// Rebuild the result from an already-resolved record.
    fn from_record(record: &ConflictRecord) -> Option<Self> {
        let resolution = record.resolution?;
        let content = match resolution {
            Resolution::KeepLocal => record.local_version.content.clone(),
            Resolution::KeepRemote => record.remote_version.content.clone(),
            Resolution::ManualMerge => record.merged_content.clone(),
        };
        Some(Self {
            path: record.file_path.clone(),
            version: content.as_deref().map(version_token),
            content,
            resolution,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ConflictResolver {
    archive: ConflictArchive,
}

impl ConflictResolver {
    pub fn new(archive: ConflictArchive) -> Self {
        Self { archive }
    }

    pub fn archive(&self) -> &ConflictArchive {
        &self.archive
    }

    /// Apply `strategy` to `record`, archive the discarded side(s), flip the
    /// record to resolved and persist it.
    ///
    /// Validation (size of merged content) happens before anything is
    /// written. The in-memory `record` is only updated once the record file
    /// has been saved.
    pub fn resolve(
        &self,
        record: &mut ConflictRecord,
        strategy: Strategy,
        resolved_by: &MemberId,
        now: DateTime<Utc>,
    ) -> Result<ResolvedFile, SyncError> {
        if let Some(prior) = ResolvedFile::from_record(record) {
            tracing::debug!(conflict = %record.id, "conflict already resolved; returning prior result");
            return Ok(prior);
        }
        if let Strategy::ManualMerge(content) = &strategy {
            check_size(&record.file_path, content.len() as u64)?;
        }

        let resolution = strategy.resolution();
        let discarded = strategy.discarded_sides();
        let merged = match strategy {
            Strategy::ManualMerge(content) => Some(content),
            _ => None,
        };
        self.close(record, resolution, merged, discarded, resolved_by, now)?;

        tracing::info!(
            conflict = %record.id,
            path = %record.file_path,
            resolution = ?record.resolution,
            by = %resolved_by,
            "conflict resolved",
        );
        ResolvedFile::from_record(record)
            .ok_or_else(|| SyncError::Validation("resolution not recorded".to_string()))
    }

    /// Close a record whose two sides came to agree on `agreed` without the
    /// resolver, e.g. a member edited the file by hand to match. The
    /// recorded side(s) that differ from the agreed content are archived.
    pub fn settle_agreed(
        &self,
        record: &mut ConflictRecord,
        agreed: Option<&str>,
        settled_by: &MemberId,
        now: DateTime<Utc>,
    ) -> Result<Resolution, SyncError> {
        if let Some(prior) = record.resolution {
            return Ok(prior);
        }
        let token = agreed.map(version_token);
        let (resolution, discarded): (Resolution, &[Side]) = if record.local_version.version == token {
            (Resolution::KeepLocal, &[Side::Remote])
        } else if record.remote_version.version == token {
            (Resolution::KeepRemote, &[Side::Local])
        } else {
            (Resolution::ManualMerge, &[Side::Local, Side::Remote])
        };
        let merged = match resolution {
            Resolution::ManualMerge => agreed.map(str::to_string),
            _ => None,
        };
        self.close(record, resolution, merged, discarded, settled_by, now)?;
        tracing::info!(
            conflict = %record.id,
            path = %record.file_path,
            resolution = ?resolution,
            "conflict settled outside the resolver",
        );
        Ok(resolution)
    }

    /// Archive `discarded`, then persist the record as resolved. `record`
    /// only changes once the record file is saved.
    fn close(
        &self,
        record: &mut ConflictRecord,
        resolution: Resolution,
        merged: Option<String>,
        discarded: &[Side],
        by: &MemberId,
        now: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        for side in discarded {
            self.archive.archive_version(record, *side, now)?;
        }
        let mut updated = record.clone();
        updated.resolution = Some(resolution);
        updated.resolved_by = Some(by.clone());
        updated.resolved_at = Some(now);
        updated.merged_content = merged;
        self.archive.save_record(&updated)?;
        *record = updated;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teamsync_core::types::{ConflictVersion, OperationId};
    use tempfile::TempDir;

    fn record() -> ConflictRecord {
        let v = |c: &str| ConflictVersion {
            content: Some(c.to_string()),
            modified_by: None,
            modified_at: None,
            version: Some(version_token(c)),
        };
        ConflictRecord::open(OperationId::from("op"), "memory/roadmap.md", v("mine"), v("theirs"), Utc::now())
    }

    fn resolver(dir: &TempDir) -> ConflictResolver {
        ConflictResolver::new(ConflictArchive::new(dir.path()))
    }

    #[test]
    fn manual_merge_without_content_is_rejected() {
        let err = Strategy::from_request(Resolution::ManualMerge, None).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
    }

    #[test]
    fn keep_local_archives_remote() {
        let dir = TempDir::new().unwrap();
        let r = resolver(&dir);
        let mut rec = record();
        r.archive().save_record(&rec).unwrap();
        let who = MemberId::from("ana");
        let resolved = r.resolve(&mut rec, Strategy::KeepLocal, &who, Utc::now()).unwrap();

        assert_eq!(resolved.content.as_deref(), Some("mine"));
        assert_eq!(rec.resolution, Some(Resolution::KeepLocal));
        assert_eq!(rec.resolved_by, Some(who));
        assert_eq!(
            r.archive().read_archived(&rec.id, Side::Remote).unwrap().as_deref(),
            Some("theirs")
        );
        assert_eq!(r.archive().read_archived(&rec.id, Side::Local).unwrap(), None);
        assert!(r.archive().load_record(&rec.id).unwrap().is_resolved());
    }

    #[test]
    fn manual_merge_archives_both_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let r = resolver(&dir);
        let mut rec = record();
        let who = MemberId::from("ana");
        let first = r
            .resolve(&mut rec, Strategy::ManualMerge("both".into()), &who, Utc::now())
            .unwrap();
        assert_eq!(r.archive().manifest().unwrap().entries.len(), 2);

        let second = r.resolve(&mut rec, Strategy::KeepRemote, &who, Utc::now()).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.content.as_deref(), Some("both"));
        assert_eq!(r.archive().manifest().unwrap().entries.len(), 2);
    }

    #[test]
    fn keep_remote_deletion_yields_no_content() {
        let dir = TempDir::new().unwrap();
        let r = resolver(&dir);
        let mut rec = record();
        rec.remote_version.content = None;
        rec.remote_version.version = None;
        let resolved = r
            .resolve(&mut rec, Strategy::KeepRemote, &MemberId::from("a"), Utc::now())
            .unwrap();
        assert_eq!(resolved.content, None);
        assert_eq!(
            r.archive().read_archived(&rec.id, Side::Local).unwrap().as_deref(),
            Some("mine")
        );
    }

    #[test]
    fn hand_merged_file_settles_and_archives_both_sides() {
        let dir = TempDir::new().unwrap();
        let r = resolver(&dir);
        let mut rec = record();
        let who = MemberId::from("bo");
        let resolution = r.settle_agreed(&mut rec, Some("mine and theirs"), &who, Utc::now()).unwrap();

        assert_eq!(resolution, Resolution::ManualMerge);
        assert_eq!(rec.merged_content.as_deref(), Some("mine and theirs"));
        assert_eq!(r.archive().manifest().unwrap().entries.len(), 2);
        assert!(r.archive().load_record(&rec.id).unwrap().is_resolved());
    }

    #[test]
    fn agreeing_with_remote_settles_as_keep_remote() {
        let dir = TempDir::new().unwrap();
        let r = resolver(&dir);
        let mut rec = record();
        let resolution = r
            .settle_agreed(&mut rec, Some("theirs"), &MemberId::from("bo"), Utc::now())
            .unwrap();
        assert_eq!(resolution, Resolution::KeepRemote);
        assert_eq!(
            r.archive().read_archived(&rec.id, Side::Local).unwrap().as_deref(),
            Some("mine")
        );
        assert_eq!(r.archive().read_archived(&rec.id, Side::Remote).unwrap(), None);
    }
}
