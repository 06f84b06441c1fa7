//! SyncCoordinator: composes the store, detector, resolver, gate, batcher
//! and offline queue into `sync()`.
//!
//! One call runs one [`SyncOperation`] through
//! `pending -> in_progress -> {success, conflict, error}`:
//!
//! 1. take the project sync lock (a second caller fails fast);
//! 2. `push` operations are authorized before any transport call;
//! 3. fetch the remote snapshot and size-check every tracked file;
//! 4. classify each tracked file against its last-synced base;
//! 5. authorize the push if any local change would be published;
//! 6. walk files in path order: adopt fast-forward pulls, collect local
//!    changes, open (or reuse) conflict records and apply the automatic
//!    strategy if one is configured. An open record whose sides have since
//!    agreed is closed here;
//! 7. commit and push collected changes, record new bases, emit
//!    notifications and record the operation.
//!
//! A network failure (including the overall timeout) hands the operation to
//! the offline queue and `sync()` still returns `Ok` with `queued` set. The
//! transport gets the same deadline, so a hung call is cut short. A denied
//! push leaves no trace in local state.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use teamsync_core::config::{AutoStrategy, ProjectConfig};
use teamsync_core::types::{
    ConflictId, ConflictRecord, ConflictVersion, MemberId, Notification, NotificationKind,
    OperationId, OperationKind, OperationStatus, SyncOperation,
};

use crate::access::{AccessGate, Action};
use crate::archive::ConflictArchive;
use crate::batcher::NotificationBatcher;
use crate::detector::{classify_all, Outcome};
use crate::error::SyncError;
use crate::lock::SyncLock;
use crate::offline_queue::{DrainReport, OfflineQueue};
use crate::port::{Commit, VersionControlPort};
use crate::resolver::{ConflictResolver, ResolvedFile, Strategy};
use crate::state_store::{FileTable, StateStore};
use crate::status::{project_status, ProjectStatus};
use crate::workspace::{check_size, version_token, WorkingTree};

/// What one `sync()` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub operation: SyncOperation,
    /// Files adopted from the remote.
    pub pulled: Vec<String>,
    /// Files published through the port.
    pub pushed: Vec<String>,
    /// Conflict records opened, refreshed or reused by this run, including
    /// any the automatic strategy resolved.
    pub conflicts: Vec<ConflictRecord>,
    /// Paths still waiting for a resolution.
    pub unresolved: Vec<String>,
    /// Previously open conflicts closed because both sides now agree.
    pub settled: Vec<ConflictRecord>,
    /// The transport was unreachable; the operation is in the offline queue.
    pub queued: bool,
}

impl SyncReport {
    fn queued(operation: SyncOperation) -> Self {
        Self {
            operation,
            pulled: Vec::new(),
            pushed: Vec::new(),
            conflicts: Vec::new(),
            unresolved: Vec::new(),
            settled: Vec::new(),
            queued: true,
        }
    }

    /// `ConflictUnresolved` when conflicts remain open.
    pub fn ensure_resolved(&self) -> Result<(), SyncError> {
        if self.unresolved.is_empty() {
            Ok(())
        } else {
            Err(SyncError::ConflictUnresolved {
                operation: self.operation.id.clone(),
                files: self.unresolved.clone(),
            })
        }
    }
}

/// Result of [`SyncCoordinator::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveOutcome {
    pub file: ResolvedFile,
    /// Operations that moved `conflict -> resolved -> success`.
    pub completed_operations: Vec<OperationId>,
    /// The conflict had already been resolved; nothing changed.
    pub already_resolved: bool,
}

/// Shared flag checked at every file checkpoint.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear an earlier interrupt. Neither `sync` nor the queue drain do
    /// this themselves, so one Ctrl-C stops every step of a command.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    fn new(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    fn expires_at(&self) -> Option<Instant> {
        self.started.checked_add(self.limit)
    }

    fn check(&self, stage: &str) -> Result<(), SyncError> {
        if self.started.elapsed() > self.limit {
            return Err(SyncError::network(format!(
                "sync timed out after {}s during {stage}",
                self.limit.as_secs()
            )));
        }
        Ok(())
    }
}

pub struct SyncCoordinator<P> {
    config: ProjectConfig,
    state_dir: PathBuf,
    port: P,
    tree: WorkingTree,
    store: StateStore,
    resolver: ConflictResolver,
    queue: OfflineQueue,
    batcher: Arc<NotificationBatcher>,
    cancel: CancelHandle,
    on_file: Option<Box<dyn FnMut(&str) + Send>>,
}

impl<P: VersionControlPort> SyncCoordinator<P> {
    pub fn new(
        config: ProjectConfig,
        state_dir: impl Into<PathBuf>,
        port: P,
        batcher: Arc<NotificationBatcher>,
    ) -> Self {
        let state_dir = state_dir.into();
        let store = StateStore::new(&state_dir);
        Self {
            tree: WorkingTree::new(&config.root),
            resolver: ConflictResolver::new(ConflictArchive::new(&state_dir)),
            queue: OfflineQueue::new(store.clone()),
            store,
            config,
            state_dir,
            port,
            batcher,
            cancel: CancelHandle::default(),
            on_file: None,
        }
    }

    /// Called with each path at its file checkpoint, before the interrupt
    /// check.
    pub fn on_file(&mut self, callback: impl FnMut(&str) + Send + 'static) {
        self.on_file = Some(Box::new(callback));
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn batcher(&self) -> &Arc<NotificationBatcher> {
        &self.batcher
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn archive(&self) -> &ConflictArchive {
        self.resolver.archive()
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// Handle for interrupting a running sync from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.settings.sync_timeout_secs)
    }

    /// Age after which a lock whose holder still looks alive is stale.
    fn lock_max_age(&self) -> Duration {
        self.timeout().saturating_mul(2).max(Duration::from_secs(60))
    }

    // -- sync ----------------------------------------------------------------

    pub fn sync(&mut self, kind: OperationKind) -> Result<SyncReport, SyncError> {
        let now = Utc::now();
        let member = self.config.member.clone();
        if kind == OperationKind::Push {
            AccessGate::new(&self.config.team).require(&member, Action::Push)?;
        }
        let _lock = SyncLock::acquire(&self.state_dir, &member, now, self.lock_max_age())?;

        let mut op = SyncOperation::new(member, kind, now);
        tracing::info!(
            operation = %op.id,
            kind = %kind,
            project = %self.config.name,
            "sync started",
        );
        match self.execute(&mut op) {
            Ok(report) => Ok(report),
            Err(err) if err.is_retryable() => {
                let now = Utc::now();
                op.transition(OperationStatus::Pending, now)?;
                self.queue.enqueue(op.clone(), &err.to_string(), now)?;
                tracing::warn!(operation = %op.id, error = %err, "transport unreachable; operation queued");
                Ok(SyncReport::queued(op))
            }
            Err(err @ SyncError::PermissionDenied { .. }) => Err(err),
            Err(err) => {
                self.record_failure(&mut op, &err);
                Err(err)
            }
        }
    }

    /// Mark `op` as `error` in history. Secondary failures are logged, the
    /// original error is what the caller sees.
    fn record_failure(&self, op: &mut SyncOperation, err: &SyncError) {
        if !op.status.can_transition_to(OperationStatus::Error) {
            tracing::error!(operation = %op.id, status = %op.status, error = %err, "sync failed after completion");
            return;
        }
        let outcome = op
            .fail(err.to_string(), Utc::now())
            .map_err(SyncError::from)
            .and_then(|()| self.store.record_operation(&*op));
        match outcome {
            Ok(()) => tracing::warn!(operation = %op.id, error = %err, "sync failed"),
            Err(secondary) => tracing::error!(
                operation = %op.id,
                error = %err,
                secondary = %secondary,
                "sync failed and could not be recorded",
            ),
        }
    }

    fn interrupted(&self) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            tracing::warn!("sync interrupted at checkpoint");
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    fn checkpoint(&mut self, deadline: &Deadline, path: &str) -> Result<(), SyncError> {
        if let Some(on_file) = self.on_file.as_mut() {
            on_file(path);
        }
        self.interrupted()?;
        deadline.check("file checkpoint")
    }

    /// Run one operation from `pending`. Used for fresh syncs and replays.
    /// The transport shares the operation's deadline.
    fn execute(&mut self, op: &mut SyncOperation) -> Result<SyncReport, SyncError> {
        let deadline = Deadline::new(self.timeout());
        self.port.set_deadline(deadline.expires_at());
        let result = self.run_operation(op, &deadline);
        self.port.set_deadline(None);
        result
    }

    fn run_operation(&mut self, op: &mut SyncOperation, deadline: &Deadline) -> Result<SyncReport, SyncError> {
        op.transition(OperationStatus::InProgress, Utc::now())?;
        let member = op.member_id.clone();
        let kind = op.operation_type;

        if kind == OperationKind::Push {
            AccessGate::new(&self.config.team).require(&member, Action::Push)?;
        }
        self.interrupted()?;

        let snapshot = self.port.fetch()?;
        deadline.check("fetch")?;

        let mut table = self.store.load_files()?;
        let mut base = BTreeMap::new();
        let mut local = BTreeMap::new();
        let mut local_mtime = BTreeMap::new();
        let mut remote = BTreeMap::new();
        for path in &self.config.tracked {
            if let Some(entry) = table.files.get(path) {
                match self.store.base_content(&entry.version)? {
                    Some(content) => {
                        base.insert(path.clone(), content);
                    }
                    None => tracing::warn!(path = %path, "base object missing; comparing without a base"),
                }
            }
            if let Some(file) = self.tree.read(path)? {
                local_mtime.insert(path.clone(), file.modified_at);
                local.insert(path.clone(), file.content);
            }
            if let Some(file) = snapshot.files.get(path) {
                check_size(path, file.content.len() as u64)?;
                remote.insert(path.clone(), file.content.clone());
            }
        }

        let plan = classify_all(&base, &local, &remote);
        let auto = self.config.settings.conflict_strategy;
        let publishes = kind.pushes()
            && plan.iter().any(|(_, outcome)| match outcome {
                Outcome::FastForwardLocal => true,
                o if o.is_conflict() => auto == Some(AutoStrategy::KeepLocal),
                _ => false,
            });
        if publishes {
            AccessGate::new(&self.config.team).require(&member, Action::Push)?;
        }

        let mut pulled = Vec::new();
        let mut outgoing: BTreeMap<String, Option<String>> = BTreeMap::new();
        let mut conflicts = Vec::new();
        let mut unresolved = Vec::new();
        let mut settled = Vec::new();
        let mut open: BTreeMap<String, ConflictRecord> = self
            .resolver
            .archive()
            .open_records()?
            .into_iter()
            .map(|r| (r.file_path.clone(), r))
            .collect();

        for (path, outcome) in plan {
            self.checkpoint(deadline, &path)?;
            let now = Utc::now();
            let local_content = local.get(&path).map(String::as_str);
            let remote_content = remote.get(&path).map(String::as_str);
            let remote_file = snapshot.files.get(&path);
            let remote_by = remote_file.and_then(|f| f.modified_by.clone());
            let remote_at = remote_file.and_then(|f| f.modified_at);

            match outcome {
                Outcome::Unchanged => {
                    self.settle_if_open(&mut open, &path, local_content, &member, now, &mut settled)?;
                    let agreed = remote_content.map(version_token);
                    let recorded = table.files.get(&path).map(|f| f.version.clone());
                    if agreed != recorded {
                        self.store.record_base(
                            &mut table,
                            &path,
                            remote_content,
                            remote_by,
                            remote_at.unwrap_or(now),
                        )?;
                        self.store.save_files(&table)?;
                    }
                }
                Outcome::FastForwardPull => {
                    self.tree.apply(&path, remote_content)?;
                    self.store.record_base(
                        &mut table,
                        &path,
                        remote_content,
                        remote_by,
                        remote_at.unwrap_or(now),
                    )?;
                    self.store.save_files(&table)?;
                    tracing::info!(path = %path, deleted = remote_content.is_none(), "adopted remote change");
                    self.settle_if_open(&mut open, &path, remote_content, &member, now, &mut settled)?;
                    pulled.push(path);
                }
                Outcome::FastForwardLocal => {
                    self.settle_if_open(&mut open, &path, local_content, &member, now, &mut settled)?;
                    if kind.pushes() {
                        outgoing.insert(path, local_content.map(str::to_string));
                    } else {
                        tracing::debug!(path = %path, "pull leaves local change unpublished");
                    }
                }
                Outcome::Conflicting | Outcome::DeleteModifyConflict { .. } => {
                    let local_version = ConflictVersion {
                        content: local_content.map(str::to_string),
                        modified_by: Some(member.clone()),
                        modified_at: local_mtime.get(&path).copied(),
                        version: local_content.map(version_token),
                    };
                    let remote_version = ConflictVersion {
                        content: remote_content.map(str::to_string),
                        modified_by: remote_by,
                        modified_at: remote_at,
                        version: remote_content.map(version_token),
                    };
                    let (mut record, fresh) =
                        self.open_conflict(&op.id, &path, local_version, remote_version, now)?;
                    if fresh {
                        self.batcher.enqueue(conflict_notification(&record, now));
                    }

                    match auto {
                        Some(auto) => {
                            let strategy = Strategy::from_request(auto.into(), None)?;
                            let resolved = self.resolver.resolve(&mut record, strategy, &member, now)?;
                            self.adopt_resolution(&resolved, &record, &mut table, now)?;
                            if kind.pushes() && resolved.content.as_deref() != remote_content {
                                outgoing.insert(path.clone(), resolved.content.clone());
                            }
                        }
                        None => unresolved.push(path.clone()),
                    }
                    conflicts.push(record);
                }
            }
        }

        let mut pushed = Vec::new();
        if !outgoing.is_empty() {
            self.interrupted()?;
            deadline.check("publish")?;
            let commit = Commit {
                author: member.clone(),
                message: commit_message(&member, &outgoing),
                files: outgoing.clone(),
            };
            let revision = self.port.commit(&commit)?;
            deadline.check("commit")?;
            self.port.push(&revision)?;
            let now = Utc::now();
            for (path, content) in &outgoing {
                self.store
                    .record_base(&mut table, path, content.as_deref(), Some(member.clone()), now)?;
            }
            pushed = outgoing.into_keys().collect();
            tracing::info!(revision = %revision, files = pushed.len(), "published local changes");
        }

        let now = Utc::now();
        table.synced_at = Some(now);
        self.store.save_files(&table)?;
        if !settled.is_empty() {
            self.complete_resolved_operations(now)?;
        }

        for path in &pulled {
            let source = snapshot.files.get(path).and_then(|f| f.modified_by.clone());
            self.batcher.enqueue(change_notification(path, source, false, now));
        }
        for path in &pushed {
            self.batcher
                .enqueue(change_notification(path, Some(member.clone()), true, now));
        }

        let affected: BTreeSet<String> = pulled
            .iter()
            .chain(pushed.iter())
            .cloned()
            .chain(conflicts.iter().map(|c| c.file_path.clone()))
            .collect();
        op.files_affected = affected.into_iter().collect();
        op.conflict_id = conflicts
            .iter()
            .find(|c| !c.is_resolved())
            .or_else(|| conflicts.first())
            .map(|c| c.id.clone());
        let next = if unresolved.is_empty() {
            OperationStatus::Success
        } else {
            OperationStatus::Conflict
        };
        op.transition(next, now)?;
        self.store.record_operation(op)?;
        tracing::info!(
            operation = %op.id,
            status = %op.status,
            pulled = pulled.len(),
            pushed = pushed.len(),
            conflicts = conflicts.len(),
            unresolved = unresolved.len(),
            settled = settled.len(),
            "sync finished",
        );

        Ok(SyncReport {
            operation: op.clone(),
            pulled,
            pushed,
            conflicts,
            unresolved,
            settled,
            queued: false,
        })
    }

    /// Close the open record for `path`, if any, now that its sides agree on
    /// `agreed`.
    fn settle_if_open(
        &self,
        open: &mut BTreeMap<String, ConflictRecord>,
        path: &str,
        agreed: Option<&str>,
        member: &MemberId,
        now: DateTime<Utc>,
        settled: &mut Vec<ConflictRecord>,
    ) -> Result<(), SyncError> {
        if let Some(mut record) = open.remove(path) {
            self.resolver.settle_agreed(&mut record, agreed, member, now)?;
            settled.push(record);
        }
        Ok(())
    }

    /// Reuse the open record for `path` when both versions are unchanged,
    /// refresh it when they moved, or open a new one. The flag is `true`
    /// when the record is new or its versions changed.
    fn open_conflict(
        &self,
        operation: &OperationId,
        path: &str,
        local: ConflictVersion,
        remote: ConflictVersion,
        now: DateTime<Utc>,
    ) -> Result<(ConflictRecord, bool), SyncError> {
        let archive = self.resolver.archive();
        if let Some(mut existing) = archive.find_open(path)? {
            if existing.local_version.version == local.version
                && existing.remote_version.version == remote.version
            {
                tracing::debug!(conflict = %existing.id, path, "conflict still open; reusing record");
                return Ok((existing, false));
            }
            existing.local_version = local;
            existing.remote_version = remote;
            archive.save_record(&existing)?;
            tracing::info!(conflict = %existing.id, path, "open conflict refreshed with new versions");
            return Ok((existing, true));
        }
        let record = ConflictRecord::open(operation.clone(), path, local, remote, now);
        archive.save_record(&record)?;
        tracing::warn!(
            conflict = %record.id,
            path,
            delete_modify = record.is_delete_modify(),
            "conflict detected",
        );
        Ok((record, true))
    }

    /// Write the resolved content and make the remote version the new base,
    /// so a differing resolution is published as a fast-forward.
    fn adopt_resolution(
        &self,
        resolved: &ResolvedFile,
        record: &ConflictRecord,
        table: &mut FileTable,
        now: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        self.tree.apply(&resolved.path, resolved.content.as_deref())?;
        let remote = &record.remote_version;
        self.store.record_base(
            table,
            &resolved.path,
            remote.content.as_deref(),
            remote.modified_by.clone(),
            remote.modified_at.unwrap_or(now),
        )?;
        self.store.save_files(table)
    }

    // -- resolution ----------------------------------------------------------

    /// Settle one open conflict with `strategy`, apply it to the working tree
    /// and complete every operation that no longer has open conflicts.
    pub fn resolve(&mut self, conflict_id: &ConflictId, strategy: Strategy) -> Result<ResolveOutcome, SyncError> {
        let member = self.config.member.clone();
        if strategy != Strategy::KeepRemote {
            AccessGate::new(&self.config.team).require(&member, Action::ModifySharedFile)?;
        }
        let now = Utc::now();
        let _lock = SyncLock::acquire(&self.state_dir, &member, now, self.lock_max_age())?;

        let mut record = self.resolver.archive().load_record(conflict_id)?;
        let already_resolved = record.is_resolved();
        if !already_resolved {
            let current = self
                .tree
                .read(&record.file_path)?
                .map(|file| version_token(&file.content));
            if current != record.local_version.version {
                tracing::warn!(
                    conflict = %record.id,
                    path = %record.file_path,
                    "working copy changed after the conflict was recorded; refusing to resolve",
                );
                return Err(SyncError::StaleConflict {
                    conflict: record.id.clone(),
                    path: record.file_path.clone(),
                });
            }
        }
        let file = self.resolver.resolve(&mut record, strategy, &member, now)?;
        if already_resolved {
            return Ok(ResolveOutcome {
                file,
                completed_operations: Vec::new(),
                already_resolved,
            });
        }

        let mut table = self.store.load_files()?;
        self.adopt_resolution(&file, &record, &mut table, now)?;
        let completed_operations = self.complete_resolved_operations(now)?;
        Ok(ResolveOutcome {
            file,
            completed_operations,
            already_resolved,
        })
    }

    fn complete_resolved_operations(&self, now: DateTime<Utc>) -> Result<Vec<OperationId>, SyncError> {
        let open = self.resolver.archive().open_records()?;
        let mut history = self.store.load_history()?;
        let mut completed = Vec::new();
        for op in history
            .operations
            .iter_mut()
            .filter(|op| op.status == OperationStatus::Conflict)
        {
            let blocked = open
                .iter()
                .any(|r| r.sync_operation_id == op.id || op.conflict_id.as_ref() == Some(&r.id));
            if blocked {
                continue;
            }
            op.transition(OperationStatus::Resolved, now)?;
            op.transition(OperationStatus::Success, now)?;
            tracing::info!(operation = %op.id, "all conflicts resolved; operation complete");
            completed.push(op.id.clone());
        }
        if !completed.is_empty() {
            history.last_sync = Some(now);
            self.store.save_history(&mut history)?;
        }
        Ok(completed)
    }

    // -- offline queue -------------------------------------------------------

    /// Replay queued operations if the transport answers a connectivity
    /// check.
    pub fn drain_offline_queue(&mut self) -> Result<DrainReport, SyncError> {
        if self.queue.is_empty()? {
            return Ok(DrainReport::default());
        }
        let now = Utc::now();
        let _lock = SyncLock::acquire(&self.state_dir, &self.config.member, now, self.lock_max_age())?;
        self.interrupted()?;

        self.port.set_deadline(Deadline::new(self.timeout()).expires_at());
        let reachable = self.port.check_connection();
        self.port.set_deadline(None);
        if let Err(err) = reachable {
            if err.is_retryable() {
                tracing::info!(error = %err, "still offline; queue left untouched");
                return Ok(DrainReport {
                    offline: true,
                    remaining: self.queue.len()?,
                    ..DrainReport::default()
                });
            }
            return Err(err);
        }

        let queue = self.queue.clone();
        queue.drain(now, |queued| {
            let mut op = queued.clone();
            self.execute(&mut op).map(|report| report.operation)
        })
    }

    // -- status --------------------------------------------------------------

    pub fn status(&self) -> Result<ProjectStatus, SyncError> {
        project_status(&self.config, &self.state_dir)
    }
}

fn commit_message(member: &MemberId, files: &BTreeMap<String, Option<String>>) -> String {
    let paths: Vec<&str> = files.keys().map(String::as_str).collect();
    format!("teamsync: {member} updated {}", paths.join(", "))
}

fn change_notification(
    path: &str,
    source: Option<MemberId>,
    published: bool,
    now: DateTime<Utc>,
) -> Notification {
    let who = source
        .as_ref()
        .map(|m| m.to_string())
        .unwrap_or_else(|| "a teammate".to_string());
    let (title, content) = if published {
        (format!("{path} published"), format!("{who} published changes to {path}"))
    } else {
        (format!("{path} updated"), format!("{who} changed {path}"))
    };
    Notification::new(
        NotificationKind::MemoryChanged,
        title,
        content,
        source,
        vec![path.to_string()],
        now,
    )
}

fn conflict_notification(record: &ConflictRecord, now: DateTime<Utc>) -> Notification {
    let content = if record.is_delete_modify() {
        format!("{} was deleted on one side and edited on the other", record.file_path)
    } else {
        format!("{} was edited locally and remotely", record.file_path)
    };
    Notification::new(
        NotificationKind::ConflictDetected,
        format!("Conflict in {}", record.file_path),
        content,
        record.remote_version.modified_by.clone(),
        vec![record.file_path.clone()],
        now,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared_between_clones() {
        let handle = CancelHandle::default();
        let other = handle.clone();
        assert!(!other.is_cancelled());
        handle.cancel();
        assert!(other.is_cancelled());
        other.reset();
        assert!(!handle.is_cancelled());
    }

    #[test]
    fn expired_deadline_is_a_retryable_network_error() {
        let deadline = Deadline::new(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        let err = deadline.check("fetch").unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("during fetch"));
    }

    #[test]
    fn generous_deadline_passes() {
        let deadline = Deadline::new(Duration::from_secs(60));
        assert!(deadline.check("commit").is_ok());
    }
}
