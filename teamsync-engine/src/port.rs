//! Version Control Port: the narrow seam between the engine and a transport.
//!
//! The engine only ever fetches a snapshot of the shared files, commits a set
//! of file changes, and pushes the resulting revision. Any of those may fail
//! with [`SyncError::Network`], which the coordinator routes to the offline
//! queue.
//!
//! [`MemoryPort`] is a deterministic in-memory double. Several ports can share
//! one [`MemoryRemote`] to model team members syncing against the same
//! repository, and each port has its own network switch.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use teamsync_core::types::MemberId;

use crate::error::SyncError;

/// Transport-level revision identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Revision(pub String);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One shared file as it exists on the remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub content: String,
    pub modified_by: Option<MemberId>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// The remote state of every shared file at one revision. Files absent from
/// `files` do not exist remotely.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub revision: Option<Revision>,
    pub files: BTreeMap<String, RemoteFile>,
}

/// Changes to publish. `None` deletes the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub author: MemberId,
    pub message: String,
    pub files: BTreeMap<String, Option<String>>,
}

pub trait VersionControlPort {
    /// Point in time after which a transport call must give up with
    /// [`SyncError::Network`] instead of blocking. `None` clears it.
    fn set_deadline(&mut self, _deadline: Option<Instant>) {}

    /// Cheap reachability check used before replaying the offline queue.
    fn check_connection(&mut self) -> Result<(), SyncError>;

    fn fetch(&mut self) -> Result<Snapshot, SyncError>;

    fn commit(&mut self, commit: &Commit) -> Result<Revision, SyncError>;

    fn push(&mut self, revision: &Revision) -> Result<(), SyncError>;
}

impl<P: VersionControlPort + ?Sized> VersionControlPort for Box<P> {
    fn set_deadline(&mut self, deadline: Option<Instant>) {
        (**self).set_deadline(deadline)
    }

    fn check_connection(&mut self) -> Result<(), SyncError> {
        (**self).check_connection()
    }

    fn fetch(&mut self) -> Result<Snapshot, SyncError> {
        (**self).fetch()
    }

    fn commit(&mut self, commit: &Commit) -> Result<Revision, SyncError> {
        (**self).commit(commit)
    }

    fn push(&mut self, revision: &Revision) -> Result<(), SyncError> {
        (**self).push(revision)
    }
}

// ---------------------------------------------------------------------------
// In-memory double
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RemoteState {
    head: u64,
    files: BTreeMap<String, RemoteFile>,
}

/// Shared in-memory "repository".
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Write a file directly, as another team member's push would.
    pub fn put(&self, path: &str, content: &str, author: &str) {
        let mut state = self.lock();
        state.head += 1;
        state.files.insert(
            path.to_string(),
            RemoteFile {
                content: content.to_string(),
                modified_by: Some(MemberId::from(author)),
                modified_at: Some(Utc::now()),
            },
        );
    }

    pub fn delete(&self, path: &str) {
        let mut state = self.lock();
        state.head += 1;
        state.files.remove(path);
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.lock().files.get(path).map(|f| f.content.clone())
    }

    pub fn head(&self) -> Revision {
        Revision(format!("r{}", self.lock().head))
    }
}

/// Count of port calls, for asserting that a code path never touched the
/// transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortCalls {
    pub check_connection: usize,
    pub fetch: usize,
    pub commit: usize,
    pub push: usize,
}

impl PortCalls {
    pub fn total(&self) -> usize {
        self.check_connection + self.fetch + self.commit + self.push
    }
}

/// One member's connection to a [`MemoryRemote`].
#[derive(Debug)]
pub struct MemoryPort {
    remote: MemoryRemote,
    online: bool,
    fetched_head: Option<u64>,
    staged: BTreeMap<String, Commit>,
    next_local: u64,
    calls: PortCalls,
    fetch_delay: Option<Duration>,
    deadline: Option<Instant>,
}

impl MemoryPort {
    pub fn new(remote: MemoryRemote) -> Self {
        Self {
            remote,
            online: true,
            fetched_head: None,
            staged: BTreeMap::new(),
            next_local: 0,
            calls: PortCalls::default(),
            fetch_delay: None,
            deadline: None,
        }
    }

    pub fn remote(&self) -> &MemoryRemote {
        &self.remote
    }

    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    pub fn calls(&self) -> PortCalls {
        self.calls
    }

    /// Make every fetch take `delay`, like a remote that stops answering.
    /// A deadline set by the caller cuts the wait short.
    pub fn set_fetch_delay(&mut self, delay: Option<Duration>) {
        self.fetch_delay = delay;
    }

    fn wait_for_remote(&self) -> Result<(), SyncError> {
        let Some(delay) = self.fetch_delay else {
            return Ok(());
        };
        let wait = match self.deadline {
            Some(deadline) => delay.min(deadline.saturating_duration_since(Instant::now())),
            None => delay,
        };
        std::thread::sleep(wait);
        if wait < delay {
            return Err(SyncError::network("memory remote did not answer before the deadline"));
        }
        Ok(())
    }

    fn ensure_online(&self) -> Result<(), SyncError> {
        if self.online {
            Ok(())
        } else {
            Err(SyncError::network("memory remote unreachable"))
        }
    }
}

impl VersionControlPort for MemoryPort {
    fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    fn check_connection(&mut self) -> Result<(), SyncError> {
        self.calls.check_connection += 1;
        self.ensure_online()
    }

    fn fetch(&mut self) -> Result<Snapshot, SyncError> {
        self.calls.fetch += 1;
        self.ensure_online()?;
        self.wait_for_remote()?;
        let state = self.remote.lock();
        self.fetched_head = Some(state.head);
        Ok(Snapshot {
            revision: Some(Revision(format!("r{}", state.head))),
            files: state.files.clone(),
        })
    }

    fn commit(&mut self, commit: &Commit) -> Result<Revision, SyncError> {
        self.calls.commit += 1;
        self.next_local += 1;
        let id = format!("local-{}", self.next_local);
        self.staged.insert(id.clone(), commit.clone());
        Ok(Revision(id))
    }

    fn push(&mut self, revision: &Revision) -> Result<(), SyncError> {
        self.calls.push += 1;
        self.ensure_online()?;
        let commit = self
            .staged
            .get(&revision.0)
            .cloned()
            .ok_or_else(|| SyncError::Transport(format!("unknown revision {revision}")))?;
        let mut state = self.remote.lock();
        if self.fetched_head != Some(state.head) {
            return Err(SyncError::Transport(format!(
                "push rejected: remote advanced to r{} since last fetch",
                state.head
            )));
        }
        let now = Utc::now();
        for (path, content) in &commit.files {
            match content {
                Some(content) => {
                    state.files.insert(
                        path.clone(),
                        RemoteFile {
                            content: content.clone(),
                            modified_by: Some(commit.author.clone()),
                            modified_at: Some(now),
                        },
                    );
                }
                None => {
                    state.files.remove(path);
                }
            }
        }
        state.head += 1;
        self.fetched_head = Some(state.head);
        drop(state);
        self.staged.remove(&revision.0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(path: &str, content: Option<&str>) -> Commit {
        let mut files = BTreeMap::new();
        files.insert(path.to_string(), content.map(str::to_string));
        Commit {
            author: MemberId::from("ana"),
            message: "update".into(),
            files,
        }
    }

    #[test]
    fn fetch_commit_push_roundtrip() {
        let remote = MemoryRemote::new();
        let mut port = MemoryPort::new(remote.clone());
        port.fetch().unwrap();
        let rev = port.commit(&commit("a.md", Some("hello"))).unwrap();
        port.push(&rev).unwrap();
        assert_eq!(remote.content("a.md").as_deref(), Some("hello"));

        let snap = port.fetch().unwrap();
        assert_eq!(snap.files["a.md"].modified_by, Some(MemberId::from("ana")));
        assert_eq!(port.calls().push, 1);
    }

    #[test]
    fn offline_port_raises_network_error() {
        let mut port = MemoryPort::new(MemoryRemote::new());
        port.set_online(false);
        assert!(port.fetch().unwrap_err().is_retryable());
        assert!(port.check_connection().unwrap_err().is_retryable());
    }

    #[test]
    fn slow_fetch_gives_up_at_the_deadline() {
        let mut port = MemoryPort::new(MemoryRemote::new());
        port.set_fetch_delay(Some(Duration::from_secs(30)));
        port.set_deadline(Some(Instant::now() + Duration::from_millis(50)));
        let started = Instant::now();
        assert!(port.fetch().unwrap_err().is_retryable());
        assert!(started.elapsed() < Duration::from_secs(5));

        port.set_fetch_delay(Some(Duration::from_millis(1)));
        port.set_deadline(None);
        port.fetch().unwrap();
    }

    #[test]
    fn push_after_remote_moved_is_rejected() {
        let remote = MemoryRemote::new();
        let mut port = MemoryPort::new(remote.clone());
        port.fetch().unwrap();
        remote.put("a.md", "other", "bo");
        let rev = port.commit(&commit("a.md", Some("mine"))).unwrap();
        assert!(matches!(port.push(&rev), Err(SyncError::Transport(_))));
        assert_eq!(remote.content("a.md").as_deref(), Some("other"));
    }
}
