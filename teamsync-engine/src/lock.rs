//! Advisory per-project sync lock (`state/sync.lock`).
//!
//! Acquired with `create_new`, so a second `sync()` on the same project fails
//! fast with [`SyncError::SyncInProgress`]. The file carries JSON metadata
//! naming the holder and is removed when the guard drops.
//!
//! A lock left behind by a crashed process is reclaimed: the holder's pid no
//! longer exists, or the lock is older than the caller's `max_age`.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use teamsync_core::types::MemberId;

use crate::error::{io_err, SyncError};

pub const LOCK_FILE: &str = "sync.lock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMeta {
    pub pid: u32,
    pub member: MemberId,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SyncLock {
    path: PathBuf,
    meta: LockMeta,
    released: bool,
}

impl SyncLock {
    pub fn acquire(
        state_dir: &Path,
        member: &MemberId,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Result<Self, SyncError> {
        fs::create_dir_all(state_dir).map_err(|e| io_err(state_dir, e))?;
        let path = state_dir.join(LOCK_FILE);
        let mut file = match open_new(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                let Some(reason) = stale_reason(&path, now, max_age) else {
                    let holder = read_meta(&path);
                    tracing::warn!(
                        lock = %path.display(),
                        holder_pid = holder.as_ref().map(|m| m.pid),
                        "sync lock already held",
                    );
                    return Err(SyncError::SyncInProgress { lock: path });
                };
                tracing::warn!(lock = %path.display(), reason = %reason, "reclaiming stale sync lock");
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(err) => return Err(io_err(&path, err)),
                }
                match open_new(&path) {
                    Ok(file) => file,
                    Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                        return Err(SyncError::SyncInProgress { lock: path });
                    }
                    Err(err) => return Err(io_err(&path, err)),
                }
            }
            Err(err) => return Err(io_err(&path, err)),
        };

        let meta = LockMeta {
            pid: std::process::id(),
            member: member.clone(),
            started_at: now,
        };
        let json = serde_json::to_vec_pretty(&meta)?;
        if let Err(err) = file.write_all(&json).and_then(|()| file.sync_all()) {
            let _ = fs::remove_file(&path);
            return Err(io_err(&path, err));
        }
        tracing::debug!(lock = %path.display(), "acquired sync lock");
        Ok(Self {
            path,
            meta,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta(&self) -> &LockMeta {
        &self.meta
    }

    pub fn release(mut self) -> Result<(), SyncError> {
        self.released = true;
        fs::remove_file(&self.path).map_err(|e| io_err(&self.path, e))
    }
}

impl Drop for SyncLock {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Metadata of the current holder, if the lock exists and is readable.
pub fn read_meta(path: &Path) -> Option<LockMeta> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Why an existing lock may be taken over, or `None` while its holder looks
/// alive.
fn stale_reason(path: &Path, now: DateTime<Utc>, max_age: Duration) -> Option<String> {
    match read_meta(path) {
        Some(meta) => {
            if !pid_alive(meta.pid) {
                return Some(format!("holder pid {} is gone", meta.pid));
            }
            let age = (now - meta.started_at).to_std().ok()?;
            (age > max_age).then(|| format!("held by pid {} for {}s", meta.pid, age.as_secs()))
        }
        // Unreadable metadata is normal for a moment while the holder writes
        // it, so only the file age counts.
        None => {
            let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
            let age = SystemTime::now().duration_since(modified).ok()?;
            (age > max_age).then(|| format!("unreadable lock untouched for {}s", age.as_secs()))
        }
    }
}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM))
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}

fn open_new(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MAX_AGE: Duration = Duration::from_secs(240);

    fn write_meta(dir: &Path, meta: &LockMeta) {
        fs::write(dir.join(LOCK_FILE), serde_json::to_vec(meta).unwrap()).unwrap();
    }

    #[test]
    fn second_acquire_fails_fast() {
        let dir = TempDir::new().unwrap();
        let who = MemberId::from("ana");
        let held = SyncLock::acquire(dir.path(), &who, Utc::now(), MAX_AGE).unwrap();
        let err = SyncLock::acquire(dir.path(), &who, Utc::now(), MAX_AGE).unwrap_err();
        assert!(matches!(err, SyncError::SyncInProgress { .. }));
        assert_eq!(read_meta(held.path()).unwrap().member, who);
    }

    #[test]
    fn drop_releases() {
        let dir = TempDir::new().unwrap();
        let who = MemberId::from("ana");
        {
            let _lock = SyncLock::acquire(dir.path(), &who, Utc::now(), MAX_AGE).unwrap();
            assert!(dir.path().join(LOCK_FILE).exists());
        }
        assert!(!dir.path().join(LOCK_FILE).exists());
        SyncLock::acquire(dir.path(), &who, Utc::now(), MAX_AGE)
            .unwrap()
            .release()
            .unwrap();
        assert!(!dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn lock_of_crashed_process_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        write_meta(
            dir.path(),
            &LockMeta {
                pid: 999_999,
                member: MemberId::from("bo"),
                started_at: "2020-01-01T00:00:00Z".parse().unwrap(),
            },
        );
        let who = MemberId::from("ana");
        let lock = SyncLock::acquire(dir.path(), &who, Utc::now(), MAX_AGE).unwrap();
        let meta = read_meta(lock.path()).unwrap();
        assert_eq!(meta.member, who);
        assert_eq!(meta.pid, std::process::id());
    }

    #[test]
    fn live_holder_past_max_age_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        let now = Utc::now();
        let mut meta = LockMeta {
            pid: std::process::id(),
            member: MemberId::from("bo"),
            started_at: now - chrono::Duration::seconds(10),
        };
        write_meta(dir.path(), &meta);
        let who = MemberId::from("ana");
        assert!(matches!(
            SyncLock::acquire(dir.path(), &who, now, MAX_AGE),
            Err(SyncError::SyncInProgress { .. })
        ));

        meta.started_at = now - chrono::Duration::seconds(600);
        write_meta(dir.path(), &meta);
        SyncLock::acquire(dir.path(), &who, now, MAX_AGE).unwrap();
    }

    #[test]
    fn fresh_unreadable_lock_is_respected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(LOCK_FILE), b"").unwrap();
        let err = SyncLock::acquire(dir.path(), &MemberId::from("ana"), Utc::now(), MAX_AGE).unwrap_err();
        assert!(matches!(err, SyncError::SyncInProgress { .. }));
    }
}
