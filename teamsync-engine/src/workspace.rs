//! The local working tree that holds the shared memory files.
//!
//! Reads and writes are keyed by logical path (relative, `/`-separated).
//! Writes go through [`crate::atomic::write_atomic`], and size limits are
//! enforced before any byte reaches disk.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use teamsync_core::config::is_clean_relative;

use crate::atomic::write_atomic;
use crate::error::{io_err, SyncError};

/// Above this a file is accepted with a warning (1 MiB).
pub const SOFT_SIZE_LIMIT: u64 = 1024 * 1024;
/// Above this a file is rejected outright (10 MiB).
pub const HARD_SIZE_LIMIT: u64 = 10 * 1024 * 1024;

/// Version token for text content: SHA-256 hex of the LF-normalised bytes.
pub fn version_token(content: &str) -> String {
    let normalized = content.replace("\r\n", "\n");
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// `Ok` under the hard cap (warning above the soft cap), `SizeLimitExceeded`
/// otherwise.
pub fn check_size(path: &str, size: u64) -> Result<(), SyncError> {
    if size > HARD_SIZE_LIMIT {
        return Err(SyncError::SizeLimitExceeded {
            path: path.to_string(),
            size,
            limit: HARD_SIZE_LIMIT,
        });
    }
    if size > SOFT_SIZE_LIMIT {
        tracing::warn!(path, size, limit = SOFT_SIZE_LIMIT, "shared file is unusually large");
    }
    Ok(())
}

/// One file as currently present in the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub content: String,
    pub modified_at: DateTime<Utc>,
}

/// Root directory of the shared files.
#[derive(Debug, Clone)]
pub struct WorkingTree {
    root: PathBuf,
}

impl WorkingTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a logical path, rejecting anything that could escape
    /// the root.
    pub fn resolve(&self, logical: &str) -> Result<PathBuf, SyncError> {
        if !is_clean_relative(logical) {
            return Err(SyncError::InvalidPath(logical.to_string()));
        }
        Ok(logical.split('/').fold(self.root.clone(), |acc, part| acc.join(part)))
    }

    /// `None` when the file does not exist.
    pub fn read(&self, logical: &str) -> Result<Option<LocalFile>, SyncError> {
        let path = self.resolve(logical)?;
        let meta = match std::fs::metadata(&path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_err(&path, err)),
        };
        check_size(logical, meta.len())?;
        let content = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let modified_at = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(Some(LocalFile {
            content,
            modified_at,
        }))
    }

    /// Replace the file with `content`, or delete it when `content` is `None`.
    ///
    /// Size is checked first: an over-limit write changes nothing on disk.
    pub fn apply(&self, logical: &str, content: Option<&str>) -> Result<(), SyncError> {
        match content {
            Some(content) => self.write(logical, content),
            None => self.remove(logical),
        }
    }

    pub fn write(&self, logical: &str, content: &str) -> Result<(), SyncError> {
        check_size(logical, content.len() as u64)?;
        let path = self.resolve(logical)?;
        write_atomic(&path, content.as_bytes())?;
        tracing::debug!(path = logical, "wrote shared file");
        Ok(())
    }

    pub fn remove(&self, logical: &str) -> Result<(), SyncError> {
        let path = self.resolve(logical)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(path = logical, "removed shared file");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(&path, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn token_ignores_crlf() {
        assert_eq!(version_token("a\r\nb\n"), version_token("a\nb\n"));
        assert_ne!(version_token("a"), version_token("b"));
    }

    #[test]
    fn size_limits() {
        assert!(check_size("a", SOFT_SIZE_LIMIT + 1).is_ok());
        assert!(check_size("a", HARD_SIZE_LIMIT).is_ok());
        assert!(matches!(
            check_size("a", HARD_SIZE_LIMIT + 1),
            Err(SyncError::SizeLimitExceeded { .. })
        ));
    }

    #[test]
    fn write_read_remove() {
        let dir = TempDir::new().unwrap();
        let tree = WorkingTree::new(dir.path());
        assert_eq!(tree.read("memory/roadmap.md").unwrap(), None);
        tree.write("memory/roadmap.md", "# Roadmap\n").unwrap();
        let file = tree.read("memory/roadmap.md").unwrap().expect("present");
        assert_eq!(file.content, "# Roadmap\n");
        tree.remove("memory/roadmap.md").unwrap();
        assert!(!dir.path().join("memory/roadmap.md").exists());
        tree.remove("memory/roadmap.md").expect("second remove is a no-op");
    }

    #[test]
    fn oversized_write_leaves_prior_content() {
        let dir = TempDir::new().unwrap();
        let tree = WorkingTree::new(dir.path());
        tree.write("big.md", "small").unwrap();
        let huge = "x".repeat((HARD_SIZE_LIMIT + 1) as usize);
        let err = tree.write("big.md", &huge).unwrap_err();
        assert!(matches!(err, SyncError::SizeLimitExceeded { .. }));
        assert_eq!(std::fs::read_to_string(dir.path().join("big.md")).unwrap(), "small");
    }

    #[test]
    fn escaping_paths_rejected() {
        let tree = WorkingTree::new("/tmp/x");
        assert!(matches!(
            tree.resolve("../etc/passwd"),
            Err(SyncError::InvalidPath(_))
        ));
    }
}
