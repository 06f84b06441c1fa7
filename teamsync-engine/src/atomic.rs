//! Write-to-temp-then-rename persistence shared by every state file.
//!
//! The `.tmp` sibling always lives in the target's directory, so the rename
//! never crosses a filesystem. An interrupted run leaves either the previous
//! file or the new one, never a torn mix.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{io_err, SyncError};

/// Atomically replace `path` with `bytes`, creating parent directories.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = tmp_path(path);
    std::fs::write(&tmp, bytes).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{name}.teamsync.tmp"))
}

/// Pretty-printed JSON, written atomically.
pub(crate) fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SyncError> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json.as_bytes())
}

/// Strict load: `Ok(None)` when missing, `CorruptState` when unparsable.
pub(crate) fn load_json_strict<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SyncError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(path, err)),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|source| SyncError::CorruptState {
            path: path.to_path_buf(),
            source,
        })
}

/// Lenient load: a missing file is the default value; a corrupt file is set
/// aside as `<name>.corrupt` and replaced by the default, with a warning.
pub(crate) fn load_json_or_default<T: DeserializeOwned + Default>(
    path: &Path,
) -> Result<T, SyncError> {
    match load_json_strict(path) {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Ok(T::default()),
        Err(SyncError::CorruptState { path, source }) => {
            let aside = path.with_extension("corrupt");
            tracing::warn!(
                path = %path.display(),
                error = %source,
                moved_to = %aside.display(),
                "corrupt state file; reinitializing empty state",
            );
            let _ = std::fs::rename(&path, &aside);
            Ok(T::default())
        }
        Err(err) => Err(err),
    }
}
