//! Per-project YAML configuration: roster, tracked files, sync settings.
//!
//! # Storage layout
//!
//! ```text
//! ~/.teamsync/
//!   projects/
//!     <project_name>/
//!       project.yaml   (this config, mode 0600)
//!       state/         (engine-owned local state, see teamsync-engine)
//! ```
//!
//! # API pattern
//!
//! Every function touching disk has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! The loaded [`ProjectConfig`] is a plain value. It is handed to the sync
//! coordinator by the caller; nothing inside the engine reads it ad hoc.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::RosterError;
use crate::types::{MemberId, ProjectName, Resolution, Team};

pub const CONFIG_FILE: &str = "project.yaml";

/// Memory files tracked when `init` is not given an explicit list.
pub const DEFAULT_TRACKED: &[&str] = &[
    "memory/principles.md",
    "memory/roadmap.md",
    "memory/completed.md",
];

// ---------------------------------------------------------------------------
// 1. Config types
// ---------------------------------------------------------------------------

/// Conflict strategy applied automatically during `sync`. Manual merges need
/// human input, so only the two keep-one-side strategies qualify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoStrategy {
    KeepLocal,
    KeepRemote,
}

impl From<AutoStrategy> for Resolution {
    fn from(s: AutoStrategy) -> Self {
        match s {
            AutoStrategy::KeepLocal => Resolution::KeepLocal,
            AutoStrategy::KeepRemote => Resolution::KeepRemote,
        }
    }
}

fn default_batch_interval() -> u64 {
    5
}
fn default_timeout() -> u64 {
    120
}
fn default_remote() -> String {
    "origin".to_string()
}
fn default_branch() -> String {
    "main".to_string()
}
fn default_true() -> bool {
    true
}

/// Tunables for one project's sync behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// `None` leaves conflicts open for the resolution UI.
    #[serde(default)]
    pub conflict_strategy: Option<AutoStrategy>,
    #[serde(default = "default_batch_interval")]
    pub batch_interval_minutes: u64,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    /// Whole-sync deadline; exceeding it counts as a network failure.
    #[serde(default = "default_timeout")]
    pub sync_timeout_secs: u64,
    #[serde(default = "default_remote")]
    pub remote: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            conflict_strategy: None,
            batch_interval_minutes: default_batch_interval(),
            notifications_enabled: true,
            sync_timeout_secs: default_timeout(),
            remote: default_remote(),
            branch: default_branch(),
        }
    }
}

/// Everything the engine needs to know about one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: ProjectName,
    /// Absolute path of the working tree holding the shared files.
    pub root: PathBuf,
    /// Identity of the person syncing from this machine.
    pub member: MemberId,
    /// Shared files, relative to `root`.
    #[serde(default)]
    pub tracked: Vec<String>,
    pub team: Team,
    #[serde(default)]
    pub settings: SyncSettings,
}

impl ProjectConfig {
    /// Check roster invariants and that every tracked path is a clean
    /// relative path.
    pub fn validate(&self) -> Result<(), RosterError> {
        self.team.validate()?;
        for path in &self.tracked {
            if !is_clean_relative(path) {
                return Err(RosterError::Invalid(format!(
                    "tracked path '{path}' must be relative, without leading separator or '..'"
                )));
            }
        }
        Ok(())
    }
}

/// `a/b.md` yes; `/a`, `a/../b`, `` no.
pub fn is_clean_relative(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.starts_with('\\')
        && !path.contains(':')
        && path
            .split(['/', '\\'])
            .all(|part| !part.is_empty() && part != ".." && part != ".")
}

// ---------------------------------------------------------------------------
// 2. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.teamsync/projects/`
pub fn projects_root_at(home: &Path) -> PathBuf {
    home.join(".teamsync").join("projects")
}

/// `<home>/.teamsync/projects/<project>/`: pure, no I/O.
pub fn project_dir_at(home: &Path, project: &ProjectName) -> PathBuf {
    projects_root_at(home).join(&project.0)
}

/// `<home>/.teamsync/projects/<project>/project.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path, project: &ProjectName) -> PathBuf {
    project_dir_at(home, project).join(CONFIG_FILE)
}

/// `<home>/.teamsync/projects/<project>/state/`: pure, no I/O.
pub fn state_dir_at(home: &Path, project: &ProjectName) -> PathBuf {
    project_dir_at(home, project).join("state")
}

/// Lists the names of all projects with a config file, sorted.
pub fn list_projects_at(home: &Path) -> Result<Vec<ProjectName>, RosterError> {
    let dir = projects_root_at(home);
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut names: Vec<ProjectName> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter(|e| e.path().join(CONFIG_FILE).exists())
        .map(|e| ProjectName::from(e.file_name().to_string_lossy().into_owned()))
        .collect();
    names.sort();
    Ok(names)
}

/// `list_projects_at` convenience wrapper.
pub fn list_projects() -> Result<Vec<ProjectName>, RosterError> {
    list_projects_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Load and validate a project config.
///
/// Returns `RosterError::NotFound` if absent, `RosterError::Parse` (with path
/// and serde_yaml line context) if malformed, `RosterError::Invalid` (or a
/// more specific roster error) if an invariant does not hold.
pub fn load_at(home: &Path, project: &ProjectName) -> Result<ProjectConfig, RosterError> {
    let path = config_path_at(home, project);
    if !path.exists() {
        return Err(RosterError::NotFound { path });
    }
    let contents = std::fs::read_to_string(&path)?;
    let config: ProjectConfig =
        serde_yaml::from_str(&contents).map_err(|e| RosterError::Parse { path, source: e })?;
    config.validate()?;
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load(project: &ProjectName) -> Result<ProjectConfig, RosterError> {
    load_at(&home()?, project)
}

// ---------------------------------------------------------------------------
// 4. Save (atomic)
// ---------------------------------------------------------------------------

/// Validate, then atomically save the config.
///
/// Write flow: serialize → `project.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &ProjectConfig) -> Result<(), RosterError> {
    config.validate()?;
    let dir = project_dir_at(home, &config.name);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    let path = dir.join(CONFIG_FILE);
    let tmp_path = dir.join(format!("{CONFIG_FILE}.tmp"));

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &ProjectConfig) -> Result<(), RosterError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// 5. Init
// ---------------------------------------------------------------------------

/// Register a project rooted at `root` with `owner` as its first member.
///
/// Idempotent: if the config already exists it is loaded and returned
/// unchanged.
pub fn init_at(
    home: &Path,
    name: ProjectName,
    root: PathBuf,
    owner: MemberId,
    tracked: Option<Vec<String>>,
) -> Result<ProjectConfig, RosterError> {
    if config_path_at(home, &name).exists() {
        return load_at(home, &name);
    }
    let team = Team::new(name.0.clone(), name.0.clone(), owner.clone());
    let config = ProjectConfig {
        name,
        root,
        member: owner,
        tracked: tracked
            .unwrap_or_else(|| DEFAULT_TRACKED.iter().map(|s| s.to_string()).collect()),
        team,
        settings: SyncSettings::default(),
    };
    save_at(home, &config)?;
    Ok(config)
}

/// `init_at` convenience wrapper.
pub fn init(
    name: ProjectName,
    root: PathBuf,
    owner: MemberId,
    tracked: Option<Vec<String>>,
) -> Result<ProjectConfig, RosterError> {
    init_at(&home()?, name, root, owner, tracked)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

pub fn home() -> Result<PathBuf, RosterError> {
    dirs::home_dir().ok_or(RosterError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), RosterError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), RosterError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), RosterError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), RosterError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
