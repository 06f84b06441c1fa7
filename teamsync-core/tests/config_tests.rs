//! Project config error-message, atomic-write-safety, and roster round-trip tests.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use std::fs;
use std::path::PathBuf;

use teamsync_core::{
    config,
    types::{MemberId, Permission, ProjectName, Role, TeamMember},
    RosterError,
};

fn proj() -> ProjectName {
    ProjectName::from("atlas")
}

fn init(home: &assert_fs::TempDir) -> teamsync_core::ProjectConfig {
    config::init_at(
        home.path(),
        proj(),
        PathBuf::from("/code/atlas"),
        MemberId::from("ana@x.dev"),
        Some(vec!["memory/roadmap.md".into()]),
    )
    .expect("init")
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_config_returns_not_found() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = config::load_at(home.path(), &proj()).unwrap_err();
    assert!(matches!(err, RosterError::NotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("project.yaml"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let dir = config::project_dir_at(home.path(), &proj());
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("project.yaml"), b": : corrupt : yaml : !!!\n  - [unclosed").expect("write");

    let err = config::load_at(home.path(), &proj()).unwrap_err();
    assert!(matches!(err, RosterError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("project.yaml"));
}

#[test]
fn load_rejects_roster_without_owner() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    init(&home);
    let path = config::config_path_at(home.path(), &proj());
    let yaml = fs::read_to_string(&path).unwrap().replace("role: owner", "role: member");
    fs::write(&path, yaml).unwrap();

    let err = config::load_at(home.path(), &proj()).unwrap_err();
    assert!(matches!(err, RosterError::Invalid(_)), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Atomic write safety
// ---------------------------------------------------------------------------

#[test]
fn save_cleans_up_tmp_file() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    init(&home);
    home.child(".teamsync/projects/atlas/project.yaml")
        .assert(predicate::path::exists());
    home.child(".teamsync/projects/atlas/project.yaml.tmp")
        .assert(predicate::path::missing());
}

#[cfg(unix)]
#[test]
fn config_file_is_private() {
    use std::os::unix::fs::PermissionsExt;
    let home = assert_fs::TempDir::new().expect("tempdir");
    init(&home);
    let path = config::config_path_at(home.path(), &proj());
    let mode = fs::metadata(path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
}

// ---------------------------------------------------------------------------
// 3. Roster changes persist
// ---------------------------------------------------------------------------

#[test]
fn member_changes_roundtrip_through_yaml() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut cfg = init(&home);
    cfg.team
        .add_member(TeamMember::new("bo@x.dev", Role::Member, Permission::ReadOnly))
        .expect("add");
    config::save_at(home.path(), &cfg).expect("save");

    let loaded = config::load_at(home.path(), &proj()).expect("load");
    let bo = loaded.team.member(&MemberId::from("bo@x.dev")).expect("bo");
    assert_eq!(bo.permission, Permission::ReadOnly);
    assert!(bo.notifications);

    let raw = fs::read_to_string(config::config_path_at(home.path(), &proj())).unwrap();
    assert!(raw.contains("read-only"));
}
