//! `GitPort`: [`VersionControlPort`] over the `git` command line.
//!
//! Commits are built with plumbing on top of the fetched remote tip, using a
//! private index file, so neither the working tree nor the local `HEAD` is
//! touched and every push is a fast-forward of what was last fetched. If the
//! remote moved in between, git rejects the push and the caller sees a
//! [`SyncError::Transport`].

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use teamsync_core::config::ProjectConfig;
use teamsync_core::types::MemberId;

use crate::error::SyncError;
use crate::port::{Commit, RemoteFile, Revision, Snapshot, VersionControlPort};

/// Private index used while building commits.
pub const INDEX_FILE: &str = "git-index";

const NETWORK_MARKERS: &[&str] = &[
    "could not resolve host",
    "unable to access",
    "could not read from remote repository",
    "connection refused",
    "connection timed out",
    "operation timed out",
    "network is unreachable",
    "failed to connect",
    "connection reset",
];

const POLL_INTERVAL: Duration = Duration::from_millis(20);

const MISSING_BRANCH_MARKERS: &[&str] = &["couldn't find remote ref", "could not find remote ref"];

/// Map a failed git invocation to a typed error. Unreachable remotes are
/// retryable network errors, anything else is a transport error.
pub fn classify_git_failure(stderr: &str) -> SyncError {
    let lowered = stderr.to_lowercase();
    if NETWORK_MARKERS.iter().any(|m| lowered.contains(m)) {
        SyncError::network(stderr.trim())
    } else {
        SyncError::Transport(stderr.trim().to_string())
    }
}

#[derive(Debug, Clone)]
pub struct GitPort {
    repo: PathBuf,
    remote: String,
    branch: String,
    tracked: Vec<String>,
    index: PathBuf,
    fetched: Option<String>,
    deadline: Option<Instant>,
}

impl GitPort {
    pub fn new(
        repo: impl Into<PathBuf>,
        remote: impl Into<String>,
        branch: impl Into<String>,
        tracked: Vec<String>,
        state_dir: &Path,
    ) -> Self {
        Self {
            repo: repo.into(),
            remote: remote.into(),
            branch: branch.into(),
            tracked,
            index: state_dir.join(INDEX_FILE),
            fetched: None,
            deadline: None,
        }
    }

    pub fn from_config(config: &ProjectConfig, state_dir: &Path) -> Self {
        Self::new(
            &config.root,
            &config.settings.remote,
            &config.settings.branch,
            config.tracked.clone(),
            state_dir,
        )
    }

    fn tracking_ref(&self) -> String {
        format!("refs/remotes/{}/{}", self.remote, self.branch)
    }

    fn run(&self, args: &[&str], env: &[(&str, &str)], stdin: Option<&[u8]>) -> Result<String, SyncError> {
        let mut cmd = Command::new("git");
        cmd.arg("-C")
            .arg(&self.repo)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .envs(env.iter().copied())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() });
        let mut child = cmd
            .spawn()
            .map_err(|e| SyncError::Transport(format!("failed to run git: {e}")))?;
        if let (Some(bytes), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(bytes)
                .map_err(|e| SyncError::Transport(format!("failed to write to git: {e}")))?;
        }
        let stdout = child.stdout.take().map(drain_pipe);
        let stderr = child.stderr.take().map(drain_pipe);
        let status = match wait_with_deadline(&mut child, self.deadline) {
            Ok(status) => status,
            Err(err) => {
                tracing::warn!(args = ?args, error = %err, "git command abandoned");
                return Err(err);
            }
        };
        let stdout = join_pipe(stdout);
        if !status.success() {
            let stderr = join_pipe(stderr);
            let stderr = String::from_utf8_lossy(&stderr);
            tracing::debug!(args = ?args, stderr = %stderr.trim(), "git command failed");
            return Err(classify_git_failure(&stderr));
        }
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    fn git(&self, args: &[&str]) -> Result<String, SyncError> {
        self.run(args, &[], None)
    }

    fn last_change(&self, rev: &str, path: &str) -> Result<(Option<MemberId>, Option<DateTime<Utc>>), SyncError> {
        let out = self.git(&["log", "-1", "--format=%ae%x09%aI", rev, "--", path])?;
        let mut parts = out.trim().splitn(2, '\t');
        let author = parts
            .next()
            .filter(|a| !a.is_empty())
            .map(MemberId::from);
        let at = parts
            .next()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc));
        Ok((author, at))
    }
}

impl VersionControlPort for GitPort {
    fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    fn check_connection(&mut self) -> Result<(), SyncError> {
        self.git(&["ls-remote", "--heads", &self.remote, &self.branch])
            .map(|_| ())
    }

    fn fetch(&mut self) -> Result<Snapshot, SyncError> {
        match self.git(&["fetch", "--quiet", &self.remote, &self.branch]) {
            Ok(_) => {}
            Err(SyncError::Transport(msg))
                if MISSING_BRANCH_MARKERS.iter().any(|m| msg.to_lowercase().contains(m)) =>
            {
                tracing::info!(remote = %self.remote, branch = %self.branch, "remote branch does not exist yet");
                self.fetched = None;
                return Ok(Snapshot::default());
            }
            Err(err) => return Err(err),
        }

        let tracking = self.tracking_ref();
        let tip = self.git(&["rev-parse", &tracking])?.trim().to_string();
        let listed = self.git(&["ls-tree", "-r", "--name-only", &tip])?;
        let present: Vec<&str> = listed.lines().collect();

        let mut files = BTreeMap::new();
        for path in &self.tracked {
            if !present.contains(&path.as_str()) {
                continue;
            }
            let content = self.git(&["show", &format!("{tip}:{path}")])?;
            let (modified_by, modified_at) = self.last_change(&tip, path)?;
            files.insert(
                path.clone(),
                RemoteFile {
                    content,
                    modified_by,
                    modified_at,
                },
            );
        }
        tracing::debug!(revision = %tip, files = files.len(), "fetched remote snapshot");
        self.fetched = Some(tip.clone());
        Ok(Snapshot {
            revision: Some(Revision(tip)),
            files,
        })
    }

    fn commit(&mut self, commit: &Commit) -> Result<Revision, SyncError> {
        let index = self.index.to_string_lossy().into_owned();
        let env = [("GIT_INDEX_FILE", index.as_str())];
        match &self.fetched {
            Some(tip) => self.run(&["read-tree", tip], &env, None)?,
            None => self.run(&["read-tree", "--empty"], &env, None)?,
        };

        for (path, content) in &commit.files {
            match content {
                Some(content) => {
                    let blob = self.run(
                        &["hash-object", "-w", "--stdin"],
                        &[],
                        Some(content.as_bytes()),
                    )?;
                    let info = format!("100644,{},{path}", blob.trim());
                    self.run(&["update-index", "--add", "--cacheinfo", &info], &env, None)?;
                }
                None => {
                    self.run(&["update-index", "--force-remove", "--", path], &env, None)?;
                }
            }
        }

        let tree = self.run(&["write-tree"], &env, None)?;
        let author = commit.author.as_str();
        let identity = [
            ("GIT_AUTHOR_NAME", author),
            ("GIT_AUTHOR_EMAIL", author),
            ("GIT_COMMITTER_NAME", author),
            ("GIT_COMMITTER_EMAIL", author),
        ];
        let tree = tree.trim();
        let mut args = vec!["commit-tree", tree, "-m", commit.message.as_str()];
        if let Some(tip) = &self.fetched {
            args.push("-p");
            args.push(tip.as_str());
        }
        let sha = self.run(&args, &identity, None)?.trim().to_string();
        let _ = std::fs::remove_file(&self.index);
        tracing::debug!(revision = %sha, files = commit.files.len(), "built commit");
        Ok(Revision(sha))
    }

    fn push(&mut self, revision: &Revision) -> Result<(), SyncError> {
        let refspec = format!("{}:refs/heads/{}", revision.0, self.branch);
        self.git(&["push", "--quiet", &self.remote, &refspec])?;
        self.fetched = Some(revision.0.clone());
        Ok(())
    }
}

/// Wait for `child`, killing it once `deadline` passes. A killed child is a
/// retryable network failure.
fn wait_with_deadline(child: &mut Child, deadline: Option<Instant>) -> Result<ExitStatus, SyncError> {
    let Some(deadline) = deadline else {
        return child
            .wait()
            .map_err(|e| SyncError::Transport(format!("git did not finish: {e}")));
    };
    loop {
        let polled = child
            .try_wait()
            .map_err(|e| SyncError::Transport(format!("git did not finish: {e}")))?;
        if let Some(status) = polled {
            return Ok(status);
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SyncError::network("git did not finish before the sync deadline"));
        }
        std::thread::sleep(POLL_INTERVAL.min(left));
    }
}

/// Read a pipe to the end on its own thread so a chatty child never blocks
/// on a full pipe while we poll it.
fn drain_pipe<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_pipe(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
