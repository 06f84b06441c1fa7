use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use teamsync_core::config::ProjectConfig;
use teamsync_core::types::{Notification, NotificationKind, OperationKind};
use teamsync_engine::{
    Enqueued, NotificationBatcher, NotificationStore, SyncCoordinator, SyncError, SyncReport,
    VersionControlPort,
};

use crate::error::{io_err, DaemonError};

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);
const DEBOUNCE_RETENTION: Duration = Duration::from_secs(30);
const DEFAULT_FLUSH_POLL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Run a full sync after each (debounced) local change.
    pub sync_on_change: bool,
    /// Upper bound on how long the flush loop sleeps between checks.
    pub flush_poll: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            sync_on_change: false,
            flush_poll: DEFAULT_FLUSH_POLL,
        }
    }
}

#[derive(Debug, Clone)]
struct SyncJob {
    path: String,
}

/// Start the watcher runtime and block the current thread until Ctrl-C.
pub fn start_blocking<P>(
    coordinator: SyncCoordinator<P>,
    options: WatchOptions,
) -> Result<(), DaemonError>
where
    P: VersionControlPort + Send + 'static,
{
    init_tracing("info");
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(coordinator, options))
}

/// Run the watcher, sync processor, flush loop and signal handler until one
/// of them stops.
pub async fn run<P>(coordinator: SyncCoordinator<P>, options: WatchOptions) -> Result<(), DaemonError>
where
    P: VersionControlPort + Send + 'static,
{
    let config = coordinator.config().clone();
    let store = NotificationStore::new(coordinator.state_dir());
    store.sync_settings(&config.settings, Utc::now())?;
    let batcher = coordinator.batcher().clone();
    let cancel = coordinator.cancel_handle();
    let coordinator = Arc::new(Mutex::new(coordinator));

    tracing::info!(
        project = %config.name,
        root = %config.root.display(),
        tracked = config.tracked.len(),
        sync_on_change = options.sync_on_change,
        "watching shared files",
    );

    let (sync_tx, sync_rx) = mpsc::channel::<SyncJob>(16);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let batcher = batcher.clone();
        let sync_tx = options.sync_on_change.then(|| sync_tx.clone());
        tokio::spawn(async move {
            let result = watcher_task(config, batcher, sync_tx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };
    drop(sync_tx);

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let result = sync_processor_task(coordinator, sync_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let flush_handle = {
        let shutdown = shutdown_tx.clone();
        let poll = options.flush_poll;
        tokio::spawn(async move {
            let result = flush_task(batcher, store, poll, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down watcher");
                            cancel.cancel();
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Task {
                            task: "signal_handler",
                            message: format!("ctrl-c handler failed: {err}"),
                        }),
                    }
                }
            }
        })
    };

    let (watcher_result, processor_result, flush_result, signal_result) =
        tokio::join!(watcher_handle, processor_handle, flush_handle, signal_handle);

    handle_join("watcher", watcher_result)?;
    handle_join("sync_processor", processor_result)?;
    handle_join("flush", flush_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn watcher_task(
    config: ProjectConfig,
    batcher: Arc<NotificationBatcher>,
    sync_tx: Option<mpsc::Sender<SyncJob>>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    // Canonicalize so that FSEvents paths (which arrive as real paths, e.g.
    // /private/var/... on macOS) match the prefix checks below.
    let root = fs::canonicalize(&config.root).unwrap_or_else(|_| config.root.clone());
    let tracked: HashSet<String> = config.tracked.iter().cloned().collect();

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;

    let mut watched_dirs = HashSet::new();
    register_tracked_dirs(&mut watcher, &mut watched_dirs, &root, &config.tracked)?;

    let mut debounce = HashMap::<PathBuf, Instant>::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else {
                    return Err(DaemonError::ChannelClosed("file watcher events"));
                };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }

                // A tracked file's directory may have just been created.
                register_tracked_dirs(&mut watcher, &mut watched_dirs, &root, &config.tracked)?;

                for path in event.paths {
                    let Some(logical) = tracked_path_for(&root, &tracked, &path) else {
                        continue;
                    };
                    if !should_process_event(&mut debounce, &path, Instant::now()) {
                        continue;
                    }

                    let notification = local_change_notification(&config, &logical);
                    match batcher.enqueue(notification) {
                        Enqueued::Queued => {
                            tracing::debug!(path = %logical, "queued local change notification");
                        }
                        Enqueued::QueuedWithDrop => {
                            tracing::warn!(path = %logical, "notification queue full; oldest event dropped");
                        }
                        Enqueued::Dropped => {
                            tracing::warn!(path = %logical, "notification queue full of conflicts; change event dropped");
                        }
                        Enqueued::Disabled => {}
                    }

                    if let Some(sync_tx) = &sync_tx {
                        match sync_tx.try_send(SyncJob { path: logical }) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(job)) => {
                                tracing::debug!(path = %job.path, "sync already queued; coalescing change");
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                return Err(DaemonError::ChannelClosed("sync jobs"));
                            }
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

async fn sync_processor_task<P>(
    coordinator: Arc<Mutex<SyncCoordinator<P>>>,
    mut sync_rx: mpsc::Receiver<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError>
where
    P: VersionControlPort + Send + 'static,
{
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = sync_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let mut coalesced = 0usize;
                while sync_rx.try_recv().is_ok() {
                    coalesced += 1;
                }
                let started = Instant::now();

                let coordinator = coordinator.clone();
                let outcome = tokio::task::spawn_blocking(move || -> Result<Option<SyncReport>, SyncError> {
                    let mut coordinator = coordinator
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                    let drained = coordinator.drain_offline_queue()?;
                    if drained.offline {
                        return Ok(None);
                    }
                    coordinator.sync(OperationKind::Bidirectional).map(Some)
                })
                .await
                .map_err(|err| DaemonError::Task {
                    task: "sync",
                    message: err.to_string(),
                })?;

                match outcome {
                    Ok(Some(report)) => {
                        tracing::info!(
                            trigger = %job.path,
                            coalesced,
                            status = %report.operation.status,
                            pulled = report.pulled.len(),
                            pushed = report.pushed.len(),
                            unresolved = report.unresolved.len(),
                            queued = report.queued,
                            duration_ms = started.elapsed().as_millis() as u64,
                            "change-triggered sync completed",
                        );
                    }
                    Ok(None) => {
                        tracing::info!(trigger = %job.path, "remote unreachable; change-triggered sync skipped");
                    }
                    Err(err) => {
                        tracing::error!(trigger = %job.path, error = %err, "change-triggered sync failed");
                    }
                }
            }
        }
    }

    Ok(())
}

/// Persist batches as they become due; on shutdown deliver whatever is
/// still queued.
async fn flush_task(
    batcher: Arc<NotificationBatcher>,
    store: NotificationStore,
    poll: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        let waiter = {
            let batcher = batcher.clone();
            tokio::task::spawn_blocking(move || batcher.wait_for_work(poll))
        };
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            woke = waiter => {
                woke.map_err(|err| DaemonError::Task {
                    task: "flush",
                    message: err.to_string(),
                })?;
                while let Some(batch) = batcher.flush_if_due(Utc::now()) {
                    deliver(&store, batch);
                }
            }
        }
    }

    while !batcher.is_empty() || batcher.dropped() > 0 {
        deliver(&store, batcher.flush(Utc::now()));
    }
    Ok(())
}

fn deliver(store: &NotificationStore, batch: Vec<Notification>) {
    let count = batch.len();
    if let Err(err) = store.append_batch(batch, Utc::now()) {
        tracing::error!(count, error = %err, "failed to persist notification batch");
    }
}

fn local_change_notification(config: &ProjectConfig, logical: &str) -> Notification {
    Notification::new(
        NotificationKind::MemoryChanged,
        format!("{logical} changed locally"),
        format!("{} edited {logical}; not yet synced", config.member),
        Some(config.member.clone()),
        vec![logical.to_string()],
        Utc::now(),
    )
}

fn register_tracked_dirs(
    watcher: &mut RecommendedWatcher,
    watched_dirs: &mut HashSet<PathBuf>,
    root: &Path,
    tracked: &[String],
) -> Result<(), DaemonError> {
    let mut dirs = vec![root.to_path_buf()];
    dirs.extend(
        tracked
            .iter()
            .filter_map(|logical| root.join(logical).parent().map(Path::to_path_buf)),
    );
    dirs.sort();
    dirs.dedup();

    for dir in dirs {
        let canonical = match fs::canonicalize(&dir) {
            Ok(path) => path,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&dir, err)),
        };
        if watched_dirs.insert(canonical.clone()) {
            watcher.watch(&canonical, RecursiveMode::NonRecursive)?;
            tracing::debug!(path = %canonical.display(), "watching directory");
        }
    }
    Ok(())
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Map an absolute event path back to the tracked logical path it names.
fn tracked_path_for(root: &Path, tracked: &HashSet<String>, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    let logical = parts.join("/");
    tracked.contains(&logical).then_some(logical)
}

fn should_process_event(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
) -> bool {
    should_process_event_with_threshold(debounce, path, now, DEBOUNCE_WINDOW)
}

fn should_process_event_with_threshold(
    debounce: &mut HashMap<PathBuf, Instant>,
    path: &Path,
    now: Instant,
    threshold: Duration,
) -> bool {
    debounce.retain(|_, seen_at| now.duration_since(*seen_at) <= DEBOUNCE_RETENTION);
    match debounce.get(path) {
        Some(last_seen) if now.duration_since(*last_seen) < threshold => false,
        _ => {
            debounce.insert(path.to_path_buf(), now);
            true
        }
    }
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Task {
            task,
            message: format!("join failure: {err}"),
        }),
    }
}

/// Install the `tracing` subscriber on stderr: `RUST_LOG` if set,
/// `default_directive` otherwise.
pub fn init_tracing(default_directive: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    use teamsync_core::types::MemberId;
    use teamsync_engine::BatcherConfig;
    use tempfile::TempDir;
    use tokio::time::advance;

    fn tracked(paths: &[&str]) -> HashSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    fn urgent(path: &str) -> Notification {
        Notification::new(
            NotificationKind::ConflictDetected,
            format!("conflict on {path}"),
            "",
            Some(MemberId::from("bo@x.dev")),
            vec![path.to_string()],
            Utc::now(),
        )
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn debounce_coalesces_rapid_events() {
        let threshold = Duration::from_millis(100);
        let mut debounce = HashMap::<PathBuf, Instant>::new();
        let path = PathBuf::from("/work/memory/roadmap.md");
        let mut triggers = 0usize;

        for _ in 0..5 {
            if should_process_event_with_threshold(&mut debounce, &path, Instant::now(), threshold)
            {
                triggers += 1;
            }
            advance(Duration::from_millis(10)).await;
        }
        assert_eq!(triggers, 1, "rapid saves should collapse to one event");

        advance(Duration::from_millis(150)).await;
        assert!(should_process_event_with_threshold(
            &mut debounce,
            &path,
            Instant::now(),
            threshold
        ));
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn debounce_forgets_old_entries() {
        let mut debounce = HashMap::<PathBuf, Instant>::new();
        assert!(should_process_event(
            &mut debounce,
            Path::new("/work/memory/a.md"),
            Instant::now()
        ));
        advance(DEBOUNCE_RETENTION + Duration::from_secs(1)).await;
        assert!(should_process_event(
            &mut debounce,
            Path::new("/work/memory/b.md"),
            Instant::now()
        ));
        assert_eq!(debounce.len(), 1);
    }

    #[test]
    fn only_tracked_paths_under_root_map_back() {
        let root = Path::new("/work");
        let set = tracked(&["memory/roadmap.md", "memory/principles.md"]);
        assert_eq!(
            tracked_path_for(root, &set, Path::new("/work/memory/roadmap.md")).as_deref(),
            Some("memory/roadmap.md")
        );
        assert_eq!(
            tracked_path_for(root, &set, Path::new("/work/memory/notes.md")),
            None
        );
        assert_eq!(
            tracked_path_for(root, &set, Path::new("/elsewhere/memory/roadmap.md")),
            None
        );
        assert_eq!(
            tracked_path_for(root, &set, Path::new("/work/memory/../memory/roadmap.md")),
            None
        );
    }

    #[test]
    fn access_events_are_ignored() {
        assert!(is_relevant_event_kind(&EventKind::Modify(
            notify::event::ModifyKind::Any
        )));
        assert!(is_relevant_event_kind(&EventKind::Remove(
            notify::event::RemoveKind::File
        )));
        assert!(!is_relevant_event_kind(&EventKind::Access(
            notify::event::AccessKind::Any
        )));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn flush_task_persists_urgent_batches_and_drains_on_shutdown() {
        let state = TempDir::new().expect("state");
        let store = NotificationStore::new(state.path());
        let batcher = Arc::new(NotificationBatcher::new(
            BatcherConfig::default(),
            Utc::now(),
        ));
        let (shutdown_tx, _) = broadcast::channel::<()>(4);

        let handle = {
            let batcher = batcher.clone();
            let store = store.clone();
            let shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(flush_task(
                batcher,
                store,
                Duration::from_millis(20),
                shutdown_rx,
            ))
        };

        batcher.enqueue(urgent("memory/roadmap.md"));
        let mut delivered = 0;
        for _ in 0..100 {
            delivered = store.unread(Utc::now()).expect("unread").len();
            if delivered > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(delivered, 1, "urgent event should flush without waiting for the interval");

        // Not urgent and inside the 5 minute window: only shutdown delivers it.
        batcher.enqueue(Notification::new(
            NotificationKind::MemoryChanged,
            "memory/principles.md changed",
            "",
            Some(MemberId::from("ana@x.dev")),
            vec!["memory/principles.md".to_string()],
            Utc::now(),
        ));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(store.unread(Utc::now()).expect("unread").len(), 1);

        shutdown_tx.send(()).expect("shutdown");
        handle.await.expect("join").expect("flush task");
        assert_eq!(store.unread(Utc::now()).expect("unread").len(), 2);
        assert!(batcher.is_empty());
    }

    #[test]
    fn handle_join_passes_inner_errors_through() {
        let inner = Err(DaemonError::ChannelClosed("x"));
        assert!(matches!(
            handle_join("watcher", Ok(inner)),
            Err(DaemonError::ChannelClosed("x"))
        ));
        assert!(handle_join("watcher", Ok(Ok(()))).is_ok());
    }
}
