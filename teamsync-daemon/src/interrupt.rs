//! Run a blocking sync on a worker thread while listening for Ctrl-C.
//!
//! The interrupt only raises the coordinator's [`CancelHandle`]; the sync
//! itself stops at its next file checkpoint and reports `Cancelled`, so
//! every file it already finished stays consistent.

use std::future::Future;

use teamsync_engine::CancelHandle;

use crate::error::{io_err, DaemonError};

/// Run `work` to completion, cancelling it through `cancel` on Ctrl-C.
pub fn run_interruptible<T, F>(cancel: CancelHandle, work: F) -> Result<T, DaemonError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(interruptible(cancel, work, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    }))
}

/// Run `work` on the blocking pool; if `interrupt` resolves first, raise
/// `cancel` and keep waiting for `work` to reach a checkpoint.
pub async fn interruptible<T, F, I>(cancel: CancelHandle, work: F, interrupt: I) -> Result<T, DaemonError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
    I: Future<Output = ()>,
{
    let mut task = tokio::task::spawn_blocking(work);
    tokio::select! {
        joined = &mut task => return joined.map_err(|err| join_failure(&err)),
        () = interrupt => {
            tracing::warn!("interrupt received; stopping at the next file checkpoint");
            cancel.cancel();
        }
    }
    task.await.map_err(|err| join_failure(&err))
}

fn join_failure(err: &tokio::task::JoinError) -> DaemonError {
    DaemonError::Task {
        task: "sync",
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn work_finishing_first_is_not_cancelled() {
        let cancel = CancelHandle::default();
        let value = interruptible(cancel.clone(), || 7, std::future::pending())
            .await
            .expect("join");
        assert_eq!(value, 7);
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn interrupt_raises_cancel_and_waits_for_checkpoint() {
        let cancel = CancelHandle::default();
        let observed = cancel.clone();
        let stopped_at = interruptible(
            cancel.clone(),
            move || {
                let mut checkpoints = 0u32;
                while !observed.is_cancelled() {
                    checkpoints += 1;
                    std::thread::sleep(Duration::from_millis(5));
                }
                checkpoints
            },
            async {},
        )
        .await
        .expect("join");
        assert!(cancel.is_cancelled());
        assert!(stopped_at < 1_000);
    }

    #[test]
    fn panicking_work_is_a_task_error() {
        let err = tokio_test::block_on(interruptible(
            CancelHandle::default(),
            || -> u8 { panic!("boom") },
            std::future::pending(),
        ))
        .unwrap_err();
        assert!(matches!(err, DaemonError::Task { task: "sync", .. }));
    }
}
