//! OfflineQueue: durable FIFO of sync operations that hit a network failure.
//!
//! Entries live in `history.json` under `pending_operations`, so they survive
//! restarts. [`OfflineQueue::drain`] replays them strictly in enqueue order:
//! an entry still inside its backoff window, or one that fails again on the
//! network, stops the drain and everything behind it waits.
//!
//! Backoff is `1s * 2^(retries - 1)`. The third failed replay marks the
//! operation `error` and moves it to history.

use chrono::{DateTime, Duration, Utc};

use teamsync_core::types::{OperationStatus, SyncOperation};

use crate::error::SyncError;
use crate::state_store::{PendingOperation, StateStore};

pub const MAX_RETRIES: u32 = 3;
pub const BACKOFF_BASE_SECS: i64 = 1;
pub const BACKOFF_FACTOR: i64 = 2;

/// Delay before the next attempt after `retries` failed replays.
pub fn backoff(retries: u32) -> Duration {
    if retries == 0 {
        return Duration::zero();
    }
    Duration::seconds(BACKOFF_BASE_SECS * BACKOFF_FACTOR.pow(retries - 1))
}

/// Outcome of one [`OfflineQueue::drain`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Replayed to completion (`success` or `conflict`), in replay order.
    pub replayed: Vec<SyncOperation>,
    /// Failed on the network again and stay queued with a longer backoff.
    pub requeued: usize,
    /// Hit the retry cap; now `error` in history.
    pub abandoned: Vec<SyncOperation>,
    /// Failed for a non-network reason; now `error` in history.
    pub failed: Vec<SyncOperation>,
    /// Entries left in the queue afterwards.
    pub remaining: usize,
    /// The connectivity check failed, nothing was attempted.
    pub offline: bool,
}

#[derive(Debug, Clone)]
pub struct OfflineQueue {
    store: StateStore,
}

impl OfflineQueue {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Park `op` (which must be `pending`) at the back of the queue. An
    /// operation already queued under the same id keeps its place and
    /// retry count.
    pub fn enqueue(&self, op: SyncOperation, error: &str, now: DateTime<Utc>) -> Result<(), SyncError> {
        if op.status != OperationStatus::Pending {
            return Err(SyncError::Validation(format!(
                "only pending operations can be queued, {} is {}",
                op.id, op.status
            )));
        }
        let mut history = self.store.load_history()?;
        match history
            .pending_operations
            .iter_mut()
            .find(|p| p.operation.id == op.id)
        {
            Some(existing) => {
                existing.operation = op;
                existing.last_error = Some(error.to_string());
            }
            None => {
                tracing::info!(operation = %op.id, kind = %op.operation_type, error, "queued sync operation for replay");
                history.pending_operations.push(PendingOperation {
                    operation: op,
                    retries: 0,
                    enqueued_at: now,
                    next_attempt_at: now,
                    last_error: Some(error.to_string()),
                });
            }
        }
        self.store.save_history(&mut history)
    }

    pub fn pending(&self) -> Result<Vec<PendingOperation>, SyncError> {
        Ok(self.store.load_history()?.pending_operations)
    }

    pub fn len(&self) -> Result<usize, SyncError> {
        Ok(self.pending()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, SyncError> {
        Ok(self.len()? == 0)
    }

    /// Replay due entries front to back through `replay`.
    ///
    /// `replay` receives the queued operation and returns it in its final
    /// state. A `SyncInProgress` or `Cancelled` error stops the drain without
    /// touching the entry.
    pub fn drain<F>(&self, now: DateTime<Utc>, mut replay: F) -> Result<DrainReport, SyncError>
    where
        F: FnMut(&SyncOperation) -> Result<SyncOperation, SyncError>,
    {
        let mut report = DrainReport::default();
        loop {
            let front = match self.store.load_history()?.pending_operations.first() {
                Some(front) => front.clone(),
                None => break,
            };
            if front.next_attempt_at > now {
                tracing::debug!(
                    operation = %front.operation.id,
                    next_attempt_at = %front.next_attempt_at,
                    "queue head not due yet",
                );
                break;
            }

            let result = replay(&front.operation);
            if let Err(SyncError::SyncInProgress { .. } | SyncError::Cancelled) = &result {
                break;
            }

            let mut history = self.store.load_history()?;
            let Some(idx) = history
                .pending_operations
                .iter()
                .position(|p| p.operation.id == front.operation.id)
            else {
                continue;
            };

            match result {
                Ok(done) => {
                    history.pending_operations.remove(idx);
                    history.upsert(done.clone());
                    self.store.save_history(&mut history)?;
                    tracing::info!(operation = %done.id, status = %done.status, "replayed queued operation");
                    report.replayed.push(done);
                }
                Err(err) if err.is_retryable() => {
                    let entry = &mut history.pending_operations[idx];
                    entry.retries += 1;
                    entry.last_error = Some(err.to_string());
                    if entry.retries >= MAX_RETRIES {
                        let mut op = history.pending_operations.remove(idx).operation;
                        op.fail(format!("gave up after {MAX_RETRIES} retries: {err}"), now)?;
                        history.upsert(op.clone());
                        self.store.save_history(&mut history)?;
                        tracing::warn!(operation = %op.id, "queued operation abandoned after retry cap");
                        report.abandoned.push(op);
                        continue;
                    }
                    entry.next_attempt_at = now + backoff(entry.retries);
                    let (id, retries, next) = (entry.operation.id.clone(), entry.retries, entry.next_attempt_at);
                    self.store.save_history(&mut history)?;
                    tracing::info!(operation = %id, retries, next_attempt_at = %next, "replay failed on network; backing off");
                    report.requeued += 1;
                    break;
                }
                Err(err) => {
                    let mut op = history.pending_operations.remove(idx).operation;
                    op.fail(err.to_string(), now)?;
                    history.upsert(op.clone());
                    self.store.save_history(&mut history)?;
                    tracing::warn!(operation = %op.id, error = %err, "queued operation failed");
                    report.failed.push(op);
                }
            }
        }
        report.remaining = self.len()?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teamsync_core::types::{MemberId, OperationKind};
    use tempfile::TempDir;

    fn queued(q: &OfflineQueue, now: DateTime<Utc>) -> SyncOperation {
        let op = SyncOperation::new(MemberId::from("a"), OperationKind::Push, now);
        q.enqueue(op.clone(), "offline", now).unwrap();
        op
    }

    fn finish(op: &SyncOperation) -> Result<SyncOperation, SyncError> {
        let mut op = op.clone();
        op.transition(OperationStatus::InProgress, Utc::now())?;
        op.transition(OperationStatus::Success, Utc::now())?;
        Ok(op)
    }

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff(0), Duration::zero());
        assert_eq!(backoff(1), Duration::seconds(1));
        assert_eq!(backoff(2), Duration::seconds(2));
        assert_eq!(backoff(3), Duration::seconds(4));
    }

    #[test]
    fn drains_in_enqueue_order() {
        let dir = TempDir::new().unwrap();
        let q = OfflineQueue::new(StateStore::new(dir.path()));
        let now = Utc::now();
        let ids: Vec<_> = (0..3).map(|_| queued(&q, now).id).collect();

        let mut seen = Vec::new();
        let report = q
            .drain(now, |op| {
                seen.push(op.id.clone());
                finish(op)
            })
            .unwrap();
        assert_eq!(seen, ids);
        assert_eq!(report.replayed.len(), 3);
        assert_eq!(report.remaining, 0);
    }

    #[test]
    fn network_failure_blocks_queue_and_caps_retries() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let q = OfflineQueue::new(store.clone());
        let t0 = Utc::now();
        let first = queued(&q, t0);
        queued(&q, t0);

        let mut calls = 0;
        let mut offline = |_: &SyncOperation| -> Result<SyncOperation, SyncError> {
            calls += 1;
            Err(SyncError::network("down"))
        };
        let r1 = q.drain(t0, &mut offline).unwrap();
        assert_eq!((r1.requeued, r1.remaining), (1, 2));

        // still inside the 1s window: nothing attempted
        let r2 = q.drain(t0, &mut offline).unwrap();
        assert_eq!(r2.requeued, 0);

        let r3 = q.drain(t0 + Duration::seconds(1), &mut offline).unwrap();
        assert_eq!(r3.requeued, 1);
        let r4 = q.drain(t0 + Duration::seconds(3), &mut offline).unwrap();
        assert_eq!(r4.abandoned.len(), 1);
        assert_eq!(r4.abandoned[0].id, first.id);
        assert_eq!(r4.abandoned[0].status, OperationStatus::Error);
        assert_eq!(calls, 4);

        let history = store.load_history().unwrap();
        assert_eq!(history.find(&first.id).unwrap().status, OperationStatus::Error);
        assert_eq!(history.pending_operations.len(), 1);
    }

    #[test]
    fn non_network_failure_is_terminal_and_drain_continues() {
        let dir = TempDir::new().unwrap();
        let q = OfflineQueue::new(StateStore::new(dir.path()));
        let now = Utc::now();
        let bad = queued(&q, now);
        queued(&q, now);

        let report = q
            .drain(now, |op| {
                if op.id == bad.id {
                    Err(SyncError::Transport("rejected".into()))
                } else {
                    finish(op)
                }
            })
            .unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.replayed.len(), 1);
        assert_eq!(report.remaining, 0);
    }

    #[test]
    fn only_pending_operations_are_queued() {
        let dir = TempDir::new().unwrap();
        let q = OfflineQueue::new(StateStore::new(dir.path()));
        let now = Utc::now();
        let mut op = SyncOperation::new(MemberId::from("a"), OperationKind::Pull, now);
        op.transition(OperationStatus::InProgress, now).unwrap();
        assert!(matches!(q.enqueue(op, "x", now), Err(SyncError::Validation(_))));
    }
}
