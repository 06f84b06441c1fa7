//! NotificationBatcher: bounded producer/consumer queue of change events.
//!
//! Producers (the sync coordinator, the file watcher) call [`enqueue`], which
//! never waits on the consumer. The consumer calls [`wait_for_work`] (the only
//! blocking call) and then [`flush_if_due`].
//!
//! Flush rules:
//! - due once `batch_interval` has elapsed since the last flush, or
//!   immediately after a high-priority (`conflict_detected`) event;
//! - at most `max_batch` entries per flush, the rest stay queued;
//! - duplicates (same kind, source and files) collapse into one entry;
//! - on overflow the oldest low-priority event is dropped and counted, and
//!   the next flush leads with an "N notifications dropped" summary.
//!
//! [`enqueue`]: NotificationBatcher::enqueue
//! [`wait_for_work`]: NotificationBatcher::wait_for_work
//! [`flush_if_due`]: NotificationBatcher::flush_if_due

use std::collections::{HashSet, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use teamsync_core::config::SyncSettings;
use teamsync_core::types::{MemberId, Notification, NotificationKind};

pub const MAX_BATCH: usize = 10;
pub const DEFAULT_CAPACITY: usize = 100;
/// Longest accepted batch window (one week).
pub const MAX_BATCH_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatcherConfig {
    pub enabled: bool,
    pub batch_interval: Duration,
    pub max_batch: usize,
    pub capacity: usize,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_interval: Duration::minutes(5),
            max_batch: MAX_BATCH,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl BatcherConfig {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            enabled: settings.notifications_enabled,
            batch_interval: batch_interval(settings.batch_interval_minutes),
            ..Self::default()
        }
    }
}

/// Configured minutes as a window, clamped to [`MAX_BATCH_INTERVAL_MINUTES`].
fn batch_interval(minutes: u64) -> Duration {
    if minutes > MAX_BATCH_INTERVAL_MINUTES {
        tracing::warn!(
            configured = minutes,
            max = MAX_BATCH_INTERVAL_MINUTES,
            "batch interval too long; clamping",
        );
    }
    let clamped = i64::try_from(minutes.min(MAX_BATCH_INTERVAL_MINUTES)).unwrap_or(0);
    Duration::minutes(clamped)
}

/// What happened to an enqueued event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    Queued,
    /// Queued, but an older event was dropped to make room.
    QueuedWithDrop,
    /// The queue only held urgent events; this low-priority one was dropped
    /// and counted instead.
    Dropped,
    /// Notifications are disabled; the event was discarded.
    Disabled,
}

#[derive(Debug)]
struct Inner {
    queue: VecDeque<Notification>,
    dropped: usize,
    last_flush: DateTime<Utc>,
    urgent: bool,
}

#[derive(Debug)]
pub struct NotificationBatcher {
    config: BatcherConfig,
    inner: Mutex<Inner>,
    work: Condvar,
}

type DedupKey = (NotificationKind, Option<MemberId>, Vec<String>);

fn dedup_key(n: &Notification) -> DedupKey {
    let mut files = n.affected_files.clone();
    files.sort();
    (n.kind, n.source_member.clone(), files)
}

impl NotificationBatcher {
    /// `now` starts the first batch window.
    pub fn new(config: BatcherConfig, now: DateTime<Utc>) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                dropped: 0,
                last_flush: now,
                urgent: false,
            }),
            work: Condvar::new(),
        }
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking producer must not wedge notification delivery.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn enqueue(&self, notification: Notification) -> Enqueued {
        if !self.config.enabled {
            tracing::debug!(kind = %notification.kind, "notifications disabled; discarding event");
            return Enqueued::Disabled;
        }
        let mut inner = self.lock();
        let mut result = Enqueued::Queued;
        if inner.queue.len() >= self.config.capacity {
            let low = inner.queue.iter().position(|n| !n.kind.is_high_priority());
            let victim = match low {
                Some(idx) => idx,
                None if !notification.kind.is_high_priority() => {
                    inner.dropped += 1;
                    tracing::warn!(
                        kind = %notification.kind,
                        title = %notification.title,
                        dropped_total = inner.dropped,
                        "notification queue full of urgent events; dropped incoming event",
                    );
                    return Enqueued::Dropped;
                }
                None => 0,
            };
            if let Some(dropped) = inner.queue.remove(victim) {
                inner.dropped += 1;
                tracing::warn!(
                    kind = %dropped.kind,
                    title = %dropped.title,
                    dropped_total = inner.dropped,
                    "notification queue full; dropped oldest event",
                );
                result = Enqueued::QueuedWithDrop;
            }
        }
        if notification.kind.is_high_priority() {
            inner.urgent = true;
        }
        inner.queue.push_back(notification);
        drop(inner);
        self.work.notify_all();
        result
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events dropped since the last flush.
    pub fn dropped(&self) -> usize {
        self.lock().dropped
    }

    pub fn last_flush(&self) -> DateTime<Utc> {
        self.lock().last_flush
    }

    fn due(&self, inner: &Inner, now: DateTime<Utc>) -> bool {
        if inner.queue.is_empty() && inner.dropped == 0 {
            return false;
        }
        inner.urgent || now - inner.last_flush >= self.config.batch_interval
    }

    pub fn should_flush(&self, now: DateTime<Utc>) -> bool {
        let inner = self.lock();
        self.due(&inner, now)
    }

    /// Take one batch if a flush trigger has fired.
    pub fn flush_if_due(&self, now: DateTime<Utc>) -> Option<Vec<Notification>> {
        let mut inner = self.lock();
        if !self.due(&inner, now) {
            return None;
        }
        Some(self.take_batch(&mut inner, now))
    }

    /// Take one batch unconditionally (shutdown, explicit user request).
    pub fn flush(&self, now: DateTime<Utc>) -> Vec<Notification> {
        let mut inner = self.lock();
        self.take_batch(&mut inner, now)
    }

    fn take_batch(&self, inner: &mut Inner, now: DateTime<Utc>) -> Vec<Notification> {
        let mut batch = Vec::new();
        if inner.dropped > 0 {
            batch.push(Notification::new(
                NotificationKind::MemoryChanged,
                format!("{} notifications dropped", inner.dropped),
                format!(
                    "{} change events were dropped because the notification queue was full",
                    inner.dropped
                ),
                None,
                Vec::new(),
                now,
            ));
            inner.dropped = 0;
        }

        let mut seen: HashSet<DedupKey> = HashSet::new();
        let mut merged = 0usize;
        while batch.len() < self.config.max_batch {
            let Some(next) = inner.queue.pop_front() else {
                break;
            };
            if seen.insert(dedup_key(&next)) {
                batch.push(next);
            } else {
                merged += 1;
            }
        }

        inner.last_flush = now;
        inner.urgent = inner.queue.iter().any(|n| n.kind.is_high_priority());
        tracing::debug!(
            delivered = batch.len(),
            merged,
            remaining = inner.queue.len(),
            "flushed notification batch",
        );
        batch
    }

    /// Block until there is urgent work or `timeout` elapses. Returns `true`
    /// when woken by an urgent event.
    pub fn wait_for_work(&self, timeout: std::time::Duration) -> bool {
        let inner = self.lock();
        if inner.urgent {
            return true;
        }
        let (inner, _) = self
            .work
            .wait_timeout_while(inner, timeout, |inner| !inner.urgent)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.urgent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn changed(file: &str, who: &str, now: DateTime<Utc>) -> Notification {
        Notification::new(
            NotificationKind::MemoryChanged,
            format!("{file} changed"),
            "",
            Some(MemberId::from(who)),
            vec![file.to_string()],
            now,
        )
    }

    fn conflict(file: &str, now: DateTime<Utc>) -> Notification {
        Notification::new(
            NotificationKind::ConflictDetected,
            "conflict",
            "",
            None,
            vec![file.to_string()],
            now,
        )
    }

    #[test]
    fn fifteen_events_split_across_two_flushes() {
        let t0 = Utc::now();
        let b = NotificationBatcher::new(BatcherConfig::default(), t0);
        for i in 0..15 {
            b.enqueue(changed(&format!("f{i}.md"), "a", t0));
        }
        assert!(b.flush_if_due(t0 + Duration::minutes(1)).is_none());

        let first = b.flush_if_due(t0 + Duration::minutes(5)).expect("due");
        assert_eq!(first.len(), 10);
        assert_eq!(first[0].affected_files, vec!["f0.md".to_string()]);
        assert!(b.flush_if_due(t0 + Duration::minutes(6)).is_none());

        let second = b.flush_if_due(t0 + Duration::minutes(10)).expect("due");
        assert_eq!(second.len(), 5);
        assert_eq!(second[0].affected_files, vec!["f10.md".to_string()]);
        assert!(b.is_empty());
    }

    #[test]
    fn conflict_flushes_immediately() {
        let t0 = Utc::now();
        let b = NotificationBatcher::new(BatcherConfig::default(), t0);
        b.enqueue(changed("a.md", "x", t0));
        assert!(!b.should_flush(t0));
        b.enqueue(conflict("a.md", t0));
        let batch = b.flush_if_due(t0).expect("urgent");
        assert_eq!(batch.len(), 2);
        assert!(!b.should_flush(t0));
    }

    #[test]
    fn duplicates_collapse_within_a_flush() {
        let t0 = Utc::now();
        let b = NotificationBatcher::new(BatcherConfig::default(), t0);
        b.enqueue(changed("a.md", "x", t0));
        b.enqueue(changed("a.md", "x", t0));
        b.enqueue(changed("a.md", "y", t0));
        let batch = b.flush(t0);
        assert_eq!(batch.len(), 2);
    }

    #[test]
    fn overflow_drops_low_priority_and_reports_it() {
        let t0 = Utc::now();
        let config = BatcherConfig {
            capacity: 3,
            ..BatcherConfig::default()
        };
        let b = NotificationBatcher::new(config, t0);
        b.enqueue(conflict("c.md", t0));
        b.enqueue(changed("a.md", "x", t0));
        b.enqueue(changed("b.md", "x", t0));
        assert_eq!(b.enqueue(changed("d.md", "x", t0)), Enqueued::QueuedWithDrop);
        assert_eq!(b.dropped(), 1);

        let batch = b.flush(t0);
        assert_eq!(batch[0].title, "1 notifications dropped");
        let files: Vec<_> = batch[1..].iter().map(|n| n.affected_files[0].as_str()).collect();
        assert_eq!(files, vec!["c.md", "b.md", "d.md"]);
        assert_eq!(b.dropped(), 0);
    }

    #[test]
    fn full_urgent_queue_drops_incoming_low_priority_event() {
        let t0 = Utc::now();
        let config = BatcherConfig {
            capacity: 2,
            ..BatcherConfig::default()
        };
        let b = NotificationBatcher::new(config, t0);
        b.enqueue(conflict("a.md", t0));
        b.enqueue(conflict("b.md", t0));
        assert_eq!(b.enqueue(changed("c.md", "x", t0)), Enqueued::Dropped);
        assert_eq!(b.len(), 2);
        assert_eq!(b.dropped(), 1);

        let batch = b.flush(t0);
        assert_eq!(batch[0].title, "1 notifications dropped");
        let files: Vec<_> = batch[1..].iter().map(|n| n.affected_files[0].as_str()).collect();
        assert_eq!(files, vec!["a.md", "b.md"]);
    }

    #[test]
    fn full_urgent_queue_still_takes_urgent_event() {
        let t0 = Utc::now();
        let config = BatcherConfig {
            capacity: 1,
            ..BatcherConfig::default()
        };
        let b = NotificationBatcher::new(config, t0);
        b.enqueue(conflict("a.md", t0));
        assert_eq!(b.enqueue(conflict("b.md", t0)), Enqueued::QueuedWithDrop);
        let batch = b.flush(t0);
        assert_eq!(batch.last().unwrap().affected_files, vec!["b.md".to_string()]);
    }

    #[test]
    fn huge_interval_is_clamped() {
        let settings = SyncSettings {
            batch_interval_minutes: u64::MAX,
            ..SyncSettings::default()
        };
        let config = BatcherConfig::from_settings(&settings);
        assert_eq!(config.batch_interval, Duration::minutes(MAX_BATCH_INTERVAL_MINUTES as i64));

        let t0 = Utc::now();
        let b = NotificationBatcher::new(config, t0);
        b.enqueue(changed("a.md", "x", t0));
        assert!(!b.should_flush(t0 + Duration::days(1)));
        assert!(b.should_flush(t0 + Duration::days(8)));
    }

    #[test]
    fn disabled_batcher_discards() {
        let t0 = Utc::now();
        let config = BatcherConfig {
            enabled: false,
            ..BatcherConfig::default()
        };
        let b = NotificationBatcher::new(config, t0);
        assert_eq!(b.enqueue(changed("a.md", "x", t0)), Enqueued::Disabled);
        assert!(b.is_empty());
    }

    #[test]
    fn waiting_consumer_wakes_on_urgent_event() {
        let b = Arc::new(NotificationBatcher::new(BatcherConfig::default(), Utc::now()));
        let producer = {
            let b = b.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(50));
                b.enqueue(conflict("x.md", Utc::now()));
            })
        };
        assert!(b.wait_for_work(std::time::Duration::from_secs(5)));
        producer.join().unwrap();
    }
}
