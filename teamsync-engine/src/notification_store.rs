//! Persisted notification queue (`state/notifications.json`).
//!
//! Flushed batches land here as unread notifications for the local member.
//! Expired entries are pruned on every load and save.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use teamsync_core::config::SyncSettings;
use teamsync_core::types::{Notification, NotificationId};

use crate::atomic::{load_json_or_default, save_json};
use crate::error::SyncError;

pub const NOTIFICATIONS_FILE: &str = "notifications.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub batch_interval_minutes: u64,
    #[serde(default)]
    pub last_batch_sent: Option<DateTime<Utc>>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_interval_minutes: 5,
            last_batch_sent: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationQueueFile {
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub settings: NotificationSettings,
}

impl NotificationQueueFile {
    fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.notifications.len();
        self.notifications.retain(|n| !n.is_expired(now));
        before - self.notifications.len()
    }
}

#[derive(Debug, Clone)]
pub struct NotificationStore {
    path: PathBuf,
}

impl NotificationStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(NOTIFICATIONS_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self, now: DateTime<Utc>) -> Result<NotificationQueueFile, SyncError> {
        let mut file: NotificationQueueFile = load_json_or_default(&self.path)?;
        let pruned = file.prune(now);
        if pruned > 0 {
            tracing::debug!(pruned, "pruned expired notifications");
        }
        Ok(file)
    }

    pub fn save(&self, file: &mut NotificationQueueFile, now: DateTime<Utc>) -> Result<(), SyncError> {
        file.prune(now);
        save_json(&self.path, file)
    }

    /// Mirror the project's settings into the file header.
    pub fn sync_settings(&self, settings: &SyncSettings, now: DateTime<Utc>) -> Result<(), SyncError> {
        let mut file = self.load(now)?;
        file.settings.enabled = settings.notifications_enabled;
        file.settings.batch_interval_minutes = settings.batch_interval_minutes;
        self.save(&mut file, now)
    }

    /// Persist one flushed batch.
    pub fn append_batch(&self, batch: Vec<Notification>, now: DateTime<Utc>) -> Result<usize, SyncError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let mut file = self.load(now)?;
        let count = batch.len();
        file.notifications.extend(batch);
        file.settings.last_batch_sent = Some(now);
        self.save(&mut file, now)?;
        tracing::info!(count, "delivered notification batch");
        Ok(count)
    }

    pub fn unread(&self, now: DateTime<Utc>) -> Result<Vec<Notification>, SyncError> {
        Ok(self
            .load(now)?
            .notifications
            .into_iter()
            .filter(|n| !n.read)
            .collect())
    }

    /// Mark one notification read (`Some(id)`) or all of them (`None`).
    /// Returns how many changed.
    pub fn mark_read(&self, id: Option<&NotificationId>, now: DateTime<Utc>) -> Result<usize, SyncError> {
        let mut file = self.load(now)?;
        let mut changed = 0;
        for n in file
            .notifications
            .iter_mut()
            .filter(|n| !n.read && id.map_or(true, |id| &n.id == id))
        {
            n.read = true;
            changed += 1;
        }
        if changed > 0 {
            self.save(&mut file, now)?;
        }
        Ok(changed)
    }
}
