//! Download item record and its snapshot type.
//!
//! Fields that carry invariants (status and its timestamp, byte counters,
//! error state) are private and only change through the mutators below,
//! each of which reports whether anything observable changed.

use bon::Builder;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::status::{DownloadType, ItemStatus, StatusEvent, transition};
use crate::humanize;

/// Stable item identifier, never reused within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Item-level error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    #[default]
    None,
    File,
    StorageMove,
    EngineQuery,
    TorrentAdd,
}

/// Parameters for a new item; the tree assigns the id
#[derive(Debug, Clone, Builder, Deserialize)]
pub struct NewItem {
    #[builder(into)]
    pub initial_url: String,
    #[builder(default)]
    #[serde(default)]
    pub download_type: DownloadType,
    #[builder(default = ItemStatus::Queued)]
    #[serde(default = "default_status")]
    pub status: ItemStatus,
    #[builder(default)]
    #[serde(default)]
    pub size: u64,
    #[builder(default, into)]
    #[serde(default)]
    pub downloaded_file_name: String,
    #[builder(default, into)]
    #[serde(default)]
    pub hash: String,
    #[builder(default, into)]
    #[serde(default)]
    pub torrent_save_path: String,
    #[builder(default)]
    #[serde(default)]
    pub priority: i32,
}

fn default_status() -> ItemStatus {
    ItemStatus::Queued
}

/// One node's worth of download state
#[derive(Debug, Clone)]
pub struct ItemRecord {
    id: ItemId,
    download_type: DownloadType,
    status: ItemStatus,
    status_last_changed: DateTime<Utc>,
    last_active: Option<ItemStatus>,
    size: u64,
    size_curr_downl: u64,
    percent_download: u8,
    speed: u64,
    speed_upload: u64,
    error_code: ErrorCode,
    error_description: String,
    priority: i32,
    removal_pending: bool,

    pub initial_url: String,
    pub actual_url: String,
    pub source: String,
    pub downloaded_file_name: String,
    pub hash: String,
    pub torrent_save_path: String,
    pub torrent_files_priorities: Vec<i32>,
    pub waiting_time: u32,
}

impl ItemRecord {
    pub fn new(id: ItemId, item: NewItem) -> Self {
        Self {
            id,
            download_type: item.download_type,
            status: item.status,
            status_last_changed: Utc::now(),
            last_active: item.status.is_active().then_some(item.status),
            size: item.size,
            size_curr_downl: 0,
            percent_download: 0,
            speed: 0,
            speed_upload: 0,
            error_code: ErrorCode::None,
            error_description: String::new(),
            priority: item.priority,
            removal_pending: false,
            actual_url: item.initial_url.clone(),
            initial_url: item.initial_url,
            source: String::new(),
            downloaded_file_name: item.downloaded_file_name,
            hash: item.hash,
            torrent_save_path: item.torrent_save_path,
            torrent_files_priorities: Vec::new(),
            waiting_time: 0,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn download_type(&self) -> DownloadType {
        self.download_type
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn status_last_changed(&self) -> DateTime<Utc> {
        self.status_last_changed
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn size_curr_downl(&self) -> u64 {
        self.size_curr_downl
    }

    pub fn percent_download(&self) -> u8 {
        self.percent_download
    }

    pub fn speed(&self) -> u64 {
        self.speed
    }

    pub fn speed_upload(&self) -> u64 {
        self.speed_upload
    }

    pub fn error_code(&self) -> ErrorCode {
        self.error_code
    }

    pub fn error_description(&self) -> &str {
        &self.error_description
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn removal_pending(&self) -> bool {
        self.removal_pending
    }

    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    pub fn can_pause(&self) -> bool {
        self.status.can_pause()
    }

    pub fn can_resume(&self) -> bool {
        self.status.can_resume(self.download_type)
    }

    pub fn can_cancel(&self) -> bool {
        self.status.can_cancel()
    }

    pub fn size_for_view(&self) -> String {
        humanize::format_size(self.size)
    }

    /// Set the status; a no-op when unchanged.
    ///
    /// The timestamp moves with the status in the same call and strictly
    /// increases across changes, even when the clock has not advanced.
    pub fn set_status(&mut self, status: ItemStatus) -> bool {
        if self.status == status {
            return false;
        }

        let now = Utc::now();
        self.status_last_changed = if now > self.status_last_changed {
            now
        } else {
            self.status_last_changed + Duration::nanoseconds(1)
        };
        self.status = status;
        if status.is_active() {
            self.last_active = Some(status);
        }
        true
    }

    /// Run an event through the status table
    pub fn apply(&mut self, event: StatusEvent) -> bool {
        let next = transition(self.status, self.last_active, event);
        self.set_status(next)
    }

    /// Set the total size. Frozen once the item is completed.
    pub fn set_size(&mut self, size: u64) -> bool {
        if self.is_completed() || self.size == size {
            return false;
        }
        self.size = size;
        if size > 0 && self.size_curr_downl > size {
            self.size_curr_downl = size;
        }
        self.recompute_percent();
        true
    }

    /// Set the downloaded byte count, clamped to the total when known.
    ///
    /// Never decreases; use [`ItemRecord::reset_progress`] to restart.
    pub fn set_size_curr_downl(&mut self, downloaded: u64) -> bool {
        if self.is_completed() {
            return false;
        }
        let downloaded = if self.size > 0 {
            downloaded.min(self.size)
        } else {
            downloaded
        };
        if downloaded <= self.size_curr_downl {
            return false;
        }
        self.size_curr_downl = downloaded;
        self.recompute_percent();
        true
    }

    /// Engine-reported progress, in percent
    pub fn set_percent_download(&mut self, percent: u8) -> bool {
        let percent = percent.min(100);
        if self.is_completed() || self.percent_download == percent {
            return false;
        }
        self.percent_download = percent;
        true
    }

    pub fn set_speed(&mut self, bytes_per_sec: u64) -> bool {
        if self.speed == bytes_per_sec {
            return false;
        }
        self.speed = bytes_per_sec;
        true
    }

    pub fn set_speed_upload(&mut self, bytes_per_sec: u64) -> bool {
        if self.speed_upload == bytes_per_sec {
            return false;
        }
        self.speed_upload = bytes_per_sec;
        true
    }

    pub fn set_error(&mut self, code: ErrorCode, description: impl Into<String>) -> bool {
        let description = description.into();
        if self.error_code == code && self.error_description == description {
            return false;
        }
        self.error_code = code;
        self.error_description = description;
        true
    }

    pub fn clear_error(&mut self) -> bool {
        self.set_error(ErrorCode::None, String::new())
    }

    pub fn set_priority(&mut self, priority: i32) -> bool {
        if self.priority == priority {
            return false;
        }
        self.priority = priority;
        true
    }

    pub fn mark_for_removal(&mut self) -> bool {
        !std::mem::replace(&mut self.removal_pending, true)
    }

    /// Administrative reset: the only path that lowers the byte counters
    /// or touches them on a completed item.
    pub fn reset_progress(&mut self) -> bool {
        let changed = self.size_curr_downl != 0
            || self.percent_download != 0
            || self.speed != 0
            || self.speed_upload != 0
            || self.error_code != ErrorCode::None;
        self.size_curr_downl = 0;
        self.percent_download = 0;
        self.speed = 0;
        self.speed_upload = 0;
        self.clear_error();
        changed
    }

    fn recompute_percent(&mut self) {
        if self.size > 0 {
            self.percent_download = (self.size_curr_downl.saturating_mul(100) / self.size) as u8;
        }
    }

    /// Immutable copy of the observable fields
    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            id: self.id,
            download_type: self.download_type,
            status: self.status,
            status_last_changed: self.status_last_changed,
            size: self.size,
            size_curr_downl: self.size_curr_downl,
            percent_download: self.percent_download,
            speed: self.speed,
            speed_upload: self.speed_upload,
            error_code: self.error_code,
            error_description: self.error_description.clone(),
            priority: self.priority,
            downloaded_file_name: self.downloaded_file_name.clone(),
            torrent_save_path: self.torrent_save_path.clone(),
            removal_pending: self.removal_pending,
        }
    }
}

/// Item state captured at notification time, safe to send across threads
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemSnapshot {
    pub id: ItemId,
    pub download_type: DownloadType,
    pub status: ItemStatus,
    pub status_last_changed: DateTime<Utc>,
    pub size: u64,
    pub size_curr_downl: u64,
    pub percent_download: u8,
    pub speed: u64,
    pub speed_upload: u64,
    pub error_code: ErrorCode,
    pub error_description: String,
    pub priority: i32,
    pub downloaded_file_name: String,
    pub torrent_save_path: String,
    pub removal_pending: bool,
}

impl ItemSnapshot {
    pub fn is_completed(&self) -> bool {
        self.status.is_completed()
    }

    pub fn can_pause(&self) -> bool {
        self.status.can_pause()
    }

    pub fn can_resume(&self) -> bool {
        self.status.can_resume(self.download_type)
    }

    pub fn can_cancel(&self) -> bool {
        self.status.can_cancel()
    }
}
