//! Typed notifications delivered by the torrent engine

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{ItemId, ItemStatus};

/// Opaque engine reference to one in-flight torrent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TorrentHandle(pub u64);

impl fmt::Display for TorrentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "torrent#{}", self.0)
    }
}

/// Engine-side torrent lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    QueuedForChecking,
    CheckingFiles,
    DownloadingMetadata,
    Downloading,
    Finished,
    Seeding,
    Allocating,
    CheckingResumeData,
}

impl EngineState {
    pub fn item_status(self) -> ItemStatus {
        match self {
            EngineState::DownloadingMetadata
            | EngineState::CheckingFiles
            | EngineState::Allocating
            | EngineState::CheckingResumeData => ItemStatus::Starting,
            EngineState::Downloading => ItemStatus::Downloading,
            EngineState::Seeding => ItemStatus::Seeding,
            EngineState::Finished => ItemStatus::Finished,
            EngineState::QueuedForChecking => ItemStatus::Unknown,
        }
    }
}

/// How an alert is treated when its handle is not bound yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertClass {
    /// Removal: an unbound handle is expected and ignored
    Terminal,
    /// May race handle registration; parked and retried once
    Registration,
    /// Anything else; dropped when unbound
    Regular,
}

/// One engine notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Alert {
    StateChanged {
        handle: TorrentHandle,
        state: EngineState,
    },
    TorrentPaused {
        handle: TorrentHandle,
    },
    TorrentResumed {
        handle: TorrentHandle,
    },
    TorrentRemoved {
        handle: TorrentHandle,
    },
    /// Answer to an add request; `item` is the user data attached to it
    TorrentAdded {
        handle: TorrentHandle,
        #[serde(default)]
        item: Option<ItemId>,
        #[serde(default)]
        error: Option<String>,
    },
    TorrentFinished {
        handle: TorrentHandle,
    },
    TorrentChecked {
        handle: TorrentHandle,
    },
    FileError {
        handle: TorrentHandle,
        #[serde(default)]
        file: String,
        message: String,
    },
    FileCompleted {
        handle: TorrentHandle,
        index: usize,
    },
    FileRenamed {
        handle: TorrentHandle,
        index: usize,
        name: String,
    },
    MetadataReceived {
        handle: TorrentHandle,
    },
    SaveResumeData {
        handle: TorrentHandle,
        data: Vec<u8>,
    },
    SaveResumeDataFailed {
        handle: TorrentHandle,
        message: String,
    },
    StorageMoved {
        handle: TorrentHandle,
        path: String,
    },
    StorageMovedFailed {
        handle: TorrentHandle,
        message: String,
    },
    Stats {
        handle: TorrentHandle,
        #[serde(default)]
        total_wanted: u64,
        #[serde(default)]
        total_wanted_done: u64,
        #[serde(default)]
        download_rate: u64,
        #[serde(default)]
        upload_rate: u64,
        /// Engine progress in parts per million
        #[serde(default)]
        progress_ppm: Option<u32>,
    },
    TrackerReply {
        handle: TorrentHandle,
        url: String,
        #[serde(default)]
        message: String,
    },
    TrackerWarning {
        handle: TorrentHandle,
        url: String,
        #[serde(default)]
        message: String,
    },
    TrackerError {
        handle: TorrentHandle,
        url: String,
        #[serde(default)]
        message: String,
    },
    FastresumeRejected {
        handle: TorrentHandle,
        message: String,
    },
    #[serde(other)]
    Unrecognized,
}

impl Alert {
    pub fn kind(&self) -> &'static str {
        match self {
            Alert::StateChanged { .. } => "state_changed",
            Alert::TorrentPaused { .. } => "torrent_paused",
            Alert::TorrentResumed { .. } => "torrent_resumed",
            Alert::TorrentRemoved { .. } => "torrent_removed",
            Alert::TorrentAdded { .. } => "torrent_added",
            Alert::TorrentFinished { .. } => "torrent_finished",
            Alert::TorrentChecked { .. } => "torrent_checked",
            Alert::FileError { .. } => "file_error",
            Alert::FileCompleted { .. } => "file_completed",
            Alert::FileRenamed { .. } => "file_renamed",
            Alert::MetadataReceived { .. } => "metadata_received",
            Alert::SaveResumeData { .. } => "save_resume_data",
            Alert::SaveResumeDataFailed { .. } => "save_resume_data_failed",
            Alert::StorageMoved { .. } => "storage_moved",
            Alert::StorageMovedFailed { .. } => "storage_moved_failed",
            Alert::Stats { .. } => "stats",
            Alert::TrackerReply { .. } => "tracker_reply",
            Alert::TrackerWarning { .. } => "tracker_warning",
            Alert::TrackerError { .. } => "tracker_error",
            Alert::FastresumeRejected { .. } => "fastresume_rejected",
            Alert::Unrecognized => "unrecognized",
        }
    }

    /// Handle the alert concerns; `None` only for unrecognized alerts
    pub fn handle(&self) -> Option<TorrentHandle> {
        match self {
            Alert::StateChanged { handle, .. }
            | Alert::TorrentPaused { handle }
            | Alert::TorrentResumed { handle }
            | Alert::TorrentRemoved { handle }
            | Alert::TorrentAdded { handle, .. }
            | Alert::TorrentFinished { handle }
            | Alert::TorrentChecked { handle }
            | Alert::FileError { handle, .. }
            | Alert::FileCompleted { handle, .. }
            | Alert::FileRenamed { handle, .. }
            | Alert::MetadataReceived { handle }
            | Alert::SaveResumeData { handle, .. }
            | Alert::SaveResumeDataFailed { handle, .. }
            | Alert::StorageMoved { handle, .. }
            | Alert::StorageMovedFailed { handle, .. }
            | Alert::Stats { handle, .. }
            | Alert::TrackerReply { handle, .. }
            | Alert::TrackerWarning { handle, .. }
            | Alert::TrackerError { handle, .. }
            | Alert::FastresumeRejected { handle, .. } => Some(*handle),
            Alert::Unrecognized => None,
        }
    }

    pub fn class(&self) -> AlertClass {
        match self {
            Alert::TorrentRemoved { .. } => AlertClass::Terminal,
            Alert::MetadataReceived { .. } | Alert::StateChanged { .. } => {
                AlertClass::Registration
            }
            _ => AlertClass::Regular,
        }
    }
}
