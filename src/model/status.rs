//! Item status values and the transition table that moves between them.
//!
//! The table knows nothing about engine types: the dispatcher maps engine
//! states onto [`ItemStatus`] first and then feeds a [`StatusEvent`] through
//! [`transition`]. User commands go through the same function.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of download an item represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DownloadType {
    #[default]
    RemoteUrl,
    LocalFile,
    TorrentFile,
    MagnetLink,
}

impl DownloadType {
    pub const ALL: [DownloadType; 4] = [
        DownloadType::RemoteUrl,
        DownloadType::LocalFile,
        DownloadType::TorrentFile,
        DownloadType::MagnetLink,
    ];

    /// Downloads driven by the torrent engine
    pub fn is_torrent(self) -> bool {
        matches!(self, DownloadType::TorrentFile | DownloadType::MagnetLink)
    }
}

/// Lifecycle status of a download item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Waiting,
    Queued,
    Downloading,
    Connecting,
    Finished,
    Paused,
    Error,
    RootStatus,
    Seeding,
    Stalled,
    Starting,
    Stopped,
    Unknown,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 13] = [
        ItemStatus::Waiting,
        ItemStatus::Queued,
        ItemStatus::Downloading,
        ItemStatus::Connecting,
        ItemStatus::Finished,
        ItemStatus::Paused,
        ItemStatus::Error,
        ItemStatus::RootStatus,
        ItemStatus::Seeding,
        ItemStatus::Stalled,
        ItemStatus::Starting,
        ItemStatus::Stopped,
        ItemStatus::Unknown,
    ];

    pub fn is_completed(self) -> bool {
        matches!(
            self,
            ItemStatus::Finished | ItemStatus::Seeding | ItemStatus::Error
        )
    }

    pub fn can_pause(self) -> bool {
        !matches!(
            self,
            ItemStatus::Paused | ItemStatus::Stopped | ItemStatus::Error | ItemStatus::Finished
        )
    }

    pub fn can_resume(self, download_type: DownloadType) -> bool {
        let torrent = download_type.is_torrent();
        matches!(
            self,
            ItemStatus::Paused | ItemStatus::Stopped | ItemStatus::Error
        ) || (torrent && matches!(self, ItemStatus::Finished | ItemStatus::Error))
    }

    pub fn can_cancel(self) -> bool {
        !matches!(self, ItemStatus::Finished | ItemStatus::Seeding)
    }

    /// Statuses a paused item may return to on resume
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ItemStatus::Downloading
                | ItemStatus::Connecting
                | ItemStatus::Seeding
                | ItemStatus::Stalled
                | ItemStatus::Starting
                | ItemStatus::Finished
        )
    }

    pub fn status_name(self) -> &'static str {
        match self {
            ItemStatus::Waiting => "waiting",
            ItemStatus::Queued => "queued",
            ItemStatus::Downloading => "downloading",
            ItemStatus::Connecting => "connecting",
            ItemStatus::Finished => "finished",
            ItemStatus::Paused => "paused",
            ItemStatus::Error => "error",
            ItemStatus::RootStatus => "root",
            ItemStatus::Seeding => "seeding",
            ItemStatus::Stalled => "stalled",
            ItemStatus::Starting => "starting",
            ItemStatus::Stopped => "stopped",
            ItemStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status_name())
    }
}

/// Input to the status table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// Engine reported a lifecycle state, already mapped to an item status
    Reported(ItemStatus),
    Paused,
    Resumed,
    Failed,
}

/// Compute the next status.
///
/// `last_active` is the most recent active status the item held; a resume
/// returns to it when the item was halted, so a paused seed resumes seeding.
/// A finished torrent resumes into seeding; only torrents may resume from
/// `Finished`, so the table does not need the download type. A resume that
/// arrives while the item is otherwise active leaves it alone.
pub fn transition(
    current: ItemStatus,
    last_active: Option<ItemStatus>,
    event: StatusEvent,
) -> ItemStatus {
    match event {
        StatusEvent::Reported(status) => status,
        StatusEvent::Paused => ItemStatus::Paused,
        StatusEvent::Failed => ItemStatus::Error,
        StatusEvent::Resumed => match current {
            ItemStatus::Paused | ItemStatus::Stopped | ItemStatus::Error => last_active
                .filter(|status| status.is_active())
                .unwrap_or(ItemStatus::Downloading),
            ItemStatus::Finished => ItemStatus::Seeding,
            status if status.is_active() => status,
            _ => ItemStatus::Downloading,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicate_table_for_every_status_and_type() {
        for download_type in DownloadType::ALL {
            let torrent = download_type.is_torrent();
            for status in ItemStatus::ALL {
                use ItemStatus::*;

                let completed = matches!(status, Finished | Seeding | Error);
                let pausable = !matches!(status, Paused | Stopped | Error | Finished);
                let resumable = matches!(status, Paused | Stopped | Error)
                    || (torrent && status == Finished);
                let cancellable = !matches!(status, Finished | Seeding);

                assert_eq!(status.is_completed(), completed, "{status} completed");
                assert_eq!(status.can_pause(), pausable, "{status} pause");
                assert_eq!(
                    status.can_resume(download_type),
                    resumable,
                    "{status} resume as {download_type:?}"
                );
                assert_eq!(status.can_cancel(), cancellable, "{status} cancel");
            }
        }
    }

    #[test]
    fn test_finished_resumable_only_for_torrents() {
        assert!(!ItemStatus::Finished.can_resume(DownloadType::RemoteUrl));
        assert!(!ItemStatus::Finished.can_resume(DownloadType::LocalFile));
        assert!(ItemStatus::Finished.can_resume(DownloadType::TorrentFile));
        assert!(ItemStatus::Finished.can_resume(DownloadType::MagnetLink));
    }

    #[test]
    fn test_reported_status_wins() {
        let next = transition(
            ItemStatus::Paused,
            None,
            StatusEvent::Reported(ItemStatus::Seeding),
        );
        assert_eq!(next, ItemStatus::Seeding);
    }

    #[test]
    fn test_resume_restores_last_active() {
        let next = transition(
            ItemStatus::Paused,
            Some(ItemStatus::Seeding),
            StatusEvent::Resumed,
        );
        assert_eq!(next, ItemStatus::Seeding);

        let next = transition(ItemStatus::Paused, None, StatusEvent::Resumed);
        assert_eq!(next, ItemStatus::Downloading);
    }

    #[test]
    fn test_resume_while_active_is_noop() {
        let next = transition(
            ItemStatus::Seeding,
            Some(ItemStatus::Downloading),
            StatusEvent::Resumed,
        );
        assert_eq!(next, ItemStatus::Seeding);
    }

    #[test]
    fn test_resume_finished_torrent_seeds() {
        let next = transition(
            ItemStatus::Finished,
            Some(ItemStatus::Downloading),
            StatusEvent::Resumed,
        );
        assert_eq!(next, ItemStatus::Seeding);
    }

    #[test]
    fn test_resume_from_queued_starts_download() {
        let next = transition(ItemStatus::Queued, None, StatusEvent::Resumed);
        assert_eq!(next, ItemStatus::Downloading);
    }

    #[test]
    fn test_pause_and_fail() {
        assert_eq!(
            transition(ItemStatus::Downloading, None, StatusEvent::Paused),
            ItemStatus::Paused
        );
        assert_eq!(
            transition(ItemStatus::Seeding, None, StatusEvent::Failed),
            ItemStatus::Error
        );
    }

    #[test]
    fn test_status_names_are_stable() {
        assert_eq!(ItemStatus::RootStatus.to_string(), "root");
        assert_eq!(
            serde_json::to_string(&ItemStatus::RootStatus).unwrap(),
            "\"root_status\""
        );
    }
}
