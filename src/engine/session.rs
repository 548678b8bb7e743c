//! Handle-keyed queries against the torrent engine

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use super::alert::TorrentHandle;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine has no torrent for {0}")]
    UnknownTorrent(TorrentHandle),

    #[error("metadata not available for {0}")]
    MetadataUnavailable(TorrentHandle),

    #[error("engine query failed: {0}")]
    Query(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentFileEntry {
    pub path: String,
    pub size: u64,
}

/// File list and placement the engine reports once metadata is known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentMetadata {
    pub name: String,
    #[serde(default)]
    pub save_path: String,
    #[serde(default)]
    pub files: Vec<TorrentFileEntry>,
}

impl TorrentMetadata {
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|file| file.size).sum()
    }
}

/// Engine state queried reactively by the dispatcher
pub trait TorrentSession: Send + Sync {
    fn metadata(&self, handle: TorrentHandle) -> Result<TorrentMetadata, EngineError>;
}

/// In-memory session with pre-registered answers
#[derive(Debug, Default)]
pub struct ScriptedSession {
    metadata: RwLock<HashMap<TorrentHandle, TorrentMetadata>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, handle: TorrentHandle, metadata: TorrentMetadata) {
        self.metadata.write().insert(handle, metadata);
    }
}

impl TorrentSession for ScriptedSession {
    fn metadata(&self, handle: TorrentHandle) -> Result<TorrentMetadata, EngineError> {
        self.metadata
            .read()
            .get(&handle)
            .cloned()
            .ok_or(EngineError::MetadataUnavailable(handle))
    }
}
