//! Boundary with the torrent engine: alerts in, handle-keyed queries out

pub mod alert;
pub mod session;

pub use alert::{Alert, AlertClass, EngineState, TorrentHandle};
pub use session::{EngineError, ScriptedSession, TorrentFileEntry, TorrentMetadata, TorrentSession};
