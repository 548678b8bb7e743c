pub mod config;
pub mod dispatch;
pub mod engine;
pub mod humanize;
pub mod model;
pub mod observability;
pub mod resume;

pub use dispatch::{AlertDispatcher, ChangeEvent, ChangeKind, EventBus, HandleIndex, ItemCommands};
pub use engine::{Alert, TorrentHandle, TorrentSession};
pub use model::{ItemId, ItemSnapshot, ItemStatus, ItemTree};
