//! Download items: records, their status rules, and the tree that holds them

pub mod record;
pub mod status;
pub mod tree;

pub use record::{ErrorCode, ItemId, ItemRecord, ItemSnapshot, NewItem};
pub use status::{DownloadType, ItemStatus, StatusEvent, transition};
pub use tree::{ItemTree, TreeError};
