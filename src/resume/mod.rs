//! Resume-data persistence
//!
//! The engine periodically hands out an opaque resume blob per torrent. The
//! dispatcher forwards it to a [`ResumeSink`] keyed by item id; the sink
//! decides where it goes. [`FjallResumeStore`] keeps it in an embedded
//! fjall keyspace:
//!
//! - `resume` partition: latest blob per item
//! - `metadata` partition: last failure note per item
//!
//! ```rust,ignore
//! use dlbridge::resume::FjallResumeStore;
//!
//! let store = FjallResumeStore::open("data/resume")?;
//! let blob = store.load(item_id)?;
//! ```

pub mod error;
pub mod keys;
pub mod store;

pub use error::{ResumeError, Result};
pub use store::{FjallResumeStore, StoreStats};

use tracing::warn;

use crate::model::ItemId;

/// Destination for engine resume data
pub trait ResumeSink: Send + Sync {
    fn save(&self, item: ItemId, data: &[u8]) -> Result<()>;

    /// The engine could not produce resume data for `item`
    fn report_failure(&self, item: ItemId, message: &str) {
        warn!(item_id = %item, reason = message, "Engine failed to produce resume data");
    }
}
