//! Alert dispatch: handle bookkeeping, the dispatcher, and change events

pub mod commands;
pub mod dispatcher;
pub mod events;
pub mod handles;
pub mod retry;

pub use commands::ItemCommands;
pub use dispatcher::{AlertDispatcher, DEFAULT_RETRY_DELAY, DispatchError, Disposition, spawn};
pub use events::{ChangeEvent, ChangeKind, EventBus};
pub use handles::{HandleError, HandleIndex};
pub use retry::ParkedAlerts;
