//! User-initiated item commands.
//!
//! [`ItemCommands`] shares the tree, handle index and event bus with an
//! [`AlertDispatcher`](super::AlertDispatcher), so a pause from the user and
//! a pause from the engine reach observers the same way. It is cheap to
//! clone and stays usable after the dispatcher moves into its task.

use std::sync::Arc;
use tracing::{debug, info};

use super::events::{ChangeEvent, ChangeKind, EventBus};
use super::handles::HandleIndex;
use crate::model::{ItemId, ItemSnapshot, ItemTree, NewItem, TreeError};
use crate::observability::Metrics;

pub type Result<T> = std::result::Result<T, TreeError>;

#[derive(Clone)]
pub struct ItemCommands {
    tree: Arc<ItemTree>,
    handles: Arc<HandleIndex>,
    events: EventBus,
    metrics: Arc<Metrics>,
}

impl ItemCommands {
    pub fn new(
        tree: Arc<ItemTree>,
        handles: Arc<HandleIndex>,
        events: EventBus,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            tree,
            handles,
            events,
            metrics,
        }
    }

    pub fn tree(&self) -> &Arc<ItemTree> {
        &self.tree
    }

    pub fn add(&self, item: NewItem) -> ItemId {
        let id = self.tree.add(item);
        self.announce(id);
        id
    }

    pub fn add_child(&self, parent: ItemId, item: NewItem) -> Result<ItemId> {
        let id = self.tree.add_child(parent, item)?;
        self.announce(id);
        Ok(id)
    }

    pub fn pause(&self, id: ItemId) -> Result<bool> {
        let (changed, snapshot) = self.tree.pause(id)?;
        if changed {
            info!(item_id = %id, "Paused by user");
            self.emit(ChangeKind::StatusChanged, snapshot);
        }
        Ok(changed)
    }

    pub fn resume(&self, id: ItemId) -> Result<bool> {
        let (changed, snapshot) = self.tree.resume(id)?;
        if changed {
            info!(item_id = %id, status = %snapshot.status, "Resumed by user");
            self.emit(ChangeKind::StatusChanged, snapshot);
        }
        Ok(changed)
    }

    /// Cancel and drop the item; its handle is retired
    pub fn cancel(&self, id: ItemId) -> Result<ItemSnapshot> {
        let snapshot = self.tree.cancel(id)?;
        info!(item_id = %id, "Cancelled by user");
        self.removed(snapshot.clone());
        Ok(snapshot)
    }

    pub fn remove(&self, id: ItemId) -> Result<ItemSnapshot> {
        let snapshot = self.tree.remove(id)?;
        self.removed(snapshot.clone());
        Ok(snapshot)
    }

    pub fn set_priority(&self, id: ItemId, priority: i32) -> Result<bool> {
        let (changed, snapshot) = self.tree.update(id, |r| r.set_priority(priority))?;
        if changed {
            self.emit(ChangeKind::PriorityChanged, snapshot);
        }
        Ok(changed)
    }

    pub fn reset_progress(&self, id: ItemId) -> Result<bool> {
        let (changed, snapshot) = self.tree.update(id, |r| r.reset_progress())?;
        if changed {
            self.emit(ChangeKind::SizeCurrDownlChanged, snapshot);
        }
        Ok(changed)
    }

    pub fn delete_all_finished(&self) -> Vec<ItemId> {
        let removed = self.tree.delete_all_finished();
        debug!(count = removed.len(), "Deleted finished items");
        removed.into_iter().map(|s| self.removed(s)).collect()
    }

    /// Drop items the engine reported as removed
    pub fn purge_marked(&self) -> Vec<ItemId> {
        let removed = self.tree.purge_marked();
        debug!(count = removed.len(), "Purged removed torrents");
        removed.into_iter().map(|s| self.removed(s)).collect()
    }

    fn announce(&self, id: ItemId) {
        if let Some(snapshot) = self.tree.snapshot(id) {
            self.emit(ChangeKind::ItemAdded, snapshot);
        }
    }

    fn removed(&self, snapshot: ItemSnapshot) -> ItemId {
        let id = snapshot.id;
        if let Some(handle) = self.handles.unbind_item(id) {
            debug!(item_id = %id, %handle, "Handle retired with its item");
        }
        self.emit(ChangeKind::ItemRemoved, snapshot);
        id
    }

    fn emit(&self, kind: ChangeKind, snapshot: ItemSnapshot) {
        self.events.publish(ChangeEvent {
            kind,
            item: Arc::new(snapshot),
        });
        self.metrics.event_emitted();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TorrentHandle;
    use crate::model::{DownloadType, ItemStatus};
    use tokio::sync::mpsc::UnboundedReceiver;

    fn commands() -> (ItemCommands, UnboundedReceiver<ChangeEvent>) {
        let events = EventBus::new();
        let rx = events.subscribe();
        let commands = ItemCommands::new(
            Arc::new(ItemTree::new()),
            Arc::new(HandleIndex::new()),
            events,
            Arc::new(Metrics::new()),
        );
        (commands, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<ChangeEvent>) -> Vec<ChangeEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    fn downloading(commands: &ItemCommands) -> ItemId {
        commands.tree().add(
            NewItem::builder()
                .initial_url("https://example.com/a.iso")
                .status(ItemStatus::Downloading)
                .build(),
        )
    }

    #[test]
    fn test_pause_emits_one_status_change() {
        let (commands, mut rx) = commands();
        let id = downloading(&commands);

        assert!(commands.pause(id).unwrap());
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::StatusChanged);
        assert_eq!(events[0].item.status, ItemStatus::Paused);

        assert!(commands.pause(id).is_err());
        assert!(drain(&mut rx).is_empty());

        assert!(commands.resume(id).unwrap());
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].item.status, ItemStatus::Downloading);
    }

    #[test]
    fn test_add_and_cancel_are_announced() {
        let (commands, mut rx) = commands();
        let id = commands.add(NewItem::builder().initial_url("https://example.com/b").build());
        commands.handles.bind(TorrentHandle(8), id).unwrap();

        let snapshot = commands.cancel(id).unwrap();
        assert_eq!(snapshot.id, id);
        assert_eq!(commands.handles.lookup(TorrentHandle(8)), None);

        let kinds: Vec<_> = drain(&mut rx).iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ChangeKind::ItemAdded, ChangeKind::ItemRemoved]);
    }

    #[test]
    fn test_refused_cancel_is_silent() {
        let (commands, mut rx) = commands();
        let id = downloading(&commands);
        commands.tree().set_status(id, ItemStatus::Seeding).unwrap();

        assert!(matches!(
            commands.cancel(id),
            Err(TreeError::CommandNotAllowed { command: "cancel", .. })
        ));
        assert!(commands.tree().contains(id));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_priority_only_emits_on_change() {
        let (commands, mut rx) = commands();
        let id = downloading(&commands);

        assert!(commands.set_priority(id, 3).unwrap());
        assert!(!commands.set_priority(id, 3).unwrap());
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::PriorityChanged);
        assert_eq!(events[0].item.priority, 3);
    }

    #[test]
    fn test_delete_finished_announces_each_removal() {
        let (commands, mut rx) = commands();
        let done = commands.tree().add(
            NewItem::builder()
                .initial_url("magnet:?xt=urn:btih:aa")
                .download_type(DownloadType::MagnetLink)
                .status(ItemStatus::Seeding)
                .build(),
        );
        let active = downloading(&commands);

        assert_eq!(commands.delete_all_finished(), vec![done]);
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, ChangeKind::ItemRemoved);
        assert_eq!(events[0].item.id, done);
        assert!(commands.tree().contains(active));
    }
}
