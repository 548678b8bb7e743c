//! Item change notifications and their fan-out to observers

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::model::ItemSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    StatusChanged,
    SizeChanged,
    SizeCurrDownlChanged,
    SpeedChanged,
    UploadSpeedChanged,
    MetadataReceived,
    ItemMoved,
    MarkedForRemoval,
    PriorityChanged,
    ItemAdded,
    ItemRemoved,
}

/// One observable mutation, with the item as it was right after it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub item: Arc<ItemSnapshot>,
}

/// Fan-out of change events to any number of subscribers.
///
/// Each subscriber gets its own unbounded queue and drains it on its own
/// task or thread; publishing never waits on an observer.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<ChangeEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChangeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver to every live subscriber; closed ones are pruned
    pub fn publish(&self, event: ChangeEvent) {
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemId, ItemRecord, NewItem};

    fn event(kind: ChangeKind) -> ChangeEvent {
        let record = ItemRecord::new(ItemId(1), NewItem::builder().initial_url("u").build());
        ChangeEvent {
            kind,
            item: Arc::new(record.snapshot()),
        }
    }

    #[test]
    fn test_every_subscriber_receives() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(event(ChangeKind::StatusChanged));

        assert_eq!(a.try_recv().unwrap().kind, ChangeKind::StatusChanged);
        assert_eq!(b.try_recv().unwrap().kind, ChangeKind::StatusChanged);
    }

    #[test]
    fn test_closed_subscribers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(event(ChangeKind::SpeedChanged));
        assert_eq!(bus.subscriber_count(), 1);
        drop(kept);
    }

    #[test]
    fn test_event_serializes_with_kind() {
        let json = serde_json::to_value(event(ChangeKind::SizeCurrDownlChanged)).unwrap();
        assert_eq!(json["kind"], "size_curr_downl_changed");
        assert_eq!(json["item"]["id"], 1);
    }
}
