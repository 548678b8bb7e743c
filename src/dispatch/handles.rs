//! Bidirectional engine handle to item id mapping

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::engine::TorrentHandle;
use crate::model::ItemId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandleError {
    #[error("{handle} is already bound to item {existing}")]
    DuplicateHandle {
        handle: TorrentHandle,
        existing: ItemId,
    },

    #[error("item {item} is already bound to {handle}")]
    ItemAlreadyBound { item: ItemId, handle: TorrentHandle },

    #[error("{0} was unbound and cannot be bound again")]
    RetiredHandle(TorrentHandle),
}

#[derive(Default)]
struct Bindings {
    by_handle: HashMap<TorrentHandle, ItemId>,
    by_item: HashMap<ItemId, TorrentHandle>,
    retired: HashSet<TorrentHandle>,
}

/// One-to-one handle/item mapping.
///
/// Lookups share the read lock; bind and unbind take it exclusively.
/// An unbound handle is retired for the life of the index and never
/// resolves to an item again.
#[derive(Default)]
pub struct HandleIndex {
    inner: RwLock<Bindings>,
}

impl HandleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handle` to `item`. Rebinding the same pair is accepted.
    pub fn bind(&self, handle: TorrentHandle, item: ItemId) -> Result<(), HandleError> {
        let mut inner = self.inner.write();
        if inner.retired.contains(&handle) {
            return Err(HandleError::RetiredHandle(handle));
        }
        if let Some(&existing) = inner.by_handle.get(&handle) {
            if existing == item {
                return Ok(());
            }
            return Err(HandleError::DuplicateHandle { handle, existing });
        }
        if let Some(&bound) = inner.by_item.get(&item) {
            return Err(HandleError::ItemAlreadyBound {
                item,
                handle: bound,
            });
        }

        inner.by_handle.insert(handle, item);
        inner.by_item.insert(item, handle);
        Ok(())
    }

    /// Remove and retire the mapping; absent handles are not an error
    pub fn unbind(&self, handle: TorrentHandle) -> Option<ItemId> {
        let mut inner = self.inner.write();
        let item = inner.by_handle.remove(&handle)?;
        inner.by_item.remove(&item);
        inner.retired.insert(handle);
        Some(item)
    }

    /// Unbind whatever handle `item` holds, after a local removal
    pub fn unbind_item(&self, item: ItemId) -> Option<TorrentHandle> {
        let mut inner = self.inner.write();
        let handle = inner.by_item.remove(&item)?;
        inner.by_handle.remove(&handle);
        inner.retired.insert(handle);
        Some(handle)
    }

    pub fn lookup(&self, handle: TorrentHandle) -> Option<ItemId> {
        self.inner.read().by_handle.get(&handle).copied()
    }

    pub fn handle_of(&self, item: ItemId) -> Option<TorrentHandle> {
        self.inner.read().by_item.get(&item).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_bind_lookup_unbind() {
        let index = HandleIndex::new();
        let h = TorrentHandle(1);
        index.bind(h, ItemId(10)).unwrap();
        assert_eq!(index.lookup(h), Some(ItemId(10)));
        assert_eq!(index.handle_of(ItemId(10)), Some(h));

        assert_eq!(index.unbind(h), Some(ItemId(10)));
        assert_eq!(index.lookup(h), None);
        assert_eq!(index.handle_of(ItemId(10)), None);
        assert!(index.is_empty());
    }

    #[test]
    fn test_duplicate_handle_keeps_original() {
        let index = HandleIndex::new();
        let h = TorrentHandle(1);
        index.bind(h, ItemId(10)).unwrap();

        let err = index.bind(h, ItemId(11)).unwrap_err();
        assert_eq!(
            err,
            HandleError::DuplicateHandle {
                handle: h,
                existing: ItemId(10)
            }
        );
        assert_eq!(index.lookup(h), Some(ItemId(10)));
        assert_eq!(index.handle_of(ItemId(11)), None);
    }

    #[test]
    fn test_rebinding_same_pair_is_idempotent() {
        let index = HandleIndex::new();
        index.bind(TorrentHandle(1), ItemId(10)).unwrap();
        index.bind(TorrentHandle(1), ItemId(10)).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_item_bound_twice() {
        let index = HandleIndex::new();
        index.bind(TorrentHandle(1), ItemId(10)).unwrap();
        let err = index.bind(TorrentHandle(2), ItemId(10)).unwrap_err();
        assert!(matches!(err, HandleError::ItemAlreadyBound { .. }));
        assert_eq!(index.lookup(TorrentHandle(2)), None);
    }

    #[test]
    fn test_unbound_handle_is_never_rebound() {
        let index = HandleIndex::new();
        let h = TorrentHandle(3);
        index.bind(h, ItemId(10)).unwrap();
        index.unbind(h);

        let err = index.bind(h, ItemId(11)).unwrap_err();
        assert_eq!(err, HandleError::RetiredHandle(h));
        assert_eq!(index.bind(h, ItemId(10)), Err(HandleError::RetiredHandle(h)));
        assert_eq!(index.lookup(h), None);

        index.bind(TorrentHandle(4), ItemId(11)).unwrap();
        assert_eq!(index.lookup(TorrentHandle(4)), Some(ItemId(11)));
    }

    #[test]
    fn test_unbind_item_retires_its_handle() {
        let index = HandleIndex::new();
        index.bind(TorrentHandle(5), ItemId(20)).unwrap();

        assert_eq!(index.unbind_item(ItemId(20)), Some(TorrentHandle(5)));
        assert_eq!(index.unbind_item(ItemId(20)), None);
        assert_eq!(index.lookup(TorrentHandle(5)), None);
        assert!(index.bind(TorrentHandle(5), ItemId(21)).is_err());
        // the item itself may take a fresh handle
        index.bind(TorrentHandle(6), ItemId(20)).unwrap();
    }

    #[test]
    fn test_unbind_absent_is_noop() {
        let index = HandleIndex::new();
        assert_eq!(index.unbind(TorrentHandle(42)), None);
    }

    #[test]
    fn test_concurrent_lookups_during_churn() {
        let index = Arc::new(HandleIndex::new());
        index.bind(TorrentHandle(0), ItemId(0)).unwrap();

        let writer = {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for i in 1..500u64 {
                    index.bind(TorrentHandle(i), ItemId(i)).unwrap();
                    index.unbind(TorrentHandle(i));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let index = Arc::clone(&index);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        assert_eq!(index.lookup(TorrentHandle(0)), Some(ItemId(0)));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(index.len(), 1);
    }
}
