//! Ordered forest of download items.
//!
//! Structure (parent links, child order, membership) lives behind one
//! `RwLock`; each record sits behind its own `Mutex` so field updates on
//! different items only share the read side of the structural lock.
//!
//! Lock order is always structure first, then record. Closures passed to
//! [`ItemTree::find_item`], [`ItemTree::for_all`] and [`ItemTree::update`]
//! run with both held and must not call back into the tree.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::debug;

use super::record::{ItemId, ItemRecord, ItemSnapshot, NewItem};
use super::status::{ItemStatus, StatusEvent};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("invalid child range {position}..{end} (parent has {len} children)")]
    InvalidPosition {
        position: usize,
        end: usize,
        len: usize,
    },

    #[error("{command} not allowed for item {id} in status {status}")]
    CommandNotAllowed {
        id: ItemId,
        command: &'static str,
        status: ItemStatus,
    },
}

pub type Result<T> = std::result::Result<T, TreeError>;

struct Node {
    record: Mutex<ItemRecord>,
    parent: Option<ItemId>,
    children: Vec<ItemId>,
}

#[derive(Default)]
struct Forest {
    nodes: HashMap<ItemId, Node>,
    roots: Vec<ItemId>,
}

impl Forest {
    fn siblings(&self, parent: Option<ItemId>) -> Result<&Vec<ItemId>> {
        match parent {
            None => Ok(&self.roots),
            Some(id) => self
                .nodes
                .get(&id)
                .map(|node| &node.children)
                .ok_or(TreeError::ItemNotFound(id)),
        }
    }

    fn siblings_mut(&mut self, parent: Option<ItemId>) -> Result<&mut Vec<ItemId>> {
        match parent {
            None => Ok(&mut self.roots),
            Some(id) => self
                .nodes
                .get_mut(&id)
                .map(|node| &mut node.children)
                .ok_or(TreeError::ItemNotFound(id)),
        }
    }

    /// Drop a detached subtree from the node map
    fn release(&mut self, id: ItemId) -> usize {
        let mut released = 0;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children);
                released += 1;
            }
        }
        released
    }

    fn detach(&mut self, id: ItemId) -> Result<()> {
        let parent = self
            .nodes
            .get(&id)
            .ok_or(TreeError::ItemNotFound(id))?
            .parent;
        let siblings = self.siblings_mut(parent)?;
        siblings.retain(|child| *child != id);
        Ok(())
    }

    /// Pre-order walk: each node before its children, children in order
    fn preorder(&self, starts: &[ItemId]) -> Vec<ItemId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<ItemId> = starts.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                order.push(id);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }
}

/// The download item tree
pub struct ItemTree {
    forest: RwLock<Forest>,
    counter: AtomicU64,
}

impl Default for ItemTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemTree {
    pub fn new() -> Self {
        Self {
            forest: RwLock::new(Forest::default()),
            counter: AtomicU64::new(0),
        }
    }

    /// Number of ids handed out so far; ids are never reused
    pub fn current_counter(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.forest.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.forest.read().nodes.contains_key(&id)
    }

    fn next_id(&self) -> ItemId {
        ItemId(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Append a new top-level item
    pub fn add(&self, item: NewItem) -> ItemId {
        let id = self.next_id();
        let mut forest = self.forest.write();
        forest.nodes.insert(
            id,
            Node {
                record: Mutex::new(ItemRecord::new(id, item)),
                parent: None,
                children: Vec::new(),
            },
        );
        forest.roots.push(id);
        debug!(item_id = %id, "Item added");
        id
    }

    /// Append a child under `parent`
    pub fn add_child(&self, parent: ItemId, item: NewItem) -> Result<ItemId> {
        let mut forest = self.forest.write();
        let position = forest.siblings(Some(parent))?.len();
        let mut ids = self.insert_locked(&mut forest, Some(parent), position, vec![item])?;
        ids.pop().ok_or(TreeError::ItemNotFound(parent))
    }

    /// Insert `items` at `position` among `parent`'s children (`None` = roots)
    pub fn insert_children(
        &self,
        parent: Option<ItemId>,
        position: usize,
        items: Vec<NewItem>,
    ) -> Result<Vec<ItemId>> {
        let mut forest = self.forest.write();
        self.insert_locked(&mut forest, parent, position, items)
    }

    fn insert_locked(
        &self,
        forest: &mut Forest,
        parent: Option<ItemId>,
        position: usize,
        items: Vec<NewItem>,
    ) -> Result<Vec<ItemId>> {
        let len = forest.siblings(parent)?.len();
        if position > len {
            return Err(TreeError::InvalidPosition {
                position,
                end: position,
                len,
            });
        }

        let ids: Vec<ItemId> = items
            .into_iter()
            .map(|item| {
                let id = self.next_id();
                forest.nodes.insert(
                    id,
                    Node {
                        record: Mutex::new(ItemRecord::new(id, item)),
                        parent,
                        children: Vec::new(),
                    },
                );
                id
            })
            .collect();

        let siblings = forest.siblings_mut(parent)?;
        siblings.splice(position..position, ids.iter().copied());
        Ok(ids)
    }

    /// Remove `count` children starting at `position`, releasing their subtrees
    pub fn remove_children(
        &self,
        parent: Option<ItemId>,
        position: usize,
        count: usize,
    ) -> Result<Vec<ItemId>> {
        let mut forest = self.forest.write();
        let siblings = forest.siblings_mut(parent)?;
        let end = position.saturating_add(count);
        if end > siblings.len() {
            return Err(TreeError::InvalidPosition {
                position,
                end,
                len: siblings.len(),
            });
        }

        let removed: Vec<ItemId> = siblings.drain(position..end).collect();
        for id in &removed {
            forest.release(*id);
        }
        Ok(removed)
    }

    /// Remove every child of `parent`, returning how many direct children went
    pub fn remove_all_children(&self, parent: ItemId) -> Result<usize> {
        let count = self.child_count(Some(parent));
        self.remove_children(Some(parent), 0, count).map(|ids| ids.len())
    }

    /// Swap `parent`'s children for a fresh set in one structural step
    pub fn replace_children(&self, parent: ItemId, items: Vec<NewItem>) -> Result<Vec<ItemId>> {
        let mut forest = self.forest.write();
        let old = std::mem::take(forest.siblings_mut(Some(parent))?);
        for id in old {
            forest.release(id);
        }
        self.insert_locked(&mut forest, Some(parent), 0, items)
    }

    /// Remove an item and its subtree
    pub fn remove(&self, id: ItemId) -> Result<ItemSnapshot> {
        self.remove_checked(id, |_| Ok(()))
    }

    /// Remove `id` if `check` accepts its record; both happen under the
    /// structure write lock so the record cannot change in between.
    fn remove_checked(
        &self,
        id: ItemId,
        check: impl FnOnce(&ItemRecord) -> Result<()>,
    ) -> Result<ItemSnapshot> {
        let mut forest = self.forest.write();
        let snapshot = {
            let node = forest.nodes.get(&id).ok_or(TreeError::ItemNotFound(id))?;
            let record = node.record.lock();
            check(&*record)?;
            record.snapshot()
        };
        forest.detach(id)?;
        let released = forest.release(id);
        debug!(item_id = %id, released, "Item removed");
        Ok(snapshot)
    }

    pub fn parent(&self, id: ItemId) -> Option<ItemId> {
        self.forest.read().nodes.get(&id).and_then(|node| node.parent)
    }

    /// Index of `id` among its siblings
    pub fn row(&self, id: ItemId) -> Option<usize> {
        let forest = self.forest.read();
        let parent = forest.nodes.get(&id)?.parent;
        forest
            .siblings(parent)
            .ok()?
            .iter()
            .position(|child| *child == id)
    }

    pub fn child(&self, parent: Option<ItemId>, row: usize) -> Option<ItemId> {
        self.forest
            .read()
            .siblings(parent)
            .ok()
            .and_then(|children| children.get(row).copied())
    }

    pub fn child_count(&self, parent: Option<ItemId>) -> usize {
        self.forest
            .read()
            .siblings(parent)
            .map(|children| children.len())
            .unwrap_or(0)
    }

    pub fn children(&self, parent: Option<ItemId>) -> Vec<ItemId> {
        self.forest
            .read()
            .siblings(parent)
            .map(|children| children.clone())
            .unwrap_or_default()
    }

    pub fn last_index_of(&self, parent: Option<ItemId>, child: ItemId) -> Option<usize> {
        self.forest
            .read()
            .siblings(parent)
            .ok()?
            .iter()
            .rposition(|id| *id == child)
    }

    /// First item in pre-order matching `predicate`, over the whole forest
    pub fn find_item<P>(&self, predicate: P) -> Option<ItemId>
    where
        P: FnMut(&ItemRecord) -> bool,
    {
        let forest = self.forest.read();
        let roots = forest.roots.clone();
        Self::find_locked(&forest, &roots, predicate)
    }

    /// First item in pre-order matching `predicate`, starting at `start`
    pub fn find_item_in<P>(&self, start: ItemId, predicate: P) -> Option<ItemId>
    where
        P: FnMut(&ItemRecord) -> bool,
    {
        let forest = self.forest.read();
        Self::find_locked(&forest, &[start], predicate)
    }

    fn find_locked<P>(forest: &Forest, starts: &[ItemId], mut predicate: P) -> Option<ItemId>
    where
        P: FnMut(&ItemRecord) -> bool,
    {
        let mut stack: Vec<ItemId> = starts.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = forest.nodes.get(&id) else {
                continue;
            };
            if predicate(&*node.record.lock()) {
                return Some(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    pub fn find_item_by_url(&self, url: &str) -> Option<ItemId> {
        self.find_item(|record| record.initial_url == url || record.actual_url == url)
    }

    /// Visit every record in pre-order; `f` may mutate the visited record only
    pub fn for_all<F>(&self, mut f: F)
    where
        F: FnMut(&mut ItemRecord),
    {
        let forest = self.forest.read();
        for id in forest.preorder(&forest.roots) {
            if let Some(node) = forest.nodes.get(&id) {
                f(&mut *node.record.lock());
            }
        }
    }

    pub fn with_item<R>(&self, id: ItemId, f: impl FnOnce(&ItemRecord) -> R) -> Result<R> {
        let forest = self.forest.read();
        let node = forest.nodes.get(&id).ok_or(TreeError::ItemNotFound(id))?;
        let record = node.record.lock();
        Ok(f(&*record))
    }

    /// Mutate one record and capture its snapshot under the same lock
    pub fn update<R>(
        &self,
        id: ItemId,
        f: impl FnOnce(&mut ItemRecord) -> R,
    ) -> Result<(R, ItemSnapshot)> {
        let forest = self.forest.read();
        let node = forest.nodes.get(&id).ok_or(TreeError::ItemNotFound(id))?;
        let mut record = node.record.lock();
        let result = f(&mut *record);
        Ok((result, record.snapshot()))
    }

    pub fn snapshot(&self, id: ItemId) -> Option<ItemSnapshot> {
        self.with_item(id, ItemRecord::snapshot).ok()
    }

    /// Snapshots of every item in pre-order, for initial population
    pub fn snapshots(&self) -> Vec<ItemSnapshot> {
        let forest = self.forest.read();
        forest
            .preorder(&forest.roots)
            .into_iter()
            .filter_map(|id| forest.nodes.get(&id))
            .map(|node| node.record.lock().snapshot())
            .collect()
    }

    pub fn set_status(&self, id: ItemId, status: ItemStatus) -> Result<bool> {
        self.update(id, |record| record.set_status(status))
            .map(|(changed, _)| changed)
    }

    pub fn set_size(&self, id: ItemId, size: u64) -> Result<bool> {
        self.update(id, |record| record.set_size(size))
            .map(|(changed, _)| changed)
    }

    pub fn set_size_curr_downl(&self, id: ItemId, downloaded: u64) -> Result<bool> {
        self.update(id, |record| record.set_size_curr_downl(downloaded))
            .map(|(changed, _)| changed)
    }

    pub fn set_priority(&self, id: ItemId, priority: i32) -> Result<bool> {
        self.update(id, |record| record.set_priority(priority))
            .map(|(changed, _)| changed)
    }

    pub fn reset_progress(&self, id: ItemId) -> Result<bool> {
        self.update(id, ItemRecord::reset_progress)
            .map(|(changed, _)| changed)
    }

    pub fn mark_for_removal(&self, id: ItemId) -> Result<bool> {
        self.update(id, ItemRecord::mark_for_removal)
            .map(|(changed, _)| changed)
    }

    /// User pause; routed through the status table.
    /// Returns whether the status changed and the record afterwards.
    pub fn pause(&self, id: ItemId) -> Result<(bool, ItemSnapshot)> {
        self.command(id, "pause", ItemRecord::can_pause, StatusEvent::Paused)
    }

    /// User resume; routed through the status table. A finished torrent
    /// resumes into seeding.
    pub fn resume(&self, id: ItemId) -> Result<(bool, ItemSnapshot)> {
        self.command(id, "resume", ItemRecord::can_resume, StatusEvent::Resumed)
    }

    fn command(
        &self,
        id: ItemId,
        command: &'static str,
        allowed: fn(&ItemRecord) -> bool,
        event: StatusEvent,
    ) -> Result<(bool, ItemSnapshot)> {
        let (outcome, snapshot) = self.update(id, |record| {
            if !allowed(record) {
                return Err(TreeError::CommandNotAllowed {
                    id,
                    command,
                    status: record.status(),
                });
            }
            Ok(record.apply(event))
        })?;
        Ok((outcome?, snapshot))
    }

    /// User cancel: drops the item and its subtree
    pub fn cancel(&self, id: ItemId) -> Result<ItemSnapshot> {
        self.remove_checked(id, |record| {
            let status = record.status();
            if status.can_cancel() {
                Ok(())
            } else {
                Err(TreeError::CommandNotAllowed {
                    id,
                    command: "cancel",
                    status,
                })
            }
        })
    }

    /// Remove every completed top-level item
    pub fn delete_all_finished(&self) -> Vec<ItemSnapshot> {
        self.remove_roots_where(ItemRecord::is_completed)
    }

    /// Remove top-level items flagged by an engine-side removal
    pub fn purge_marked(&self) -> Vec<ItemSnapshot> {
        self.remove_roots_where(ItemRecord::removal_pending)
    }

    fn remove_roots_where(&self, predicate: fn(&ItemRecord) -> bool) -> Vec<ItemSnapshot> {
        let mut forest = self.forest.write();
        let doomed: Vec<ItemSnapshot> = forest
            .roots
            .iter()
            .filter_map(|id| forest.nodes.get(id))
            .filter_map(|node| {
                let record = node.record.lock();
                predicate(&*record).then(|| record.snapshot())
            })
            .collect();

        forest
            .roots
            .retain(|id| !doomed.iter().any(|snapshot| snapshot.id == *id));
        for snapshot in &doomed {
            forest.release(snapshot.id);
        }
        doomed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DownloadType;

    fn item(url: &str) -> NewItem {
        NewItem::builder().initial_url(url).build()
    }

    /// root -> {A, B -> {C, D}}
    fn sample_tree() -> (ItemTree, [ItemId; 5]) {
        let tree = ItemTree::new();
        let root = tree.add(item("root"));
        let a = tree.add_child(root, item("a")).unwrap();
        let b = tree.add_child(root, item("b")).unwrap();
        let c = tree.add_child(b, item("c")).unwrap();
        let d = tree.add_child(b, item("d")).unwrap();
        (tree, [root, a, b, c, d])
    }

    #[test]
    fn test_ids_are_monotonic_and_never_reused() {
        let tree = ItemTree::new();
        let first = tree.add(item("one"));
        tree.remove(first).unwrap();
        let second = tree.add(item("two"));
        assert!(second > first);
        assert_eq!(tree.current_counter(), 2);
    }

    #[test]
    fn test_find_item_visits_in_preorder() {
        let (tree, [root, a, b, c, d]) = sample_tree();
        let mut visited = Vec::new();
        let found = tree.find_item(|record| {
            visited.push(record.id());
            record.id() == d
        });
        assert_eq!(found, Some(d));
        assert_eq!(visited, vec![root, a, b, c, d]);
    }

    #[test]
    fn test_find_item_in_subtree() {
        let (tree, [_, a, b, c, _]) = sample_tree();
        assert_eq!(tree.find_item_in(b, |r| r.initial_url == "c"), Some(c));
        assert_eq!(tree.find_item_in(b, |r| r.id() == a), None);
    }

    #[test]
    fn test_find_item_by_url() {
        let (tree, [_, _, b, _, _]) = sample_tree();
        assert_eq!(tree.find_item_by_url("b"), Some(b));
        assert_eq!(tree.find_item_by_url("zzz"), None);
    }

    #[test]
    fn test_for_all_preorder_and_mutation() {
        let (tree, ids) = sample_tree();
        let mut order = Vec::new();
        tree.for_all(|record| {
            order.push(record.id());
            record.set_priority(7);
        });
        assert_eq!(order, ids.to_vec());
        assert!(tree.snapshots().iter().all(|s| s.priority == 7));
    }

    #[test]
    fn test_parent_and_row() {
        let (tree, [root, a, b, c, d]) = sample_tree();
        assert_eq!(tree.parent(root), None);
        assert_eq!(tree.parent(c), Some(b));
        assert_eq!(tree.row(a), Some(0));
        assert_eq!(tree.row(b), Some(1));
        assert_eq!(tree.row(d), Some(1));
        assert_eq!(tree.row(root), Some(0));
        assert_eq!(tree.child(Some(b), 1), Some(d));
        assert_eq!(tree.last_index_of(Some(b), c), Some(0));
        assert_eq!(tree.last_index_of(Some(b), a), None);
    }

    #[test]
    fn test_insert_children_keeps_order_contiguous() {
        let (tree, [root, a, b, _, _]) = sample_tree();
        let inserted = tree
            .insert_children(Some(root), 1, vec![item("x"), item("y")])
            .unwrap();
        assert_eq!(
            tree.children(Some(root)),
            vec![a, inserted[0], inserted[1], b]
        );
        assert_eq!(tree.row(b), Some(3));
    }

    #[test]
    fn test_insert_children_rejects_out_of_range() {
        let (tree, [root, ..]) = sample_tree();
        let err = tree
            .insert_children(Some(root), 5, vec![item("x")])
            .unwrap_err();
        assert!(matches!(err, TreeError::InvalidPosition { len: 2, .. }));
    }

    #[test]
    fn test_remove_children_releases_subtree() {
        let (tree, [root, a, b, c, d]) = sample_tree();
        let removed = tree.remove_children(Some(root), 1, 1).unwrap();
        assert_eq!(removed, vec![b]);
        assert_eq!(tree.children(Some(root)), vec![a]);
        assert!(!tree.contains(c));
        assert!(!tree.contains(d));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_remove_children_range_check() {
        let (tree, [root, ..]) = sample_tree();
        assert!(tree.remove_children(Some(root), 1, 2).is_err());
        assert_eq!(tree.child_count(Some(root)), 2);
    }

    #[test]
    fn test_remove_all_children() {
        let (tree, [root, ..]) = sample_tree();
        assert_eq!(tree.remove_all_children(root).unwrap(), 2);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.child_count(Some(root)), 0);
    }

    #[test]
    fn test_replace_children() {
        let (tree, [_, _, b, c, _]) = sample_tree();
        let fresh = tree
            .replace_children(b, vec![item("e"), item("f"), item("g")])
            .unwrap();
        assert_eq!(tree.children(Some(b)), fresh);
        assert!(!tree.contains(c));
        assert_eq!(tree.parent(fresh[2]), Some(b));
    }

    #[test]
    fn test_remove_detaches_from_parent() {
        let (tree, [root, a, b, c, _]) = sample_tree();
        let snapshot = tree.remove(b).unwrap();
        assert_eq!(snapshot.id, b);
        assert_eq!(tree.children(Some(root)), vec![a]);
        assert!(!tree.contains(c));
        assert_eq!(tree.remove(b).unwrap_err(), TreeError::ItemNotFound(b));
    }

    #[test]
    fn test_set_status_reports_change() {
        let (tree, [root, ..]) = sample_tree();
        assert!(tree.set_status(root, ItemStatus::Downloading).unwrap());
        assert!(!tree.set_status(root, ItemStatus::Downloading).unwrap());
        assert!(tree.set_status(ItemId(999), ItemStatus::Paused).is_err());
    }

    #[test]
    fn test_pause_resume_commands() {
        let tree = ItemTree::new();
        let id = tree.add(item("https://example.com/a"));
        tree.set_status(id, ItemStatus::Downloading).unwrap();

        let (paused, snapshot) = tree.pause(id).unwrap();
        assert!(paused);
        assert_eq!(snapshot.status, ItemStatus::Paused);
        let err = tree.pause(id).unwrap_err();
        assert!(matches!(err, TreeError::CommandNotAllowed { command: "pause", .. }));

        assert!(tree.resume(id).unwrap().0);
        assert_eq!(tree.snapshot(id).unwrap().status, ItemStatus::Downloading);
    }

    #[test]
    fn test_resume_finished_torrent_seeds() {
        let tree = ItemTree::new();
        let url = tree.add(item("https://example.com/a"));
        let torrent = tree.add(
            NewItem::builder()
                .initial_url("magnet:?xt=urn:btih:abc")
                .download_type(DownloadType::MagnetLink)
                .build(),
        );
        tree.set_status(url, ItemStatus::Finished).unwrap();
        tree.set_status(torrent, ItemStatus::Finished).unwrap();

        assert!(tree.resume(url).is_err());
        assert!(tree.resume(torrent).unwrap().0);
        assert_eq!(tree.snapshot(torrent).unwrap().status, ItemStatus::Seeding);
    }

    #[test]
    fn test_cancel() {
        let tree = ItemTree::new();
        let id = tree.add(item("https://example.com/a"));
        let seeding = tree.add(item("https://example.com/b"));
        tree.set_status(seeding, ItemStatus::Seeding).unwrap();

        assert!(tree.cancel(seeding).is_err());
        assert!(tree.contains(seeding));
        assert_eq!(tree.cancel(id).unwrap().id, id);
        assert!(!tree.contains(id));
    }

    #[test]
    fn test_cancel_never_removes_a_seed() {
        use std::sync::Arc;
        use std::thread;

        for _ in 0..200 {
            let tree = Arc::new(ItemTree::new());
            let id = tree.add(item("https://example.com/race"));
            tree.set_status(id, ItemStatus::Downloading).unwrap();

            let engine = {
                let tree = Arc::clone(&tree);
                thread::spawn(move || tree.set_status(id, ItemStatus::Seeding))
            };
            let cancelled = tree.cancel(id);
            let seeded = engine.join().unwrap();

            match cancelled {
                Ok(snapshot) => {
                    assert!(snapshot.status.can_cancel());
                    assert_eq!(seeded, Err(TreeError::ItemNotFound(id)));
                }
                Err(err) => {
                    assert!(matches!(err, TreeError::CommandNotAllowed { .. }));
                    assert_eq!(tree.snapshot(id).unwrap().status, ItemStatus::Seeding);
                }
            }
        }
    }

    #[test]
    fn test_delete_all_finished() {
        let tree = ItemTree::new();
        let done = tree.add(item("done"));
        let failed = tree.add(item("failed"));
        let active = tree.add(item("active"));
        tree.set_status(done, ItemStatus::Finished).unwrap();
        tree.set_status(failed, ItemStatus::Error).unwrap();
        tree.set_status(active, ItemStatus::Downloading).unwrap();

        assert!(tree.find_item(ItemRecord::is_completed).is_some());
        let removed: Vec<ItemId> = tree.delete_all_finished().iter().map(|s| s.id).collect();
        assert_eq!(removed, vec![done, failed]);
        assert_eq!(tree.children(None), vec![active]);
        assert!(tree.find_item(ItemRecord::is_completed).is_none());
    }

    #[test]
    fn test_purge_marked() {
        let tree = ItemTree::new();
        let keep = tree.add(item("keep"));
        let gone = tree.add(item("gone"));
        tree.add_child(gone, item("gone/file")).unwrap();
        assert!(tree.mark_for_removal(gone).unwrap());

        let purged = tree.purge_marked();
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].id, gone);
        assert!(purged[0].removal_pending);
        assert_eq!(tree.children(None), vec![keep]);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_concurrent_field_updates() {
        use std::sync::Arc;
        use std::thread;

        let tree = Arc::new(ItemTree::new());
        let ids: Vec<ItemId> = (0..8)
            .map(|i| tree.add(NewItem::builder().initial_url(format!("u{i}")).size(10_000).build()))
            .collect();

        let handles: Vec<_> = ids
            .iter()
            .map(|&id| {
                let tree = Arc::clone(&tree);
                thread::spawn(move || {
                    for step in 1..=100u64 {
                        tree.set_size_curr_downl(id, step * 100).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for id in ids {
            let snap = tree.snapshot(id).unwrap();
            assert_eq!(snap.size_curr_downl, 10_000);
            assert_eq!(snap.percent_download, 100);
        }
    }
}
