//! Work Cache (C3): in-memory mapping from work-id to its current
//! [`WorkItem`]. Guarded by its own lock, independent of the Active Set
//! (spec §4.3: the cache may carry stale entries after removal while a
//! handler is still running).

use dashmap::DashMap;

use crate::work_item::WorkItem;

#[derive(Default)]
pub struct WorkCache {
    items: DashMap<u64, WorkItem>,
}

impl WorkCache {
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
        }
    }

    pub fn get(&self, id: u64) -> Option<WorkItem> {
        self.items.get(&id).map(|entry| entry.value().clone())
    }

    pub fn put(&self, id: u64, item: WorkItem) {
        self.items.insert(id, item);
    }

    pub fn remove(&self, id: u64) {
        self.items.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&self) {
        self.items.clear();
    }

    /// Mutates an entry in place, creating one with [`WorkItem::new`] first
    /// if absent. Used by handlers that need get-then-update semantics
    /// without holding the cache lock across I/O.
    pub fn entry_with<F>(&self, id: u64, mutate: F)
    where
        F: FnOnce(&mut WorkItem),
    {
        let mut entry = self.items.entry(id).or_insert_with(|| WorkItem::new(id));
        mutate(&mut entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let cache = WorkCache::new();
        cache.put(1, WorkItem::new(1));
        assert!(cache.get(1).is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn remove_drops_entry() {
        let cache = WorkCache::new();
        cache.put(1, WorkItem::new(1));
        cache.remove(1);
        assert!(cache.get(1).is_none());
    }

    #[test]
    fn entry_with_creates_then_mutates() {
        let cache = WorkCache::new();
        cache.entry_with(1, |item| item.download_path = Some("/tmp/a".into()));
        assert_eq!(
            cache.get(1).expect("present").download_path,
            Some("/tmp/a".into())
        );
    }
}
