//! Active Set (C4): the set of work-ids the user currently wants. Membership
//! is the single source of truth gating whether queued or retrying actions
//! for a work-id are honored (spec §4.3).

use dashmap::DashSet;

#[derive(Default)]
pub struct ActiveSet {
    ids: DashSet<u64>,
}

impl ActiveSet {
    pub fn new() -> Self {
        Self {
            ids: DashSet::new(),
        }
    }

    pub fn add(&self, id: u64) {
        self.ids.insert(id);
    }

    pub fn remove(&self, id: u64) {
        self.ids.remove(&id);
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    pub fn clear(&self) {
        self.ids.clear();
    }

    pub fn snapshot(&self) -> Vec<u64> {
        self.ids.iter().map(|entry| *entry).collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_contains() {
        let set = ActiveSet::new();
        set.add(1);
        assert!(set.contains(1));
        assert!(!set.contains(2));
    }

    #[test]
    fn remove_clears_membership() {
        let set = ActiveSet::new();
        set.add(1);
        set.remove(1);
        assert!(!set.contains(1));
    }

    #[test]
    fn clear_empties_set() {
        let set = ActiveSet::new();
        set.add(1);
        set.add(2);
        set.clear();
        assert!(set.is_empty());
    }
}
