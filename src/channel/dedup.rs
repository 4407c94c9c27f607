use std::collections::{HashSet, VecDeque};

/// Bounded set of recently seen notification keys, evicting the oldest.
#[derive(Debug, Clone)]
pub(crate) struct RecentKeys {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl RecentKeys {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity.min(1024)),
            seen: HashSet::new(),
        }
    }

    /// Record `key`; returns `false` if it was already seen.
    pub(crate) fn insert(&mut self, key: String) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }
}
