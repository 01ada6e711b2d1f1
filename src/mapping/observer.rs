//! Ordered observer lists with unsubscribe-by-handle

use std::collections::BTreeMap;

/// Handle returned by every subscription; used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Callbacks grouped by key, kept in subscription order
pub struct Observers<K, F> {
    next_id: u64,
    lists: BTreeMap<K, Vec<(SubscriptionId, F)>>,
}

impl<K: Ord + Clone, F> Default for Observers<K, F> {
    fn default() -> Self {
        Self {
            next_id: 0,
            lists: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone, F> Observers<K, F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, key: K, callback: F) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.lists.entry(key).or_default().push((id, callback));
        id
    }

    /// Removes a subscription. Returns `false` for unknown or already removed ids.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let mut emptied = None;
        let mut found = false;
        for (key, list) in self.lists.iter_mut() {
            if let Some(position) = list.iter().position(|(entry, _)| *entry == id) {
                list.remove(position);
                found = true;
                if list.is_empty() {
                    emptied = Some(key.clone());
                }
                break;
            }
        }
        if let Some(key) = emptied {
            self.lists.remove(&key);
        }
        found
    }

    /// Callbacks registered for `key`, in subscription order
    pub fn for_key_mut(&mut self, key: &K) -> impl Iterator<Item = &mut F> {
        self.lists
            .get_mut(key)
            .into_iter()
            .flat_map(|list| list.iter_mut().map(|(_, callback)| callback))
    }

    pub fn len(&self) -> usize {
        self.lists.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}
