//! Concurrent window storage.

use dashmap::DashMap;

use super::actor::WindowKey;
use super::window::WindowEntry;

/// In-memory map from [`WindowKey`] to [`WindowEntry`].
///
/// Backed by a sharded map: operations on one key lock only that key's shard,
/// so unrelated actors and categories do not contend on a global lock.
#[derive(Debug, Default)]
pub struct WindowStore {
    entries: DashMap<WindowKey, WindowEntry>,
}

impl WindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &WindowKey) -> Option<WindowEntry> {
        self.entries.get(key).map(|entry| *entry.value())
    }

    pub fn set(&self, key: WindowKey, entry: WindowEntry) {
        self.entries.insert(key, entry);
    }

    pub fn delete(&self, key: &WindowKey) -> Option<WindowEntry> {
        self.entries.remove(key).map(|(_, entry)| entry)
    }

    /// Atomically read-modify-write the entry for `key`.
    ///
    /// The shard lock is held for the whole closure, so concurrent updates to
    /// the same key are serialized. A missing entry (never seen, or removed by
    /// a concurrent sweep) is created with `init` first.
    pub fn update<R>(
        &self,
        key: WindowKey,
        init: impl FnOnce() -> WindowEntry,
        f: impl FnOnce(&mut WindowEntry) -> R,
    ) -> R {
        let mut slot = self.entries.entry(key).or_insert_with(init);
        f(slot.value_mut())
    }

    /// Remove the entry only if `predicate` still holds under the key's lock.
    pub fn remove_if(&self, key: &WindowKey, predicate: impl FnOnce(&WindowEntry) -> bool) -> bool {
        self.entries
            .remove_if(key, |_, entry| predicate(entry))
            .is_some()
    }

    /// Visit every entry. Shards are read-locked one at a time.
    pub fn for_each(&self, mut f: impl FnMut(&WindowKey, &WindowEntry)) {
        for item in self.entries.iter() {
            f(item.key(), item.value());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{ActorKey, Category};
    use std::sync::Arc;

    fn key(category: Category, ip: &str) -> WindowKey {
        WindowKey::new(category, ActorKey::Ip(ip.to_string()))
    }

    #[test]
    fn test_set_get_delete() {
        let store = WindowStore::new();
        let k = key(Category::Auth, "10.0.0.1");

        assert!(store.get(&k).is_none());

        store.set(k.clone(), WindowEntry::new(5));
        assert_eq!(store.get(&k), Some(WindowEntry::new(5)));
        assert_eq!(store.len(), 1);

        assert_eq!(store.delete(&k), Some(WindowEntry::new(5)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_creates_missing_entry() {
        let store = WindowStore::new();
        let k = key(Category::Maps, "10.0.0.2");

        let count = store.update(k.clone(), || WindowEntry::new(100), |entry| {
            entry.count += 1;
            entry.count
        });

        assert_eq!(count, 1);
        assert_eq!(store.get(&k).unwrap().window_start_ms, 100);
    }

    #[test]
    fn test_remove_if_rechecks_predicate() {
        let store = WindowStore::new();
        let k = key(Category::Booking, "10.0.0.3");
        store.set(k.clone(), WindowEntry::new(0));

        assert!(!store.remove_if(&k, |entry| entry.count > 0));
        assert_eq!(store.len(), 1);

        assert!(store.remove_if(&k, |entry| entry.count == 0));
        assert!(store.is_empty());

        // Removing a missing key is a no-op.
        assert!(!store.remove_if(&k, |_| true));
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let store = Arc::new(WindowStore::new());
        let k = key(Category::Default, "10.0.0.4");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let k = k.clone();
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        store.update(k.clone(), || WindowEntry::new(0), |entry| entry.count += 1);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get(&k).unwrap().count, 8_000);
    }

    #[test]
    fn test_for_each_visits_every_entry() {
        let store = WindowStore::new();
        store.set(key(Category::Auth, "10.0.0.5"), WindowEntry::new(1));
        store.set(key(Category::Webhook, "10.0.0.6"), WindowEntry::new(2));

        let mut total_start = 0;
        store.for_each(|_, entry| total_start += entry.window_start_ms);
        assert_eq!(total_start, 3);

        store.clear();
        assert!(store.is_empty());
    }
}
