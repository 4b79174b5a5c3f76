use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Result of inserting into a [`BoundedMap`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new entry was created
    Inserted,
    /// The key was already present
    Exists,
    /// The key was absent and the map is at capacity; nothing was stored
    Full,
}

/// Concurrent hash map that never holds more than `capacity` entries
///
/// Occupancy is tracked with an atomic counter reserved while the shard lock
/// for the key is held, so racing inserts can never overshoot the limit.
pub struct BoundedMap<K, V> {
    name: &'static str,
    inner: DashMap<K, V>,
    len: AtomicUsize,
    capacity: usize,
}

impl<K, V> BoundedMap<K, V>
where
    K: Eq + Hash,
{
    pub fn with_max_entries(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            inner: DashMap::new(),
            len: AtomicUsize::new(0),
            capacity,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reserve(&self) -> bool {
        self.len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok()
    }

    /// Store `value` only if `key` is absent. Racing callers on the same key
    /// see exactly one `Inserted`; the rest get `Exists` and keep the winner.
    pub fn insert_if_absent(&self, key: K, value: V) -> InsertOutcome {
        match self.inner.entry(key) {
            Entry::Occupied(_) => InsertOutcome::Exists,
            Entry::Vacant(slot) => {
                if !self.reserve() {
                    return InsertOutcome::Full;
                }
                slot.insert(value);
                InsertOutcome::Inserted
            }
        }
    }

    /// Store `value`, replacing any existing entry. New keys still respect
    /// the capacity limit.
    pub fn insert(&self, key: K, value: V) -> InsertOutcome {
        match self.inner.entry(key) {
            Entry::Occupied(mut slot) => {
                slot.insert(value);
                InsertOutcome::Exists
            }
            Entry::Vacant(slot) => {
                if !self.reserve() {
                    return InsertOutcome::Full;
                }
                slot.insert(value);
                InsertOutcome::Inserted
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.inner.get(key).map(|r| r.clone())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// Mutate an entry in place under its shard lock.
    /// `f` must not touch this map.
    pub fn update<R>(&self, key: &K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.inner.get_mut(key).map(|mut entry| f(entry.value_mut()))
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = self.inner.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.len.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    /// Copy of every entry (control plane reads)
    pub fn entries(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.inner
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect()
    }
}
