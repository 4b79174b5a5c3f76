use ::lru::LruCache;
use parking_lot::Mutex;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// Bounded map that evicts its least recently used entry on insert
///
/// Inserting never fails for capacity reasons. Lookups through [`get`]
/// refresh recency; [`peek`] does not.
///
/// [`get`]: LruMap::get
/// [`peek`]: LruMap::peek
pub struct LruMap<K: Hash + Eq, V> {
    name: &'static str,
    inner: Mutex<LruCache<K, V>>,
}

impl<K, V> LruMap<K, V>
where
    K: Hash + Eq,
{
    pub fn with_max_entries(name: &'static str, capacity: NonZeroUsize) -> Self {
        Self {
            name,
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().cap().get()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Insert or overwrite (last write wins). Returns the entry evicted to
    /// make room, if any; overwriting an existing key evicts nothing.
    pub fn insert(&self, key: K, value: V) -> Option<(K, V)> {
        let mut cache = self.inner.lock();
        if let Some(slot) = cache.get_mut(&key) {
            *slot = value;
            return None;
        }
        cache.push(key, value)
    }

    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.inner.lock().get(key).cloned()
    }

    pub fn peek(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.inner.lock().peek(key).cloned()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.lock().contains(key)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().pop(key)
    }

    /// Copy of every entry, most recently used first
    pub fn entries(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.inner
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cap(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_insert_then_get() {
        let map = LruMap::with_max_entries("test", cap(2));
        assert!(map.insert("a", 1).is_none());
        assert_eq!(map.get(&"a"), Some(1));
    }

    #[test]
    fn test_overwrite_is_not_eviction() {
        let map = LruMap::with_max_entries("test", cap(1));
        assert!(map.insert("a", 1).is_none());
        assert!(map.insert("a", 2).is_none());
        assert_eq!(map.get(&"a"), Some(2));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let map = LruMap::with_max_entries("test", cap(3));
        map.insert(1, "one");
        map.insert(2, "two");
        map.insert(3, "three");

        // touch 1 so 2 becomes coldest
        assert_eq!(map.get(&1), Some("one"));

        assert_eq!(map.insert(4, "four"), Some((2, "two")));
        assert!(map.contains_key(&1));
        assert!(!map.contains_key(&2));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_peek_does_not_promote() {
        let map = LruMap::with_max_entries("test", cap(2));
        map.insert(1, ());
        map.insert(2, ());

        assert_eq!(map.peek(&1), Some(()));
        assert_eq!(map.insert(3, ()), Some((1, ())));
    }

    #[test]
    fn test_entries_most_recent_first() {
        let map = LruMap::with_max_entries("test", cap(4));
        map.insert(1, 10);
        map.insert(2, 20);
        map.get(&1);

        let keys: Vec<_> = map.entries().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![1, 2]);
        assert_eq!(map.remove(&1), Some(10));
        assert_eq!(map.capacity(), 4);
    }
}
