//! Thread-safe LRU cache with byte budget management
//!
//! Ordering is delegated to [`lru::LruCache`]; this wrapper adds a byte
//! budget on top and evicts least-recently-used items until the stored bytes
//! fit again. A budget of zero disables the cache entirely.

use parking_lot::Mutex;
use std::fmt;
use std::hash::Hash;

pub struct ByteBudgetLru<K: Hash + Eq, V> {
    inner: Mutex<Inner<K, V>>,
}

struct Inner<K: Hash + Eq, V> {
    entries: lru::LruCache<K, (V, usize)>,
    total_bytes: usize,
    max_bytes: usize,
}

impl<K: Hash + Eq, V: Clone> ByteBudgetLru<K, V> {
    /// Create a new LRU cache with the specified byte budget
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: lru::LruCache::unbounded(),
                total_bytes: 0,
                max_bytes,
            }),
        }
    }

    /// Get a value, marking it most recently used
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        inner.entries.get(key).map(|(value, _)| value.clone())
    }

    /// Insert a value, evicting old items if the budget is exceeded.
    /// Values larger than the whole budget are not stored.
    pub fn insert(&self, key: K, value: V, byte_size: usize) {
        let mut inner = self.inner.lock();
        if byte_size > inner.max_bytes {
            // Drop any stale copy so readers never see an outdated value
            if let Some((_, old_size)) = inner.entries.pop(&key) {
                inner.total_bytes = inner.total_bytes.saturating_sub(old_size);
            }
            return;
        }

        if let Some((_, old_size)) = inner.entries.put(key, (value, byte_size)) {
            inner.total_bytes = inner.total_bytes.saturating_sub(old_size);
        }
        inner.total_bytes = inner.total_bytes.saturating_add(byte_size);

        while inner.total_bytes > inner.max_bytes {
            match inner.entries.pop_lru() {
                Some((_, (_, evicted))) => {
                    inner.total_bytes = inner.total_bytes.saturating_sub(evicted);
                }
                None => break,
            }
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        let (value, size) = inner.entries.pop(key)?;
        inner.total_bytes = inner.total_bytes.saturating_sub(size);
        Some(value)
    }

    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }

    pub fn max_bytes(&self) -> usize {
        self.inner.lock().max_bytes
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.total_bytes = 0;
    }
}

impl<K: Hash + Eq, V> fmt::Debug for ByteBudgetLru<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ByteBudgetLru")
            .field("len", &inner.entries.len())
            .field("total_bytes", &inner.total_bytes)
            .field("max_bytes", &inner.max_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> String {
        s.to_string()
    }

    #[test]
    fn test_basic_operations() {
        let cache = ByteBudgetLru::new(100);

        cache.insert(key("key1"), vec![1, 2, 3], 10);
        assert_eq!(cache.get(&key("key1")), Some(vec![1, 2, 3]));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 10);

        assert_eq!(cache.get(&key("key2")), None);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ByteBudgetLru::new(25);

        cache.insert(key("key1"), vec![1], 10);
        cache.insert(key("key2"), vec![2], 10);
        cache.insert(key("key3"), vec![3], 5);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.total_bytes(), 25);

        // Over budget: key1 is the oldest
        cache.insert(key("key4"), vec![4], 10);
        assert_eq!(cache.get(&key("key1")), None);
        assert_eq!(cache.get(&key("key2")), Some(vec![2]));
        assert_eq!(cache.get(&key("key3")), Some(vec![3]));
        assert_eq!(cache.get(&key("key4")), Some(vec![4]));
        assert!(cache.total_bytes() <= 25);
    }

    #[test]
    fn test_lru_ordering() {
        let cache = ByteBudgetLru::new(25);

        cache.insert(key("key1"), vec![1], 5);
        cache.insert(key("key2"), vec![2], 5);
        cache.insert(key("key3"), vec![3], 5);

        // Touch key1 so key2 becomes least recently used
        cache.get(&key("key1"));

        cache.insert(key("key4"), vec![4], 15);

        assert_eq!(cache.get(&key("key1")), Some(vec![1]));
        assert_eq!(cache.get(&key("key2")), None);
        assert_eq!(cache.get(&key("key3")), Some(vec![3]));
        assert_eq!(cache.get(&key("key4")), Some(vec![4]));
    }

    #[test]
    fn test_update_existing_key() {
        let cache = ByteBudgetLru::new(50);

        cache.insert(key("key1"), vec![1, 2, 3], 10);
        cache.insert(key("key1"), vec![1, 2, 3, 4, 5], 20);
        assert_eq!(cache.total_bytes(), 20);
        assert_eq!(cache.len(), 1);

        cache.insert(key("key1"), vec![1], 5);
        assert_eq!(cache.total_bytes(), 5);
        assert_eq!(cache.get(&key("key1")), Some(vec![1]));
    }

    #[test]
    fn test_oversized_and_disabled() {
        let cache = ByteBudgetLru::new(10);
        cache.insert(key("small"), vec![1], 4);
        cache.insert(key("small"), vec![2], 40);
        assert_eq!(cache.get(&key("small")), None);
        assert_eq!(cache.total_bytes(), 0);

        let disabled = ByteBudgetLru::new(0);
        disabled.insert(key("any"), vec![1], 1);
        assert!(disabled.is_empty());
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = ByteBudgetLru::new(100);
        cache.insert(key("key1"), vec![1, 2, 3], 10);
        cache.insert(key("key2"), vec![4, 5, 6], 15);

        assert_eq!(cache.remove(&key("key1")), Some(vec![1, 2, 3]));
        assert_eq!(cache.total_bytes(), 15);
        assert_eq!(cache.remove(&key("key1")), None);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
        assert_eq!(cache.max_bytes(), 100);
    }
}
