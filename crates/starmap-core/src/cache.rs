//! Bounded least-recently-used cache.
//!
//! Used for neighbor sets, summaries, relevance scores and page metadata,
//! each with its own capacity. Size never exceeds capacity; on overflow the
//! entry that has gone longest without a `get` or `set` is evicted and
//! handed to the optional eviction callback. There is no TTL: entries leave
//! only by eviction, `remove` or `clear`.

use lru::LruCache;
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;

type EvictionCallback<K, V> = Box<dyn FnMut(&K, &V) + Send>;

pub struct BoundedCache<K: Hash + Eq, V> {
    inner: LruCache<K, V>,
    on_evict: Option<EvictionCallback<K, V>>,
    evictions: u64,
}

impl<K: Hash + Eq, V> BoundedCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(capacity),
            on_evict: None,
            evictions: 0,
        }
    }

    /// Register a callback invoked with each entry evicted for capacity.
    pub fn with_eviction_callback(mut self, f: impl FnMut(&K, &V) + Send + 'static) -> Self {
        self.on_evict = Some(Box::new(f));
        self
    }

    /// Look up `key`, marking it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Look up `key` without touching its recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.inner.peek(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains(key)
    }

    /// Insert or overwrite `key`, marking it most recently used.
    ///
    /// Returns the entry evicted to make room, if any. Overwriting an
    /// existing key never evicts.
    pub fn set(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.inner.contains(&key) {
            self.inner.put(key, value);
            return None;
        }
        let evicted = self.inner.push(key, value)?;
        self.evictions += 1;
        if let Some(cb) = self.on_evict.as_mut() {
            cb(&evicted.0, &evicted.1);
        }
        Some(evicted)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.pop(key)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }

    /// Entries evicted for capacity since creation.
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Keys from most to least recently used; the last one is the next
    /// eviction candidate.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.inner.iter().map(|(k, _)| k)
    }
}

impl<K: Hash + Eq + fmt::Debug, V> fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("evictions", &self.evictions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn evicts_least_recently_touched() {
        let mut cache = BoundedCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.get(&"a"), Some(&1));

        let evicted = cache.set("c", 3);
        assert_eq!(evicted, Some(("b", 2)));
        assert!(cache.contains(&"a"));
        assert!(cache.contains(&"c"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn overwrite_touches_without_evicting() {
        let mut cache = BoundedCache::new(2);
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.set("a", 10), None);
        assert_eq!(cache.keys().copied().collect::<Vec<_>>(), vec!["a", "b"]);

        cache.set("c", 3);
        assert!(!cache.contains(&"b"));
        assert_eq!(cache.peek(&"a"), Some(&10));
    }

    #[test]
    fn peek_does_not_touch() {
        let mut cache = BoundedCache::new(2);
        cache.set(1, "one");
        cache.set(2, "two");
        assert_eq!(cache.peek(&1), Some(&"one"));
        cache.set(3, "three");
        assert!(!cache.contains(&1));
    }

    #[test]
    fn eviction_callback_fires() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut cache = BoundedCache::new(1).with_eviction_callback(move |k: &u32, _v: &&str| {
            sink.lock().unwrap().push(*k);
        });
        cache.set(1, "one");
        cache.set(2, "two");
        cache.set(3, "three");
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
        assert_eq!(cache.evictions(), 2);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut cache = BoundedCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.set("x", ());
        cache.set("y", ());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clear_empties() {
        let mut cache = BoundedCache::new(4);
        cache.set(1, 1);
        cache.set(2, 2);
        cache.clear();
        assert!(cache.is_empty());
    }

    proptest! {
        #[test]
        fn holds_capacity_most_recent_keys(capacity in 1usize..32, extra in 0usize..32) {
            let mut cache = BoundedCache::new(capacity);
            let total = capacity + extra;
            for k in 0..total {
                cache.set(k, k * 10);
            }
            prop_assert_eq!(cache.len(), capacity);
            for k in extra..total {
                prop_assert!(cache.contains(&k));
            }
            for k in 0..extra {
                prop_assert!(!cache.contains(&k));
            }
        }
    }
}
