//! LRU cache wrapper
//!
//! Wraps the `lru` crate with a capacity the wrapper enforces itself, so
//! callers can pin entries that must survive eviction (for example lock
//! handles that another thread is still holding).

use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache as ExternalLruCache;

/// LRU (Least Recently Used) cache
///
/// # Examples
///
/// ```
/// use std::num::NonZeroUsize;
///
/// use cipherstore_common::collections::LruCache;
///
/// let mut cache = LruCache::new(NonZeroUsize::new(2).expect("capacity must be > 0"));
/// cache.put("key1", "value1");
/// cache.put("key2", "value2");
///
/// assert_eq!(cache.get(&"key1"), Some(&"value1"));
///
/// cache.put("key3", "value3"); // Evicts key2
/// assert_eq!(cache.get(&"key2"), None);
/// ```
#[derive(Debug)]
pub struct LruCache<K, V>
where
    K: Hash + Eq,
{
    inner: ExternalLruCache<K, V>,
    capacity: NonZeroUsize,
}

impl<K: Hash + Eq, V> LruCache<K, V> {
    /// Create a new LRU cache with the specified non-zero capacity
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self { inner: ExternalLruCache::unbounded(), capacity }
    }

    /// Try to create a new LRU cache with the specified capacity
    ///
    /// Returns None if capacity is zero
    pub fn try_new(capacity: usize) -> Option<Self> {
        let capacity = NonZeroUsize::new(capacity)?;
        Some(Self::new(capacity))
    }

    /// Insert a key-value pair, evicting the least recently used entry when
    /// the cache is over capacity
    ///
    /// Returns the previous value stored under `key`, if any.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        let previous = self.inner.put(key, value);
        while self.inner.len() > self.capacity.get() {
            if self.inner.pop_lru().is_none() {
                break;
            }
        }
        previous
    }

    /// Insert a key-value pair and evict least recently used entries that
    /// `retain` does not protect
    ///
    /// Protected entries are skipped, so the cache can temporarily hold more
    /// than its capacity when every older entry is protected. Returns the
    /// number of evicted entries.
    pub fn put_retaining<F>(&mut self, key: K, value: V, retain: F) -> usize
    where
        K: Clone,
        F: Fn(&K, &V) -> bool,
    {
        self.inner.put(key, value);

        let excess = self.inner.len().saturating_sub(self.capacity.get());
        if excess == 0 {
            return 0;
        }

        let victims: Vec<K> = self
            .inner
            .iter()
            .rev()
            .filter(|(k, v)| !retain(k, v))
            .take(excess)
            .map(|(k, _)| k.clone())
            .collect();

        for victim in &victims {
            self.inner.pop(victim);
        }
        victims.len()
    }

    /// Get a reference to a value in the cache, promoting it to most recent
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.get(key)
    }

    /// Peek at a value without updating access time
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.peek(key)
    }

    /// Check if a key exists in the cache
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.contains(key)
    }

    /// Remove a key from the cache
    pub fn pop<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.pop(key)
    }

    /// Get the current number of items in the cache
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Get the capacity of the cache
    pub fn cap(&self) -> usize {
        self.capacity.get()
    }

    /// Clear all items from the cache
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Get an iterator over the cache items (most recent first)
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.inner.iter()
    }
}
