//! TTL cache implementation

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

use parking_lot::Mutex;

use super::config::TtlCacheConfig;
use super::stats::{CacheStats, MetricsCollector};
use crate::time::{Clock, SystemClock};

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

/// Thread-safe cache whose entries expire after a fixed TTL
///
/// # Type Parameters
/// - `K`: Key type (must be `Eq + Hash + Clone`)
/// - `V`: Value type (must be `Clone`)
/// - `C`: Clock type (defaults to `SystemClock`)
pub struct TtlCache<K, V, C = SystemClock>
where
    K: Eq + Hash,
    C: Clock,
{
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    config: TtlCacheConfig,
    metrics: MetricsCollector,
    clock: C,
}

impl<K, V, C> std::fmt::Debug for TtlCache<K, V, C>
where
    K: Eq + Hash,
    C: Clock,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("len", &self.entries.lock().len())
            .field("config", &self.config)
            .finish()
    }
}

impl<K, V> TtlCache<K, V, SystemClock>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a new cache using the system clock
    pub fn new(config: TtlCacheConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<K, V, C> TtlCache<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock,
{
    /// Create a new cache with a custom clock (useful for testing)
    pub fn with_clock(config: TtlCacheConfig, clock: C) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
            metrics: MetricsCollector::default(),
            clock,
        }
    }

    /// Insert a value, replacing any previous entry and resetting its age
    ///
    /// When the cache is bounded and full, the oldest entry is evicted first.
    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock();

        if let Some(max_size) = self.config.max_size {
            if entries.len() >= max_size && !entries.contains_key(&key) {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                    self.metrics.record_eviction();
                }
            }
        }

        entries.insert(key, CacheEntry { value, inserted_at: self.clock.now() });
        self.metrics.record_insert();
    }

    /// Get a value if present and not expired
    ///
    /// An expired entry is removed as a side effect.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut entries = self.entries.lock();
        let now = self.clock.now();

        let expired = match entries.get(key) {
            None => {
                self.metrics.record_miss();
                return None;
            }
            Some(entry) => now.duration_since(entry.inserted_at) >= self.config.ttl,
        };

        if expired {
            entries.remove(key);
            self.metrics.record_miss();
            self.metrics.record_expirations(1);
            return None;
        }

        self.metrics.record_hit();
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Remove a single entry
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.lock().remove(key).map(|entry| entry.value)
    }

    /// Remove every entry whose key matches `predicate`
    ///
    /// Returns the number of removed entries.
    pub fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&K) -> bool,
    {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|k, _| !predicate(k));
        before - entries.len()
    }

    /// Drop every expired entry
    ///
    /// Returns the number of purged entries.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let now = self.clock.now();
        let ttl = self.config.ttl;
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.inserted_at) < ttl);
        let purged = before - entries.len();
        self.metrics.record_expirations(purged as u64);
        purged
    }

    /// Remove all entries
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of stored entries, including ones that expired but were not
    /// purged yet
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Check if the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Current configuration
    pub fn config(&self) -> &TtlCacheConfig {
        &self.config
    }

    /// Snapshot of the performance counters
    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot(self.len())
    }
}
