//! Time-bounded value cache
//!
//! A small, thread-safe cache whose entries expire after a fixed
//! time-to-live. Expired entries are purged lazily when they are next looked
//! up, or in bulk through [`TtlCache::purge_expired`].
//!
//! # Features
//!
//! - **Thread-safe**: a single `parking_lot::Mutex` around the entry map
//! - **TTL expiry**: entries older than the configured TTL read as absent
//! - **Optional bound**: oldest entries are evicted past `max_size`
//! - **Testable**: generic over [`Clock`](crate::time::Clock)
//!
//! # Example
//! ```
//! use std::time::Duration;
//!
//! use cipherstore_common::cache::{TtlCache, TtlCacheConfig};
//!
//! let cache: TtlCache<String, String> =
//!     TtlCache::new(TtlCacheConfig::new(Duration::from_secs(300)));
//! cache.insert("players:1:gold".to_string(), "100".to_string());
//! assert_eq!(cache.get("players:1:gold"), Some("100".to_string()));
//! ```

pub mod config;
pub mod stats;
pub mod ttl;

pub use config::TtlCacheConfig;
pub use stats::CacheStats;
pub use ttl::TtlCache;
