//! Cache configuration

use std::time::Duration;

/// Default time-to-live for cached values (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Configuration for [`TtlCache`](super::TtlCache)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlCacheConfig {
    /// Time-to-live for entries
    pub ttl: Duration,

    /// Maximum number of entries (None = unlimited)
    pub max_size: Option<usize>,
}

impl Default for TtlCacheConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL, max_size: None }
    }
}

impl TtlCacheConfig {
    /// Unbounded cache with the given TTL
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, max_size: None }
    }

    /// Bound the number of entries
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }
}
