//! Specialized data structures
//!
//! - **[`lru`]**: LRU cache with caller-controlled eviction protection

pub mod lru;

// Re-export commonly used types
pub use lru::LruCache;
