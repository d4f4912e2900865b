//! Cache Module
//!
//! The key-value cache collaborator: a trait describing the operations the
//! blob protocol needs, an in-process implementation with TTL expiration and
//! LRU eviction, and a memcached text-protocol client.

mod backend;
mod entry;
mod lru;
mod memcached;
mod memory;
mod stats;
mod store;


use std::future::Future;

use crate::error::{CacheError, CacheResult};

// Re-export public types
pub use backend::CacheBackend;
pub use entry::CacheEntry;
pub use lru::LruTracker;
pub use memcached::MemcacheClient;
pub use memory::MemoryCache;
pub use stats::CacheStats;
pub use store::CacheStore;

// == Public Constants ==
/// Maximum allowed key length in bytes (memcached limit)
pub const MAX_KEY_LENGTH: usize = 250;

/// Default per-value size ceiling in bytes
pub const DEFAULT_VALUE_CEILING: usize = 1024 * 1024; // 1 MB

// == Cache Item ==
/// A value read back from the cache together with its opaque flags word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheItem {
    pub value: Vec<u8>,
    pub flags: u32,
}

// == KvCache Trait ==
/// Operations the blob layer relies on.
///
/// Only per-key read-your-writes is assumed. A missing key is reported as
/// [`CacheError::NotFound`]; every other error is a transport or server
/// failure. `ttl` is in seconds, `0` meaning the entry never expires.
pub trait KvCache: Send + Sync {
    /// Fetches a single key.
    fn get(&self, key: &str) -> impl Future<Output = CacheResult<CacheItem>> + Send;

    /// Stores a value unconditionally.
    fn set(
        &self,
        key: &str,
        value: &[u8],
        flags: u32,
        ttl: u32,
    ) -> impl Future<Output = CacheResult<()>> + Send;

    /// Stores a value only if the key is absent; [`CacheError::NotStored`] otherwise.
    fn add(
        &self,
        key: &str,
        value: &[u8],
        flags: u32,
        ttl: u32,
    ) -> impl Future<Output = CacheResult<()>> + Send;

    /// Removes a key.
    fn delete(&self, key: &str) -> impl Future<Output = CacheResult<()>> + Send;

    /// Liveness probe.
    fn ping(&self) -> impl Future<Output = CacheResult<()>> + Send;
}

// == Key Validation ==
/// Checks a key against memcached's rules: 1..=250 bytes, no whitespace or
/// control characters.
pub fn validate_key(key: &str) -> CacheResult<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(CacheError::InvalidKey(format!(
            "key {:?} contains whitespace or control characters",
            key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key_accepts_paths() {
        assert!(validate_key("/tmp/archive.tar.gz").is_ok());
        assert!(validate_key("blob-42").is_ok());
    }

    #[test]
    fn test_validate_key_rejects_bad_keys() {
        assert!(validate_key("").is_err());
        assert!(validate_key("has space").is_err());
        assert!(validate_key("tab\there").is_err());
        assert!(validate_key("nl\n").is_err());
        assert!(validate_key(&"k".repeat(MAX_KEY_LENGTH + 1)).is_err());
        assert!(validate_key(&"k".repeat(MAX_KEY_LENGTH)).is_ok());
    }
}
