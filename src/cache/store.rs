//! Cache Store Module
//!
//! In-process cache engine: HashMap storage with LRU tracking, TTL
//! expiration and a per-value size ceiling, mirroring what a memcached
//! server enforces.

use std::collections::HashMap;

use crate::cache::{validate_key, CacheEntry, CacheItem, CacheStats, LruTracker};
use crate::error::{CacheError, CacheResult};

// == Cache Store ==
#[derive(Debug)]
pub struct CacheStore {
    entries: HashMap<String, CacheEntry>,
    lru: LruTracker,
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// Largest value accepted, in bytes
    value_ceiling: usize,
    /// Sum of all stored value sizes
    total_bytes: usize,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a store holding at most `max_entries` values of at most
    /// `value_ceiling` bytes each.
    pub fn new(max_entries: usize, value_ceiling: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_entries,
            value_ceiling,
            total_bytes: 0,
        }
    }

    // == Set ==
    /// Stores a value, replacing any existing entry under `key`.
    ///
    /// When the store is full the least recently used entry is evicted.
    pub fn set(&mut self, key: &str, value: Vec<u8>, flags: u32, ttl: u32) -> CacheResult<()> {
        validate_key(key)?;
        if value.len() > self.value_ceiling {
            return Err(CacheError::ValueTooLarge {
                size: value.len(),
                max: self.value_ceiling,
            });
        }

        let is_overwrite = self.entries.contains_key(key);
        if !is_overwrite && self.entries.len() >= self.max_entries {
            match self.lru.evict_oldest() {
                Some(evicted) => {
                    self.remove_entry(&evicted);
                    self.stats.record_eviction();
                }
                None => {
                    return Err(CacheError::CacheFull(
                        "cache is full and eviction failed".to_string(),
                    ))
                }
            }
        }

        let entry = CacheEntry::new(value, flags, ttl);
        self.total_bytes += entry.size();
        if let Some(old) = self.entries.insert(key.to_string(), entry) {
            self.total_bytes -= old.size();
        }
        self.lru.touch(key);

        Ok(())
    }

    // == Add ==
    /// Stores a value only if no live entry exists under `key`.
    ///
    /// An expired entry counts as absent.
    pub fn add(&mut self, key: &str, value: Vec<u8>, flags: u32, ttl: u32) -> CacheResult<()> {
        validate_key(key)?;
        let live = self
            .entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false);

        if live {
            self.stats.record_add_conflict();
            return Err(CacheError::NotStored(key.to_string()));
        }

        self.set(key, value, flags, ttl)
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Expired entries are removed and counted as misses.
    pub fn get(&mut self, key: &str) -> CacheResult<CacheItem> {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                self.stats.record_miss();
                return Err(CacheError::NotFound(key.to_string()));
            }
        };

        if expired {
            self.remove_entry(key);
            self.stats.record_miss();
            return Err(CacheError::NotFound(key.to_string()));
        }

        self.stats.record_hit();
        self.lru.touch(key);

        self.entries
            .get(key)
            .map(|entry| CacheItem {
                value: entry.value.clone(),
                flags: entry.flags,
            })
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    // == Delete ==
    pub fn delete(&mut self, key: &str) -> CacheResult<()> {
        if self.remove_entry(key) {
            Ok(())
        } else {
            Err(CacheError::NotFound(key.to_string()))
        }
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_totals(self.entries.len(), self.total_bytes);
        stats
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, returning how many were dropped.
    pub fn cleanup_expired(&mut self) -> usize {
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove_entry(key);
        }

        expired_keys.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        self.lru.remove(key);
        match self.entries.remove(key) {
            Some(entry) => {
                self.total_bytes -= entry.size();
                true
            }
            None => false,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MAX_KEY_LENGTH;
    use std::thread::sleep;
    use std::time::Duration;

    fn store() -> CacheStore {
        CacheStore::new(100, 1024)
    }

    #[test]
    fn test_store_new() {
        let mut store = store();
        assert!(store.is_empty());
        assert!(store.set("max", vec![0u8; 1024], 0, 0).is_ok());
        assert!(store.set("over", vec![0u8; 1025], 0, 0).is_err());
    }

    #[test]
    fn test_store_set_and_get_keeps_flags() {
        let mut store = store();

        store.set("manifest", vec![7u8; 32], 3, 0).unwrap();
        let item = store.get("manifest").unwrap();

        assert_eq!(item.value, vec![7u8; 32]);
        assert_eq!(item.flags, 3);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store = store();
        assert!(matches!(store.get("nope"), Err(CacheError::NotFound(_))));
    }

    #[test]
    fn test_store_add_refuses_existing_key() {
        let mut store = store();

        store.add("k", b"first".to_vec(), 0, 0).unwrap();
        let result = store.add("k", b"second".to_vec(), 0, 0);

        assert!(matches!(result, Err(CacheError::NotStored(_))));
        assert_eq!(store.get("k").unwrap().value, b"first");
        assert_eq!(store.stats().add_conflicts, 1);
    }

    #[test]
    fn test_store_add_over_expired_entry() {
        let mut store = store();

        store.set("k", b"old".to_vec(), 0, 1).unwrap();
        sleep(Duration::from_millis(1100));

        store.add("k", b"new".to_vec(), 0, 0).unwrap();
        assert_eq!(store.get("k").unwrap().value, b"new");
    }

    #[test]
    fn test_store_delete() {
        let mut store = store();

        store.set("k", b"v".to_vec(), 0, 0).unwrap();
        store.delete("k").unwrap();

        assert!(store.is_empty());
        assert!(matches!(store.delete("k"), Err(CacheError::NotFound(_))));
    }

    #[test]
    fn test_store_overwrite_tracks_bytes() {
        let mut store = store();

        store.set("k", vec![0u8; 100], 0, 0).unwrap();
        store.set("k", vec![0u8; 40], 0, 0).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.total_bytes, 40);
    }

    #[test]
    fn test_store_ttl_expiration() {
        let mut store = store();

        store.set("k", b"v".to_vec(), 0, 1).unwrap();
        assert!(store.get("k").is_ok());

        sleep(Duration::from_millis(1100));
        assert!(matches!(store.get("k"), Err(CacheError::NotFound(_))));
        assert_eq!(store.stats().total_bytes, 0);
    }

    #[test]
    fn test_store_lru_eviction() {
        let mut store = CacheStore::new(3, 1024);

        store.set("a", b"1".to_vec(), 0, 0).unwrap();
        store.set("b", b"2".to_vec(), 0, 0).unwrap();
        store.set("c", b"3".to_vec(), 0, 0).unwrap();
        store.get("a").unwrap();
        store.set("d", b"4".to_vec(), 0, 0).unwrap();

        assert_eq!(store.len(), 3);
        assert!(store.get("a").is_ok());
        assert!(matches!(store.get("b"), Err(CacheError::NotFound(_))));
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_store_cleanup_expired() {
        let mut store = store();

        store.set("short", b"v".to_vec(), 0, 1).unwrap();
        store.set("long", b"v".to_vec(), 0, 60).unwrap();
        store.set("forever", b"v".to_vec(), 0, 0).unwrap();

        sleep(Duration::from_millis(1100));

        assert_eq!(store.cleanup_expired(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_store_rejects_invalid_key() {
        let mut store = store();

        let long_key = "x".repeat(MAX_KEY_LENGTH + 1);
        assert!(matches!(
            store.set(&long_key, b"v".to_vec(), 0, 0),
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(
            store.set("with space", b"v".to_vec(), 0, 0),
            Err(CacheError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_store_value_too_large() {
        let mut store = store();

        let result = store.set("k", vec![0u8; 1025], 0, 0);
        assert!(matches!(
            result,
            Err(CacheError::ValueTooLarge {
                size: 1025,
                max: 1024
            })
        ));
        assert!(store.set("k", vec![0u8; 1024], 0, 0).is_ok());
    }
}
