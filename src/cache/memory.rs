//! In-process cache backend.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::cache::{CacheItem, CacheStats, CacheStore, KvCache};
use crate::error::CacheResult;

/// Shared handle to a [`CacheStore`].
///
/// Cloning is cheap; every clone sees the same entries.
#[derive(Debug, Clone)]
pub struct MemoryCache {
    store: Arc<RwLock<CacheStore>>,
}

impl MemoryCache {
    pub fn new(max_entries: usize, value_ceiling: usize) -> Self {
        Self::from_store(CacheStore::new(max_entries, value_ceiling))
    }

    pub fn from_store(store: CacheStore) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
        }
    }

    /// The shared store, for background maintenance.
    pub fn store(&self) -> Arc<RwLock<CacheStore>> {
        self.store.clone()
    }

    pub async fn stats(&self) -> CacheStats {
        self.store.read().await.stats()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }
}

impl KvCache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<CacheItem> {
        // write lock: reads update LRU order and hit counters
        self.store.write().await.get(key)
    }

    async fn set(&self, key: &str, value: &[u8], flags: u32, ttl: u32) -> CacheResult<()> {
        self.store.write().await.set(key, value.to_vec(), flags, ttl)
    }

    async fn add(&self, key: &str, value: &[u8], flags: u32, ttl: u32) -> CacheResult<()> {
        self.store.write().await.add(key, value.to_vec(), flags, ttl)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.store.write().await.delete(key)
    }

    async fn ping(&self) -> CacheResult<()> {
        Ok(())
    }
}
