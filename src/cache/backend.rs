//! Runtime-selected cache backend.

use std::time::Duration;

use crate::cache::{CacheItem, KvCache, MemcacheClient, MemoryCache};
use crate::config::{BackendKind, Config};
use crate::error::CacheResult;

/// Either an in-process cache or a memcached server, chosen by configuration.
#[derive(Debug)]
pub enum CacheBackend {
    Memory(MemoryCache),
    Memcached(MemcacheClient),
}

impl CacheBackend {
    pub fn from_config(config: &Config) -> Self {
        match config.backend {
            BackendKind::Memory => CacheBackend::Memory(MemoryCache::new(
                config.max_entries,
                config.value_ceiling,
            )),
            BackendKind::Memcached => CacheBackend::Memcached(MemcacheClient::new(
                config.memcached_server.clone(),
                Duration::from_secs(config.io_timeout),
            )),
        }
    }

    /// Human readable location of the cache.
    pub fn describe(&self) -> String {
        match self {
            CacheBackend::Memory(_) => "memory".to_string(),
            CacheBackend::Memcached(client) => client.addr().to_string(),
        }
    }

    pub fn as_memory(&self) -> Option<&MemoryCache> {
        match self {
            CacheBackend::Memory(cache) => Some(cache),
            CacheBackend::Memcached(_) => None,
        }
    }
}

impl KvCache for CacheBackend {
    async fn get(&self, key: &str) -> CacheResult<CacheItem> {
        match self {
            CacheBackend::Memory(c) => c.get(key).await,
            CacheBackend::Memcached(c) => c.get(key).await,
        }
    }

    async fn set(&self, key: &str, value: &[u8], flags: u32, ttl: u32) -> CacheResult<()> {
        match self {
            CacheBackend::Memory(c) => c.set(key, value, flags, ttl).await,
            CacheBackend::Memcached(c) => c.set(key, value, flags, ttl).await,
        }
    }

    async fn add(&self, key: &str, value: &[u8], flags: u32, ttl: u32) -> CacheResult<()> {
        match self {
            CacheBackend::Memory(c) => c.add(key, value, flags, ttl).await,
            CacheBackend::Memcached(c) => c.add(key, value, flags, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        match self {
            CacheBackend::Memory(c) => c.delete(key).await,
            CacheBackend::Memcached(c) => c.delete(key).await,
        }
    }

    async fn ping(&self) -> CacheResult<()> {
        match self {
            CacheBackend::Memory(c) => c.ping().await,
            CacheBackend::Memcached(c) => c.ping().await,
        }
    }
}
