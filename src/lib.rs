//! memza - chunked blob storage on a bounded-value key-value cache
//!
//! Stores blobs larger than the cache's per-value limit as numbered
//! fragments plus a manifest holding the content's SHA-256, and verifies
//! the content on the way back out.

pub mod api;
pub mod blob;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::{create_router, AppState};
pub use blob::{BlobName, BlobStore, ChunkSettings, Retrieved, StoreReceipt};
pub use cache::{CacheBackend, KvCache, MemcacheClient, MemoryCache};
pub use config::Config;
pub use error::{BlobError, CacheError};
pub use tasks::spawn_cleanup_task;
