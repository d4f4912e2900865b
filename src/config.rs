//! Configuration Module
//!
//! Loads settings from environment variables. Command-line flags override
//! these values in the binary.

use std::env;
use std::str::FromStr;

use crate::cache::DEFAULT_VALUE_CEILING;

/// Which cache collaborator to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    /// A memcached server reached over TCP
    Memcached,
    /// An in-process cache (useful for `serve` and tests)
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memcached" => Ok(BackendKind::Memcached),
            "memory" => Ok(BackendKind::Memory),
            other => Err(format!("unknown cache backend: {}", other)),
        }
    }
}

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address of the memcached server (`host:port`)
    pub memcached_server: String,
    /// Cache collaborator to use
    pub backend: BackendKind,
    /// Largest blob accepted by store, in bytes
    pub max_blob_size: u64,
    /// Per-value limit of the cache, in bytes
    pub value_ceiling: usize,
    /// Bytes of each value reserved for the cache's item encoding
    pub reserved_overhead: usize,
    /// Expiration applied to written entries, in seconds (0 = never)
    pub entry_ttl: u32,
    /// Memcached request timeout in seconds
    pub io_timeout: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Capacity of the in-memory backend
    pub max_entries: usize,
    /// In-memory backend expiry sweep interval in seconds
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a Config from environment variables.
    ///
    /// # Environment Variables
    /// - `MEMCACHED_SERVER` (default: 127.0.0.1:11211)
    /// - `CACHE_BACKEND` - `memcached` or `memory` (default: memcached)
    /// - `MAX_BLOB_SIZE` (default: 104857600)
    /// - `VALUE_CEILING` (default: 1048576)
    /// - `RESERVED_OVERHEAD` (default: 62)
    /// - `ENTRY_TTL` (default: 0)
    /// - `IO_TIMEOUT` (default: 5)
    /// - `SERVER_PORT` (default: 3000)
    /// - `MAX_ENTRIES` (default: 10000)
    /// - `CLEANUP_INTERVAL` (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            memcached_server: env::var("MEMCACHED_SERVER").unwrap_or(defaults.memcached_server),
            backend: parse_env("CACHE_BACKEND").unwrap_or(defaults.backend),
            max_blob_size: parse_env("MAX_BLOB_SIZE").unwrap_or(defaults.max_blob_size),
            value_ceiling: parse_env("VALUE_CEILING").unwrap_or(defaults.value_ceiling),
            reserved_overhead: parse_env("RESERVED_OVERHEAD")
                .unwrap_or(defaults.reserved_overhead),
            entry_ttl: parse_env("ENTRY_TTL").unwrap_or(defaults.entry_ttl),
            io_timeout: parse_env("IO_TIMEOUT").unwrap_or(defaults.io_timeout),
            server_port: parse_env("SERVER_PORT").unwrap_or(defaults.server_port),
            max_entries: parse_env("MAX_ENTRIES").unwrap_or(defaults.max_entries),
            cleanup_interval: parse_env("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memcached_server: "127.0.0.1:11211".to_string(),
            backend: BackendKind::Memcached,
            max_blob_size: 100 * 1024 * 1024,
            value_ceiling: DEFAULT_VALUE_CEILING,
            reserved_overhead: 62,
            entry_ttl: 0,
            io_timeout: 5,
            server_port: 3000,
            max_entries: 10_000,
            cleanup_interval: 1,
        }
    }
}
