//! Response DTOs for the blob server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::blob::StoreReceipt;
use crate::cache::CacheStats;

/// Response body for `PUT /blobs/:name`
#[derive(Debug, Clone, Serialize)]
pub struct StoreResponse {
    /// Key the manifest was written under
    pub name: String,
    /// Hex SHA-256 of the stored content
    pub sha256: String,
    pub fragment_count: u32,
    /// Blob size in bytes
    pub size: u64,
}

impl From<StoreReceipt> for StoreResponse {
    fn from(receipt: StoreReceipt) -> Self {
        Self {
            name: receipt.name.to_string(),
            sha256: receipt.content_hash.to_hex(),
            fragment_count: receipt.fragment_count,
            size: receipt.size,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Rejected add-if-absent writes
    pub add_conflicts: u64,
    pub total_entries: usize,
    pub total_bytes: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            add_conflicts: stats.add_conflicts,
            total_entries: stats.total_entries,
            total_bytes: stats.total_bytes,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// "healthy" or "unavailable"
    pub status: String,
    /// Cache the server talks to
    pub cache: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn healthy(cache: impl Into<String>) -> Self {
        Self {
            status: "healthy".to_string(),
            cache: cache.into(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn unavailable(cache: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: "unavailable".to_string(),
            cache: cache.into(),
            error: Some(error.into()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Response body for the request echo endpoint (GET /info)
#[derive(Debug, Clone, Serialize)]
pub struct InfoResponse {
    pub method: String,
    pub uri: String,
    pub version: String,
    pub host: Option<String>,
    /// Peer address, when the server was started with connect info
    pub remote_addr: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    /// Cache server this instance is configured against
    pub cache_server: String,
}

/// Error response body for conditions not covered by `BlobError`
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
