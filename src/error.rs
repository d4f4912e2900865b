//! Error types for memza
//!
//! `CacheError` covers the key-value cache collaborator, `BlobError` covers
//! the chunked store/retrieve protocol built on top of it.

use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::blob::ContentHash;

// == Cache Error Enum ==
/// Errors reported by a cache collaborator.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not present (never written, evicted or expired)
    #[error("key not found: {0}")]
    NotFound(String),

    /// Conditional write refused because the key already exists
    #[error("key not stored (already present): {0}")]
    NotStored(String),

    /// Key rejected by the cache's key rules
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Value exceeds the cache's per-entry ceiling
    #[error("value of {size} bytes exceeds the {max} byte limit")]
    ValueTooLarge { size: usize, max: usize },

    /// Cache is full and eviction failed
    #[error("cache full: {0}")]
    CacheFull(String),

    /// Unexpected or malformed reply from the server
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server reported an error (SERVER_ERROR / CLIENT_ERROR)
    #[error("server error: {0}")]
    Server(String),

    /// Request did not complete within the configured timeout
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Connection level failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// True when the error means "data absent" rather than a failure.
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

// == Blob Error Enum ==
/// Errors returned by the store and retrieve operations.
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("blob is empty")]
    EmptyBlob,

    #[error("blob of {size} bytes exceeds the maximum of {max} bytes")]
    BlobTooLarge { size: u64, max: u64 },

    #[error("source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("key exists: {0}")]
    KeyExists(String),

    #[error("invalid blob name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid chunk plan: {0}")]
    InvalidChunkPlan(String),

    #[error("manifest not found for {name}: {cause}")]
    ManifestNotFound {
        name: String,
        #[source]
        cause: CacheError,
    },

    #[error("corrupt manifest for {name}: {reason}")]
    CorruptManifest { name: String, reason: String },

    #[error("fragment {index} missing: {cause}")]
    FragmentMissing {
        index: u32,
        #[source]
        cause: CacheError,
    },

    #[error("integrity mismatch: expected sha256 {expected}, got {actual}")]
    IntegrityMismatch {
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error("cache error: {0}")]
    CacheTransport(#[from] CacheError),

    #[error("local i/o error: {0}")]
    LocalIo(#[from] std::io::Error),
}

// == IntoResponse Implementation ==
impl IntoResponse for BlobError {
    fn into_response(self) -> Response {
        let status = match &self {
            BlobError::EmptyBlob
            | BlobError::InvalidName { .. }
            | BlobError::InvalidChunkPlan(_) => StatusCode::BAD_REQUEST,
            BlobError::BlobTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            BlobError::SourceNotFound(_) | BlobError::ManifestNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            BlobError::KeyExists(_) => StatusCode::CONFLICT,
            BlobError::FragmentMissing { .. } => StatusCode::GONE,
            BlobError::CorruptManifest { .. }
            | BlobError::IntegrityMismatch { .. }
            | BlobError::LocalIo(_) => StatusCode::INTERNAL_SERVER_ERROR,
            BlobError::CacheTransport(CacheError::NotFound(_)) => StatusCode::NOT_FOUND,
            BlobError::CacheTransport(_) => StatusCode::BAD_GATEWAY,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Aliases ==
/// Result type for the blob protocol.
pub type Result<T> = std::result::Result<T, BlobError>;

/// Result type for cache collaborators.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_detection() {
        assert!(CacheError::NotFound("k".into()).is_miss());
        assert!(!CacheError::NotStored("k".into()).is_miss());
        assert!(!CacheError::Protocol("bad".into()).is_miss());
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (BlobError::EmptyBlob, StatusCode::BAD_REQUEST),
            (
                BlobError::BlobTooLarge { size: 10, max: 5 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (BlobError::KeyExists("a".into()), StatusCode::CONFLICT),
            (
                BlobError::ManifestNotFound {
                    name: "a".into(),
                    cause: CacheError::NotFound("a".into()),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                BlobError::FragmentMissing {
                    index: 3,
                    cause: CacheError::NotFound("a-3".into()),
                },
                StatusCode::GONE,
            ),
            (
                BlobError::CacheTransport(CacheError::Protocol("x".into())),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_fragment_missing_message_names_index() {
        let err = BlobError::FragmentMissing {
            index: 7,
            cause: CacheError::NotFound("blob-7".into()),
        };
        assert!(err.to_string().contains("fragment 7"));
    }
}
