//! Manifest entry encoding.
//!
//! The manifest lives under the blob's own name. Its value is the raw
//! 32-byte content hash; the fragment count travels in the entry's flags.

use crate::blob::{BlobName, ContentHash, HASH_LEN};
use crate::cache::CacheItem;
use crate::error::{BlobError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Manifest {
    pub content_hash: ContentHash,
    pub fragment_count: u32,
}

impl Manifest {
    /// Value bytes to store.
    pub fn value(&self) -> &[u8] {
        self.content_hash.as_bytes()
    }

    /// Flags word to store.
    pub fn flags(&self) -> u32 {
        self.fragment_count
    }

    pub fn decode(name: &BlobName, item: &CacheItem) -> Result<Self> {
        let corrupt = |reason: String| BlobError::CorruptManifest {
            name: name.to_string(),
            reason,
        };

        let content_hash = ContentHash::from_slice(&item.value).ok_or_else(|| {
            corrupt(format!(
                "expected a {} byte digest, found {} bytes",
                HASH_LEN,
                item.value.len()
            ))
        })?;

        if item.flags == 0 {
            return Err(corrupt("fragment count is zero".to_string()));
        }

        Ok(Self {
            content_hash,
            fragment_count: item.flags,
        })
    }
}
