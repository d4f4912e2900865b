//! Retrieve Orchestrator
//!
//! Reads the manifest, pulls fragments `1..=N` strictly in order into a
//! sink and checks the reassembled content against the manifest's digest.
//! There are no retries: the first missing fragment ends the retrieve.

use std::io::ErrorKind;
use std::path::Path;

use tempfile::NamedTempFile;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use crate::blob::{BlobName, BlobStore, ContentHash, ContentHasher, Manifest};
use crate::cache::KvCache;
use crate::error::{BlobError, Result};

// == Assembly ==
/// Outcome of pulling every fragment of a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assembly {
    pub manifest: Manifest,
    /// Bytes written to the sink
    pub size: u64,
    /// Digest of the bytes actually assembled
    pub actual: ContentHash,
}

impl Assembly {
    pub fn is_intact(&self) -> bool {
        self.actual == self.manifest.content_hash
    }

    /// `IntegrityMismatch` when the assembled bytes differ from what was stored.
    pub fn verify(&self) -> Result<()> {
        if self.is_intact() {
            Ok(())
        } else {
            Err(BlobError::IntegrityMismatch {
                expected: self.manifest.content_hash,
                actual: self.actual,
            })
        }
    }
}

/// A fully assembled blob held in memory.
///
/// The bytes are kept even when they fail verification; the caller decides
/// whether to discard them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieved {
    pub data: Vec<u8>,
    pub assembly: Assembly,
}

impl Retrieved {
    pub fn verify(&self) -> Result<()> {
        self.assembly.verify()
    }

    /// The bytes, or `IntegrityMismatch` if they are corrupt.
    pub fn into_verified(self) -> Result<Vec<u8>> {
        self.assembly.verify()?;
        Ok(self.data)
    }
}

impl<C: KvCache> BlobStore<C> {
    /// Reads and decodes the manifest of `name`.
    pub async fn fetch_manifest(&self, name: &BlobName) -> Result<Manifest> {
        let item = self.cache().get(name.as_str()).await.map_err(|cause| {
            if cause.is_miss() {
                BlobError::ManifestNotFound {
                    name: name.to_string(),
                    cause,
                }
            } else {
                BlobError::CacheTransport(cause)
            }
        })?;

        let manifest = Manifest::decode(name, &item)?;
        debug!(
            "Manifest for {}: {} fragments, sha256 {}",
            name, manifest.fragment_count, manifest.content_hash
        );
        Ok(manifest)
    }

    // == Retrieve Into ==
    /// Streams the blob into `sink` and verifies it.
    ///
    /// On `IntegrityMismatch` every byte has already been written to `sink`.
    /// On any other error `sink` may hold a prefix of the blob (the
    /// fragments before the one that failed); callers that must not expose
    /// partial output should use [`BlobStore::retrieve_to_file`] or discard
    /// the sink.
    pub async fn retrieve_into<W>(&self, name: &BlobName, sink: &mut W) -> Result<Assembly>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let assembly = self.assemble(name, sink).await?;
        assembly.verify()?;
        Ok(assembly)
    }

    // == Retrieve To File ==
    /// Writes the blob to `path` through a temporary file in the same
    /// directory.
    ///
    /// `path` is only replaced once every fragment has been fetched. On
    /// `IntegrityMismatch` the unverified bytes are still moved into place;
    /// on any other error the temporary file is removed and an existing
    /// file at `path` is left untouched.
    pub async fn retrieve_to_file(&self, name: &BlobName, path: &Path) -> Result<Assembly> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let temp = NamedTempFile::new_in(dir)?;
        let mut sink = BufWriter::new(tokio::fs::File::from_std(temp.reopen()?));

        let outcome = self.retrieve_into(name, &mut sink).await;
        if !matches!(outcome, Ok(_) | Err(BlobError::IntegrityMismatch { .. })) {
            return outcome;
        }
        sink.shutdown().await?;
        drop(sink);

        temp.persist(path).map_err(|e| {
            BlobError::LocalIo(std::io::Error::new(
                ErrorKind::Other,
                format!("failed to move output into {}: {}", path.display(), e.error),
            ))
        })?;
        debug!("Moved retrieved {} into {}", name, path.display());
        outcome
    }

    // == Retrieve ==
    /// Assembles the blob in memory. Verification is left to the caller
    /// through [`Retrieved::verify`] so corrupt bytes are still available.
    pub async fn retrieve(&self, name: &BlobName) -> Result<Retrieved> {
        let mut data = Vec::new();
        let assembly = self.assemble(name, &mut data).await?;
        Ok(Retrieved { data, assembly })
    }

    async fn assemble<W>(&self, name: &BlobName, sink: &mut W) -> Result<Assembly>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let manifest = self.fetch_manifest(name).await?;
        let mut hasher = ContentHasher::new();

        for index in 1..=manifest.fragment_count {
            let key = name.fragment_key(index);
            let item = self
                .cache()
                .get(&key)
                .await
                .map_err(|cause| BlobError::FragmentMissing { index, cause })?;

            sink.write_all(&item.value).await?;
            hasher.update(&item.value);
            debug!("Fetched fragment {} ({} bytes) from {}", index, item.value.len(), key);
        }
        sink.flush().await?;

        let assembly = Assembly {
            manifest,
            size: hasher.len(),
            actual: hasher.finalize(),
        };

        if assembly.is_intact() {
            info!("Retrieved {} ({} bytes, sha256 {})", name, assembly.size, assembly.actual);
        } else {
            warn!(
                "Retrieved {} but sha256 {} does not match manifest {}",
                name, assembly.actual, manifest.content_hash
            );
        }
        Ok(assembly)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{digest, ChunkSettings};
    use crate::cache::MemoryCache;
    use crate::error::CacheError;

    fn blob_store() -> BlobStore<MemoryCache> {
        let settings = ChunkSettings {
            value_ceiling: 64,
            reserved_overhead: 8,
            max_blob_size: 4096,
            entry_ttl: 0,
        };
        BlobStore::new(MemoryCache::new(1000, 64), settings)
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 256) as u8).collect()
    }

    #[tokio::test]
    async fn test_round_trip() {
        let store = blob_store();
        let name = BlobName::new("blob").unwrap();
        let data = sample(500);

        let receipt = store.store_bytes(&name, &data, false).await.unwrap();
        let retrieved = store.retrieve(&name).await.unwrap();

        assert!(retrieved.verify().is_ok());
        assert_eq!(retrieved.assembly.manifest.fragment_count, receipt.fragment_count);
        assert_eq!(retrieved.assembly.actual, digest(&data));
        assert_eq!(retrieved.into_verified().unwrap(), data);
    }

    #[tokio::test]
    async fn test_retrieve_into_sink() {
        let store = blob_store();
        let name = BlobName::new("blob").unwrap();
        let data = sample(130);
        store.store_bytes(&name, &data, false).await.unwrap();

        let mut sink = Vec::new();
        let assembly = store.retrieve_into(&name, &mut sink).await.unwrap();

        assert_eq!(sink, data);
        assert_eq!(assembly.size, 130);
    }

    #[tokio::test]
    async fn test_missing_manifest() {
        let store = blob_store();
        let name = BlobName::new("nothing").unwrap();

        let result = store.retrieve(&name).await;
        assert!(matches!(
            result,
            Err(BlobError::ManifestNotFound {
                cause: CacheError::NotFound(_),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_corrupt_manifest() {
        let store = blob_store();
        let name = BlobName::new("blob").unwrap();
        store.cache().set("blob", b"short", 2, 0).await.unwrap();

        assert!(matches!(
            store.retrieve(&name).await,
            Err(BlobError::CorruptManifest { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_fragment_stops_retrieve() {
        let store = blob_store();
        let name = BlobName::new("blob").unwrap();
        // 52 bytes per fragment: 5 fragments
        store.store_bytes(&name, &sample(250), false).await.unwrap();
        store.cache().delete("blob-3").await.unwrap();

        let mut sink = Vec::new();
        let result = store.retrieve_into(&name, &mut sink).await;

        assert!(matches!(result, Err(BlobError::FragmentMissing { index: 3, .. })));
        // Fragments 1 and 2 reached the sink before the miss
        assert_eq!(sink, sample(250)[..104]);
        assert!(matches!(
            store.retrieve(&name).await,
            Err(BlobError::FragmentMissing { index: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_corruption_detected_but_bytes_returned() {
        let store = blob_store();
        let name = BlobName::new("blob").unwrap();
        let data = sample(150);
        store.store_bytes(&name, &data, false).await.unwrap();

        let mut tampered = store.cache().get("blob-2").await.unwrap().value;
        tampered[0] ^= 0xff;
        store.cache().set("blob-2", &tampered, 0, 0).await.unwrap();

        let retrieved = store.retrieve(&name).await.unwrap();
        assert_eq!(retrieved.data.len(), data.len());
        assert_ne!(retrieved.data, data);
        assert!(matches!(
            retrieved.verify(),
            Err(BlobError::IntegrityMismatch { expected, .. }) if expected == digest(&data)
        ));

        let mut sink = Vec::new();
        let result = store.retrieve_into(&name, &mut sink).await;
        assert!(matches!(result, Err(BlobError::IntegrityMismatch { .. })));
        assert_eq!(sink, retrieved.data);
    }
}
