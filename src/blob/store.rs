//! Store Orchestrator
//!
//! Writes a blob as N fragment entries followed by its manifest entry.
//!
//! The manifest is written last: once it is visible, every fragment it
//! names has been written. Without `force`, every write goes through the
//! cache's add-if-absent primitive, so two concurrent writers of the same
//! name cannot silently overwrite each other.

use std::io::ErrorKind;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use crate::blob::{
    chunk_ceiling, digest, hash_reader, plan, BlobName, ChunkPlan, ContentHash, ContentHasher,
    Manifest,
};
use crate::cache::{KvCache, DEFAULT_VALUE_CEILING};
use crate::config::Config;
use crate::error::{BlobError, CacheError, Result};

// == Chunk Settings ==
/// Limits applied when cutting blobs into fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSettings {
    /// Per-value limit of the cache
    pub value_ceiling: usize,
    /// Bytes of each value reserved for the cache's item encoding
    pub reserved_overhead: usize,
    /// Largest blob accepted
    pub max_blob_size: u64,
    /// Expiration for written entries in seconds, 0 = never
    pub entry_ttl: u32,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            value_ceiling: DEFAULT_VALUE_CEILING,
            reserved_overhead: 62,
            max_blob_size: 100 * 1024 * 1024,
            entry_ttl: 0,
        }
    }
}

impl ChunkSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            value_ceiling: config.value_ceiling,
            reserved_overhead: config.reserved_overhead,
            max_blob_size: config.max_blob_size,
            entry_ttl: config.entry_ttl,
        }
    }

    /// Fragment payload size for `name`: longer names leave less room.
    pub fn chunk_ceiling(&self, name: &BlobName) -> Result<u64> {
        chunk_ceiling(
            self.value_ceiling,
            self.reserved_overhead,
            name.as_str().len(),
        )
    }

    pub fn plan(&self, name: &BlobName, total_size: u64) -> Result<ChunkPlan> {
        plan(total_size, self.chunk_ceiling(name)?, self.max_blob_size)
    }
}

// == Store Receipt ==
/// What a successful store wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreReceipt {
    pub name: BlobName,
    pub content_hash: ContentHash,
    pub fragment_count: u32,
    pub size: u64,
}

// == Blob Store ==
/// Chunked blob operations over a cache collaborator.
///
/// Holds no state besides its cache handle and settings; every call is
/// independent of previous ones except through the cache's contents.
#[derive(Debug)]
pub struct BlobStore<C> {
    cache: C,
    settings: ChunkSettings,
}

impl<C: KvCache> BlobStore<C> {
    pub fn new(cache: C, settings: ChunkSettings) -> Self {
        Self { cache, settings }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn settings(&self) -> &ChunkSettings {
        &self.settings
    }

    // == Store Bytes ==
    /// Stores an in-memory blob under `name`.
    pub async fn store_bytes(
        &self,
        name: &BlobName,
        data: &[u8],
        force: bool,
    ) -> Result<StoreReceipt> {
        let plan = self.settings.plan(name, data.len() as u64)?;
        let content_hash = digest(data);

        self.write_blob(name, plan, content_hash, data, force).await
    }

    // == Store File ==
    /// Stores the file at `path` under `name`.
    ///
    /// The file is read twice: once to hash it completely before any entry
    /// is written, then again in fragment-sized reads while writing.
    pub async fn store_file(
        &self,
        path: impl AsRef<Path>,
        name: &BlobName,
        force: bool,
    ) -> Result<StoreReceipt> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| source_error(path, e))?;
        if !metadata.is_file() {
            return Err(BlobError::SourceNotFound(path.to_path_buf()));
        }

        let plan = self.settings.plan(name, metadata.len())?;
        debug!(
            "Planned {} ({} bytes) as {} fragments of up to {} bytes",
            path.display(),
            plan.total_size,
            plan.fragment_count,
            plan.chunk_size
        );

        let file = File::open(path).await.map_err(|e| source_error(path, e))?;
        let (content_hash, hashed) =
            hash_reader(file, plan.total_size, buffer_len(&plan)).await?;
        if hashed != plan.total_size {
            return Err(BlobError::LocalIo(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                format!(
                    "{} shrank from {} to {} bytes while hashing",
                    path.display(),
                    plan.total_size,
                    hashed
                ),
            )));
        }

        let file = File::open(path).await.map_err(|e| source_error(path, e))?;
        self.write_blob(name, plan, content_hash, file, force).await
    }

    async fn write_blob<R>(
        &self,
        name: &BlobName,
        plan: ChunkPlan,
        content_hash: ContentHash,
        mut source: R,
        force: bool,
    ) -> Result<StoreReceipt>
    where
        R: AsyncRead + Unpin + Send,
    {
        info!(
            "Storing {} ({} bytes, {} fragments, sha256 {})",
            name, plan.total_size, plan.fragment_count, content_hash
        );

        let previous_count = self.check_existing(name, force).await?;

        let mut buf = vec![0u8; buffer_len(&plan)];
        let mut written = ContentHasher::new();
        for index in 1..=plan.fragment_count {
            let Some(len) = plan.fragment_len(index) else {
                break;
            };
            let chunk = &mut buf[..len as usize];
            source.read_exact(chunk).await?;
            written.update(chunk);

            let key = name.fragment_key(index);
            self.put(&key, chunk, 0, force).await?;
            debug!("Wrote fragment {} ({} bytes) as {}", index, len, key);
        }

        // No manifest for fragments that differ from the announced digest
        let written = written.finalize();
        if written != content_hash {
            warn!(
                "Not writing manifest for {}: fragments hash to {}, expected {}",
                name, written, content_hash
            );
            return Err(BlobError::LocalIo(std::io::Error::new(
                ErrorKind::InvalidData,
                format!(
                    "{} changed while being stored: sha256 {} then {}",
                    name, content_hash, written
                ),
            )));
        }

        let manifest = Manifest {
            content_hash,
            fragment_count: plan.fragment_count,
        };
        self.put(name.as_str(), manifest.value(), manifest.flags(), force)
            .await?;

        if let Some(previous) = previous_count {
            self.drop_stale_fragments(name, plan.fragment_count, previous)
                .await;
        }

        info!("Stored {} (sha256 {})", name, content_hash);
        Ok(StoreReceipt {
            name: name.clone(),
            content_hash,
            fragment_count: plan.fragment_count,
            size: plan.total_size,
        })
    }

    /// Rejects an existing manifest unless `force` is set. When forcing over
    /// an existing blob, returns its fragment count.
    async fn check_existing(&self, name: &BlobName, force: bool) -> Result<Option<u32>> {
        match self.cache.get(name.as_str()).await {
            Ok(_) if !force => Err(BlobError::KeyExists(name.to_string())),
            Ok(item) => Ok(Manifest::decode(name, &item)
                .ok()
                .map(|manifest| manifest.fragment_count)),
            Err(e) if e.is_miss() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: &[u8], flags: u32, force: bool) -> Result<()> {
        let ttl = self.settings.entry_ttl;
        if force {
            self.cache.set(key, value, flags, ttl).await?;
            return Ok(());
        }

        match self.cache.add(key, value, flags, ttl).await {
            Ok(()) => Ok(()),
            Err(CacheError::NotStored(_)) => Err(BlobError::KeyExists(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes fragments left over by a larger blob that was overwritten,
    /// so that `name-(N+1)` never exists after storing N fragments.
    async fn drop_stale_fragments(&self, name: &BlobName, current: u32, previous: u32) {
        for index in current.saturating_add(1)..=previous {
            let key = name.fragment_key(index);
            match self.cache.delete(&key).await {
                Ok(()) => debug!("Removed stale fragment {}", key),
                Err(e) if e.is_miss() => {}
                Err(e) => warn!("Failed to remove stale fragment {}: {}", key, e),
            }
        }
    }
}

fn buffer_len(plan: &ChunkPlan) -> usize {
    plan.chunk_size.min(plan.total_size) as usize
}

fn source_error(path: &Path, err: std::io::Error) -> BlobError {
    if err.kind() == ErrorKind::NotFound {
        BlobError::SourceNotFound(path.to_path_buf())
    } else {
        BlobError::LocalIo(err)
    }
}
