//! Blob Module
//!
//! Chunked storage of large blobs in a cache with a bounded value size.
//!
//! A blob named `name` is stored as fragments `name-1 ..= name-N` holding
//! consecutive slices of its content, plus a manifest under `name` whose
//! value is the SHA-256 of the whole blob and whose flags word is `N`.

mod hasher;
mod manifest;
mod naming;
mod planner;
mod retrieve;
mod store;


pub use hasher::{digest, hash_reader, ContentHash, ContentHasher, HASH_LEN};
pub use manifest::Manifest;
pub use naming::{fragment_key, BlobName, FRAGMENT_SEPARATOR};
pub use planner::{chunk_ceiling, plan, ChunkPlan};
pub use retrieve::{Assembly, Retrieved};
pub use store::{BlobStore, ChunkSettings, StoreReceipt};
