//! Storage module
//!
//! Provides blob storage for uploaded post images.

pub mod blob_store;

pub use blob_store::BlobStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A stored blob as reported by [`BlobStorage::list`]
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub key: String,
    pub modified_at: DateTime<Utc>,
}

/// Key-addressed byte storage for post images.
///
/// Keys are opaque and generated by the store on `put`; callers never
/// build paths themselves.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Store bytes under a fresh key ending in `.{extension}`
    async fn put(&self, data: &[u8], extension: &str) -> Result<String>;

    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Remove a blob. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn list(&self) -> Result<Vec<StoredBlob>>;

    /// Remove leftovers of interrupted writes last touched at or before
    /// `older_than`. Returns how many were removed.
    async fn purge_partial_writes(&self, older_than: DateTime<Utc>) -> Result<usize>;
}
