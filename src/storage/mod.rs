//! Object storage destinations for encoded documents.

pub mod local;
pub mod s3;

use std::sync::Arc;

use async_trait::async_trait;

pub use local::LocalObjectStore;
pub use s3::HttpObjectStore;

use crate::config::{Config, StorageBackend};
use crate::error::Result;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` at `bucket`/`key`, replacing any existing object.
    async fn put(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;
}

/// Build the configured store.
pub fn from_config(cfg: &Config) -> Result<Arc<dyn ObjectStore>> {
    Ok(match cfg.storage_backend {
        StorageBackend::S3 => Arc::new(HttpObjectStore::new(&cfg.s3_endpoint)?),
        StorageBackend::Local => Arc::new(LocalObjectStore::new(&cfg.local_storage_root)),
    })
}
