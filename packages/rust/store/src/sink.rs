//! Sink abstraction over blob storage for the pipeline.

use async_trait::async_trait;
use bytes::Bytes;
use pomwatch_shared::Result;

use crate::s3::S3Store;

/// Destination for expanded descriptors, keyed by content hash.
///
/// The pipeline only ever stores blobs; this narrow seam keeps it testable
/// without a live bucket.
#[async_trait]
pub trait BlobSink: Send + Sync {
    /// Store `blob` under `key`, returning a version id when one exists.
    async fn store_blob(&self, blob: Bytes, key: &str) -> Result<Option<String>>;
}

#[async_trait]
impl BlobSink for S3Store {
    async fn store_blob(&self, blob: Bytes, key: &str) -> Result<Option<String>> {
        S3Store::store_blob(self, blob, key).await
    }
}
