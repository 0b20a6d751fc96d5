//! Storage types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// An open multipart upload on the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartHandle {
    /// Object key the parts will be assembled into
    pub key: String,
    /// Remote-assigned multipart upload id
    pub upload_id: String,
}

/// A part accepted by the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPartInfo {
    /// 1-based part number
    pub part_number: i32,
    /// Integrity tag returned by the store for this part
    pub etag: String,
}

/// A multipart upload that was started but never completed or aborted
#[derive(Debug, Clone, Serialize)]
pub struct PendingMultipart {
    pub handle: MultipartHandle,
    pub initiated: Option<DateTime<Utc>>,
}

/// Remote object store that accepts multipart uploads.
///
/// Implemented by [`super::S3Client`]; tests use an in-memory store.
#[async_trait]
pub trait MultipartStore: Send + Sync {
    /// Open a multipart upload for `key`, tagging the object with the
    /// caller's original filename.
    async fn create_multipart(
        &self,
        key: &str,
        original_filename: &str,
    ) -> Result<MultipartHandle, StorageError>;

    /// Upload one part and return its ETag
    async fn upload_part(
        &self,
        handle: &MultipartHandle,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<String, StorageError>;

    /// Assemble the parts, in the given order, into the final object
    async fn complete_multipart(
        &self,
        handle: &MultipartHandle,
        parts: &[CompletedPartInfo],
    ) -> Result<(), StorageError>;

    /// Discard the upload and every part stored for it
    async fn abort_multipart(&self, handle: &MultipartHandle) -> Result<(), StorageError>;

    /// List uploads under `prefix` that are still open (handles pagination)
    async fn list_pending_multiparts(
        &self,
        prefix: &str,
    ) -> Result<Vec<PendingMultipart>, StorageError>;
}
