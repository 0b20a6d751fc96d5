//! Upload Coordinator
//!
//! Runs one upload session per background task:
//! hash → session key → open multipart → encrypt and upload each chunk in
//! order → finalize → completion record. Progress goes to the
//! [`ProgressRegistry`]; errors and panics stop at this boundary and are
//! only visible through the registry.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::UploadConfig;
use crate::db::MetadataStore;
use crate::storage::{CompletedPartInfo, MultipartHandle, MultipartStore};

use super::chunker::Chunker;
use super::cipher::{CipherMode, PartCipher, SessionKey};
use super::hash::compute_hash;
use super::naming;
use super::registry::ProgressRegistry;
use super::types::{
    progress_percent, CompletionRecord, ProgressUpdate, UploadError, UploadRequest, UploadStatus,
};

// ============================================================================
// Coordinator
// ============================================================================

/// Accepts uploads and drives them to completion in the background
#[derive(Clone)]
pub struct UploadCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    /// `None` when no bucket or credentials are configured
    store: Option<Arc<dyn MultipartStore>>,
    metadata: Arc<dyn MetadataStore>,
    registry: ProgressRegistry,
    chunk_size: usize,
    cipher_mode: CipherMode,
    max_file_size: u64,
    max_concurrent: usize,
    permits: Arc<Semaphore>,
}

impl UploadCoordinator {
    pub fn new(
        store: Option<Arc<dyn MultipartStore>>,
        metadata: Arc<dyn MetadataStore>,
        registry: ProgressRegistry,
        settings: &UploadConfig,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                store,
                metadata,
                registry,
                chunk_size: settings.chunk_size,
                cipher_mode: settings.cipher,
                max_file_size: settings.max_file_size,
                max_concurrent: settings.max_concurrent,
                permits: Arc::new(Semaphore::new(settings.max_concurrent)),
            }),
        }
    }

    /// Whether a remote store is available
    pub fn is_configured(&self) -> bool {
        self.inner.store.is_some()
    }

    pub fn registry(&self) -> &ProgressRegistry {
        &self.inner.registry
    }

    pub fn max_file_size(&self) -> u64 {
        self.inner.max_file_size
    }

    // ========================================================================
    // Admission
    // ========================================================================

    /// Validate and register an upload, then run it on its own task.
    ///
    /// Returns once the registry entry exists. The caller polls the registry
    /// for the outcome; the handle is only useful for tests and shutdown.
    pub async fn submit(&self, request: UploadRequest) -> Result<JoinHandle<()>, UploadError> {
        self.validate(&request)?;

        let permit = self
            .inner
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| UploadError::Busy(self.inner.max_concurrent))?;

        self.inner
            .registry
            .create(&request.upload_id, &request.owner_id, &request.file_name)
            .await?;

        tracing::info!(
            upload_id = %request.upload_id,
            file_name = %request.file_name,
            file_size = request.data.len(),
            "Accepted upload"
        );

        let coordinator = self.clone();
        Ok(tokio::spawn(async move {
            let _permit = permit;
            coordinator.execute(request).await;
        }))
    }

    fn validate(&self, request: &UploadRequest) -> Result<(), UploadError> {
        if request.upload_id.is_empty() {
            return Err(UploadError::InvalidInput("upload id is empty".into()));
        }
        if request.file_name.trim().is_empty() {
            return Err(UploadError::InvalidInput("file name is empty".into()));
        }

        let size = request.data.len() as u64;
        if size > self.inner.max_file_size {
            return Err(UploadError::FileTooLarge {
                size,
                max: self.inner.max_file_size,
            });
        }

        Chunker::new(&request.data, self.inner.chunk_size).map(|_| ())
    }

    // ========================================================================
    // Session Execution
    // ========================================================================

    /// Run a session and route every outcome, panics included, to the registry
    async fn execute(self, request: UploadRequest) {
        let upload_id = request.upload_id.clone();

        match AssertUnwindSafe(self.run(&request)).catch_unwind().await {
            Ok(Ok(record)) => {
                tracing::info!(
                    upload_id = %upload_id,
                    object_key = %record.object_key,
                    parts = record.part_count,
                    "Upload completed"
                );
            }
            Ok(Err(e)) => {
                tracing::error!(upload_id = %upload_id, error = %e, "Upload failed");
                self.inner.registry.fail(&upload_id, e.to_string()).await;
            }
            Err(panic) => {
                let error = UploadError::Internal(panic_message(panic.as_ref()));
                tracing::error!(upload_id = %upload_id, error = %error, "Upload task panicked");
                self.inner.registry.fail(&upload_id, error.to_string()).await;
            }
        }
    }

    async fn run(&self, request: &UploadRequest) -> Result<CompletionRecord, UploadError> {
        let store = self.inner.store.clone().ok_or_else(|| {
            UploadError::Configuration("S3 bucket and credentials are not set".into())
        })?;
        let upload_id = request.upload_id.as_str();
        let created_at = self.inner.registry.get(upload_id).await?.created_at;

        let chunker = Chunker::new(&request.data, self.inner.chunk_size)?;
        let file_hash = compute_hash(&request.data);
        let session_key = SessionKey::generate();
        let cipher = PartCipher::new(session_key.clone(), self.inner.cipher_mode);
        let object_key = naming::object_key(&request.file_name);

        let handle = store.create_multipart(&object_key, &request.file_name).await?;
        tracing::debug!(
            upload_id = %upload_id,
            object_key = %object_key,
            parts = chunker.count(),
            cipher = %cipher.mode(),
            "Opened multipart upload"
        );

        let guard = AbortGuard::arm(store.clone(), handle.clone(), upload_id);
        match self
            .transfer(store.as_ref(), &handle, &chunker, &cipher, upload_id)
            .await
        {
            Ok(()) => guard.disarm(),
            Err(e) => {
                guard.abort().await;
                return Err(e);
            }
        }

        let record = CompletionRecord {
            upload_id: upload_id.to_string(),
            owner_id: request.owner_id.clone(),
            file_name: request.file_name.clone(),
            file_hash: file_hash.clone(),
            status: UploadStatus::Completed,
            object_key: object_key.clone(),
            encryption_key: session_key.clone(),
            cipher: cipher.mode(),
            part_count: chunker.count(),
            file_size: request.data.len() as u64,
            created_at,
            completed_at: Utc::now(),
        };

        self.inner
            .metadata
            .insert_completed(&record)
            .await
            .map_err(|e| UploadError::Metadata(e.to_string()))?;

        self.inner
            .registry
            .update(
                upload_id,
                ProgressUpdate::completed(object_key, file_hash, session_key),
            )
            .await?;

        Ok(record)
    }

    /// Upload every part in order and finalize the remote object
    async fn transfer(
        &self,
        store: &dyn MultipartStore,
        handle: &MultipartHandle,
        chunker: &Chunker<'_>,
        cipher: &PartCipher,
        upload_id: &str,
    ) -> Result<(), UploadError> {
        let registry = &self.inner.registry;
        registry
            .update(upload_id, ProgressUpdate::status(UploadStatus::InProgress))
            .await?;

        let total = chunker.count();
        let mut parts = Vec::with_capacity(total);

        for chunk in chunker {
            let part_number = i32::try_from(chunk.number)
                .map_err(|_| UploadError::Internal(format!("part {} out of range", chunk.number)))?;
            let body = cipher.encrypt_part(chunk.number, chunk.data)?;
            let etag = store.upload_part(handle, part_number, body).await?;

            tracing::debug!(
                upload_id = %upload_id,
                part = part_number,
                total_parts = total,
                "Uploaded part"
            );
            parts.push(CompletedPartInfo { part_number, etag });

            // 100 is published together with the completed status
            if chunk.number < total {
                registry
                    .update(upload_id, ProgressUpdate::progress(progress_percent(chunk.number, total)))
                    .await?;
            }
        }

        store.complete_multipart(handle, &parts).await?;
        Ok(())
    }
}

// ============================================================================
// Abort Guard
// ============================================================================

/// Aborts an open multipart upload unless disarmed.
///
/// Error paths call [`AbortGuard::abort`]; a guard dropped while still armed
/// (panic, cancelled task) spawns the abort instead.
struct AbortGuard {
    store: Arc<dyn MultipartStore>,
    handle: Option<MultipartHandle>,
    upload_id: String,
}

impl AbortGuard {
    fn arm(store: Arc<dyn MultipartStore>, handle: MultipartHandle, upload_id: &str) -> Self {
        Self {
            store,
            handle: Some(handle),
            upload_id: upload_id.to_string(),
        }
    }

    fn disarm(mut self) {
        self.handle = None;
    }

    async fn abort(mut self) {
        if let Some(handle) = self.handle.take() {
            abort_upload(self.store.as_ref(), &handle, &self.upload_id).await;
        }
    }
}

impl Drop for AbortGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                upload_id = %self.upload_id,
                multipart_id = %handle.upload_id,
                "No runtime to abort multipart upload; left for reconciliation"
            );
            return;
        };

        let store = self.store.clone();
        let upload_id = std::mem::take(&mut self.upload_id);
        runtime.spawn(async move {
            abort_upload(store.as_ref(), &handle, &upload_id).await;
        });
    }
}

async fn abort_upload(store: &dyn MultipartStore, handle: &MultipartHandle, upload_id: &str) {
    match store.abort_multipart(handle).await {
        Ok(()) => tracing::info!(
            upload_id = %upload_id,
            object_key = %handle.key,
            "Aborted multipart upload"
        ),
        Err(e) => tracing::warn!(
            upload_id = %upload_id,
            object_key = %handle.key,
            error = %e,
            "Failed to abort multipart upload"
        ),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("upload task panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("upload task panicked: {}", message)
    } else {
        "upload task panicked".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================
