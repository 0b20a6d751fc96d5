//! In-memory multipart store with failure injection, for tests

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::error::StorageError;

use super::types::{CompletedPartInfo, MultipartHandle, MultipartStore, PendingMultipart};

type PartHook = Arc<dyn Fn(i32) -> BoxFuture<'static, ()> + Send + Sync>;

struct PendingState {
    key: String,
    initiated: DateTime<Utc>,
    parts: BTreeMap<i32, Vec<u8>>,
}

#[derive(Default)]
struct MemoryState {
    next_id: u64,
    pending: HashMap<String, PendingState>,
    objects: HashMap<String, Vec<Vec<u8>>>,
    aborted: Vec<MultipartHandle>,
    created: usize,
}

#[derive(Default)]
pub struct MemoryMultipartStore {
    state: Mutex<MemoryState>,
    fail_create: bool,
    fail_on_part: Option<i32>,
    fail_complete: bool,
    create_gate: Option<Arc<Semaphore>>,
    before_part: Option<PartHook>,
}

impl MemoryMultipartStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_on_part(mut self, part_number: i32) -> Self {
        self.fail_on_part = Some(part_number);
        self
    }

    pub fn failing_on_complete(mut self) -> Self {
        self.fail_complete = true;
        self
    }

    /// Block `create_multipart` until the semaphore hands out a permit
    pub fn with_create_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.create_gate = Some(gate);
        self
    }

    /// Run `hook` before every part upload is accepted
    pub fn with_before_part<F>(mut self, hook: F) -> Self
    where
        F: Fn(i32) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        self.before_part = Some(Arc::new(hook));
        self
    }

    /// Seed an open upload, as if a previous process had crashed mid-way
    pub fn insert_pending(&self, key: &str, initiated: DateTime<Utc>) -> MultipartHandle {
        let mut state = self.state.lock();
        state.next_id += 1;
        let upload_id = format!("mem-upload-{}", state.next_id);
        state.pending.insert(
            upload_id.clone(),
            PendingState {
                key: key.to_string(),
                initiated,
                parts: BTreeMap::new(),
            },
        );
        MultipartHandle {
            key: key.to_string(),
            upload_id,
        }
    }

    /// Parts of a completed object, in part order
    pub fn object(&self, key: &str) -> Option<Vec<Vec<u8>>> {
        self.state.lock().objects.get(key).cloned()
    }

    pub fn object_keys(&self) -> Vec<String> {
        self.state.lock().objects.keys().cloned().collect()
    }

    pub fn aborted(&self) -> Vec<MultipartHandle> {
        self.state.lock().aborted.clone()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().created
    }
}

#[async_trait]
impl MultipartStore for MemoryMultipartStore {
    async fn create_multipart(
        &self,
        key: &str,
        _original_filename: &str,
    ) -> Result<MultipartHandle, StorageError> {
        if let Some(gate) = &self.create_gate {
            let _permit = gate
                .acquire()
                .await
                .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        }
        if self.fail_create {
            return Err(StorageError::ConnectionFailed("injected create failure".into()));
        }
        let handle = self.insert_pending(key, Utc::now());
        self.state.lock().created += 1;
        Ok(handle)
    }

    async fn upload_part(
        &self,
        handle: &MultipartHandle,
        part_number: i32,
        body: Vec<u8>,
    ) -> Result<String, StorageError> {
        if let Some(hook) = &self.before_part {
            hook(part_number).await;
        }
        if self.fail_on_part == Some(part_number) {
            return Err(StorageError::SdkError(format!(
                "injected failure on part {}",
                part_number
            )));
        }

        let mut state = self.state.lock();
        let pending = state
            .pending
            .get_mut(&handle.upload_id)
            .ok_or_else(|| StorageError::UploadNotFound(handle.upload_id.clone()))?;
        let etag = format!("\"{}-{}\"", handle.upload_id, part_number);
        pending.parts.insert(part_number, body);
        Ok(etag)
    }

    async fn complete_multipart(
        &self,
        handle: &MultipartHandle,
        parts: &[CompletedPartInfo],
    ) -> Result<(), StorageError> {
        if self.fail_complete {
            return Err(StorageError::SdkError("injected complete failure".into()));
        }

        let mut state = self.state.lock();
        let mut pending = state
            .pending
            .remove(&handle.upload_id)
            .ok_or_else(|| StorageError::UploadNotFound(handle.upload_id.clone()))?;

        let mut assembled = Vec::with_capacity(parts.len());
        for part in parts {
            let expected = format!("\"{}-{}\"", handle.upload_id, part.part_number);
            if part.etag != expected {
                return Err(StorageError::InvalidResponse(format!(
                    "ETag mismatch for part {}",
                    part.part_number
                )));
            }
            let body = pending.parts.remove(&part.part_number).ok_or_else(|| {
                StorageError::InvalidResponse(format!("missing part {}", part.part_number))
            })?;
            assembled.push(body);
        }

        state.objects.insert(pending.key.clone(), assembled);
        Ok(())
    }

    async fn abort_multipart(&self, handle: &MultipartHandle) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        state
            .pending
            .remove(&handle.upload_id)
            .ok_or_else(|| StorageError::UploadNotFound(handle.upload_id.clone()))?;
        state.aborted.push(handle.clone());
        Ok(())
    }

    async fn list_pending_multiparts(
        &self,
        prefix: &str,
    ) -> Result<Vec<PendingMultipart>, StorageError> {
        let state = self.state.lock();
        Ok(state
            .pending
            .iter()
            .filter(|(_, pending)| pending.key.starts_with(prefix))
            .map(|(upload_id, pending)| PendingMultipart {
                handle: MultipartHandle {
                    key: pending.key.clone(),
                    upload_id: upload_id.clone(),
                },
                initiated: Some(pending.initiated),
            })
            .collect())
    }
}
