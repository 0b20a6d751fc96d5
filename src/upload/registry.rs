//! Upload Progress Registry
//!
//! In-memory status of every upload, written by the background pipeline and
//! read by pollers. A single `RwLock` guards the map. Entries enforce:
//! - progress never goes down
//! - progress is 100 exactly when the upload completed
//! - completed and errored entries never change again

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;

use super::types::{ProgressEntry, ProgressUpdate, UploadError, UploadStatus};

// ============================================================================
// Progress Registry
// ============================================================================

/// Shared map of upload id to progress
#[derive(Clone, Default)]
pub struct ProgressRegistry {
    inner: Arc<RwLock<HashMap<String, ProgressEntry>>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Entry Lifecycle
    // ========================================================================

    /// Register a new upload in the `starting` state
    pub async fn create(
        &self,
        upload_id: &str,
        owner_id: &str,
        file_name: &str,
    ) -> Result<ProgressEntry, UploadError> {
        let mut entries = self.inner.write().await;
        if entries.contains_key(upload_id) {
            return Err(UploadError::AlreadyExists(upload_id.to_string()));
        }

        let entry = ProgressEntry::new(upload_id, owner_id, file_name);
        entries.insert(upload_id.to_string(), entry.clone());

        tracing::debug!(upload_id = %upload_id, file_name = %file_name, "Registered upload");
        Ok(entry)
    }

    /// Get an entry by upload id
    pub async fn get(&self, upload_id: &str) -> Result<ProgressEntry, UploadError> {
        let entries = self.inner.read().await;
        entries
            .get(upload_id)
            .cloned()
            .ok_or_else(|| UploadError::NotFound(upload_id.to_string()))
    }

    /// Apply a partial update and return the resulting entry
    pub async fn update(
        &self,
        upload_id: &str,
        update: ProgressUpdate,
    ) -> Result<ProgressEntry, UploadError> {
        let mut entries = self.inner.write().await;
        let entry = entries
            .get_mut(upload_id)
            .ok_or_else(|| UploadError::NotFound(upload_id.to_string()))?;

        if entry.status.is_terminal() {
            return Err(UploadError::Terminal(upload_id.to_string()));
        }

        if let Some(status) = update.status {
            // Status only moves forward
            entry.status = entry.status.max(status);
        }

        let requested = update.progress.unwrap_or(entry.progress);
        entry.progress = match entry.status {
            UploadStatus::Completed => 100,
            _ => entry.progress.max(requested).min(99),
        };

        if let Some(message) = update.message {
            entry.message = Some(message);
        }
        if let Some(object_key) = update.object_key {
            entry.object_key = Some(object_key);
        }
        if let Some(file_hash) = update.file_hash {
            entry.file_hash = Some(file_hash);
        }
        if let Some(key) = update.encryption_key {
            entry.encryption_key = Some(key);
        }
        entry.updated_at = Utc::now();

        Ok(entry.clone())
    }

    /// Mark an upload as failed. Entries that already finished are left alone.
    pub async fn fail(&self, upload_id: &str, message: impl Into<String>) {
        let message = message.into();
        match self.update(upload_id, ProgressUpdate::failed(message.clone())).await {
            Ok(_) => {}
            Err(UploadError::Terminal(_)) => {
                tracing::warn!(
                    upload_id = %upload_id,
                    error = %message,
                    "Ignoring failure for upload that already finished"
                );
            }
            Err(e) => {
                tracing::warn!(upload_id = %upload_id, error = %e, "Could not record upload failure");
            }
        }
    }

    // ========================================================================
    // Query Methods
    // ========================================================================

    /// Get entry count
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Get active (non-terminal) entry count
    pub async fn active_count(&self) -> usize {
        let entries = self.inner.read().await;
        entries.values().filter(|e| !e.status.is_terminal()).count()
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Drop finished entries that have not changed for `ttl`.
    ///
    /// Returns the number of entries removed
    pub async fn evict_finished_older_than(&self, ttl: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
        else {
            return 0;
        };

        let mut entries = self.inner.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !(entry.status.is_terminal() && entry.updated_at <= cutoff));
        let count = before - entries.len();

        if count > 0 {
            tracing::info!(count = count, "Evicted finished upload entries");
        }

        count
    }

    /// Start background eviction task
    pub fn start_cleanup_task(self, ttl: Duration, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);

            loop {
                interval.tick().await;
                self.evict_finished_older_than(ttl).await;
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
