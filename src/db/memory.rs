//! In-memory metadata store, for tests

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{AppError, Result};
use crate::upload::CompletionRecord;

use super::uploads::{MetadataStore, StoredUpload, UploadHistoryItem};

#[derive(Default)]
pub struct MemoryMetadataStore {
    records: Mutex<Vec<CompletionRecord>>,
    fail_inserts: bool,
    fail_pings: bool,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on_insert(mut self) -> Self {
        self.fail_inserts = true;
        self
    }

    pub fn failing_on_ping(mut self) -> Self {
        self.fail_pings = true;
        self
    }

    pub fn records(&self) -> Vec<CompletionRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn insert_completed(&self, record: &CompletionRecord) -> Result<()> {
        if self.fail_inserts {
            return Err(AppError::Internal("injected insert failure".into()));
        }
        let mut records = self.records.lock();
        if records.iter().any(|r| r.upload_id == record.upload_id) {
            return Err(AppError::BadRequest(format!(
                "duplicate upload id {}",
                record.upload_id
            )));
        }
        records.push(record.clone());
        Ok(())
    }

    async fn find(&self, upload_id: &str) -> Result<Option<StoredUpload>> {
        Ok(self
            .records
            .lock()
            .iter()
            .find(|r| r.upload_id == upload_id)
            .map(|r| StoredUpload {
                id: r.upload_id.clone(),
                user_id: r.owner_id.clone(),
                file_name: r.file_name.clone(),
                file_hash: r.file_hash.clone(),
                file_size: r.file_size as i64,
                status: r.status.as_str().to_string(),
                object_key: r.object_key.clone(),
                encryption_key: r.encryption_key.as_bytes().to_vec(),
                cipher: r.cipher.as_str().to_string(),
                part_count: r.part_count as i64,
                created_at: r.created_at.to_rfc3339(),
                completed_at: r.completed_at.to_rfc3339(),
            }))
    }

    async fn recent_uploads(&self, owner_id: &str, limit: i64) -> Result<Vec<UploadHistoryItem>> {
        let mut owned: Vec<CompletionRecord> = self
            .records
            .lock()
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(owned
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|r| UploadHistoryItem {
                file_name: r.file_name,
                status: r.status.as_str().to_string(),
                created_at: r.created_at.to_rfc3339(),
                file_hash: r.file_hash,
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        if self.fail_pings {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}
