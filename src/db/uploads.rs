//! Upload record database operations

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::error::Result;
use crate::upload::CompletionRecord;

/// Entry of a user's upload history
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UploadHistoryItem {
    pub file_name: String,
    pub status: String,
    pub created_at: String,
    pub file_hash: String,
}

/// Stored completion record
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredUpload {
    pub id: String,
    pub user_id: String,
    pub file_name: String,
    pub file_hash: String,
    pub file_size: i64,
    pub status: String,
    pub object_key: String,
    pub encryption_key: Vec<u8>,
    pub cipher: String,
    pub part_count: i64,
    pub created_at: String,
    pub completed_at: String,
}

/// Where completion records of finished uploads go
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Persist the record of a successful upload
    async fn insert_completed(&self, record: &CompletionRecord) -> Result<()>;

    /// Look up the record written for an upload id
    async fn find(&self, upload_id: &str) -> Result<Option<StoredUpload>>;

    /// Most recent uploads of a user, newest first
    async fn recent_uploads(&self, owner_id: &str, limit: i64) -> Result<Vec<UploadHistoryItem>>;

    /// Check that the store is reachable
    async fn ping(&self) -> Result<()>;
}

/// SQLite-backed upload records
#[derive(Clone)]
pub struct UploadRepository {
    pool: SqlitePool,
}

impl UploadRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataStore for UploadRepository {
    async fn insert_completed(&self, record: &CompletionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO uploads (id, user_id, file_name, file_hash, file_size, status,
                                 object_key, encryption_key, cipher, part_count,
                                 created_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.upload_id)
        .bind(&record.owner_id)
        .bind(&record.file_name)
        .bind(&record.file_hash)
        .bind(record.file_size as i64)
        .bind(record.status.as_str())
        .bind(&record.object_key)
        .bind(record.encryption_key.as_bytes().as_slice())
        .bind(record.cipher.as_str())
        .bind(record.part_count as i64)
        .bind(record.created_at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .bind(record.completed_at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, upload_id: &str) -> Result<Option<StoredUpload>> {
        let upload = sqlx::query_as::<_, StoredUpload>(
            r#"
            SELECT id, user_id, file_name, file_hash, file_size, status, object_key,
                   encryption_key, cipher, part_count, created_at, completed_at
            FROM uploads
            WHERE id = ?
            "#,
        )
        .bind(upload_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(upload)
    }

    async fn recent_uploads(&self, owner_id: &str, limit: i64) -> Result<Vec<UploadHistoryItem>> {
        let uploads = sqlx::query_as::<_, UploadHistoryItem>(
            r#"
            SELECT file_name, status, created_at, file_hash
            FROM uploads
            WHERE user_id = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(uploads)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
