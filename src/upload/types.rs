//! Upload types for the encrypted multipart pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

use super::cipher::{CipherMode, SessionKey};

// ============================================================================
// Constants
// ============================================================================

/// Default chunk size: 5MB (the S3 minimum for non-final parts)
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Maximum file size: 500MB
pub const MAX_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Maximum concurrent background uploads
pub const MAX_CONCURRENT_UPLOADS: usize = 5;

/// S3 refuses part numbers above this
pub const MAX_PARTS: usize = 10_000;

/// Prefix every uploaded object key lives under
pub const OBJECT_KEY_PREFIX: &str = "uploads/";

/// How long finished registry entries stay pollable
pub const DEFAULT_REGISTRY_TTL_SECS: u64 = 60 * 60;

/// Open multipart uploads older than this are considered abandoned
pub const DEFAULT_STALE_MULTIPART_SECS: u64 = 24 * 60 * 60;

// ============================================================================
// Requests
// ============================================================================

/// Everything the pipeline needs to run one upload
#[derive(Clone)]
pub struct UploadRequest {
    /// Caller-generated opaque id, used as the registry key
    pub upload_id: String,

    /// Opaque id of the uploading user
    pub owner_id: String,

    /// Original file name as sent by the client
    pub file_name: String,

    /// Full plaintext
    pub data: Vec<u8>,
}

impl std::fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRequest")
            .field("upload_id", &self.upload_id)
            .field("owner_id", &self.owner_id)
            .field("file_name", &self.file_name)
            .field("size", &self.data.len())
            .finish()
    }
}

// ============================================================================
// Progress Types
// ============================================================================

/// Upload lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UploadStatus {
    /// Accepted, nothing sent to the remote store yet
    Starting,
    /// Multipart session open, parts being uploaded
    InProgress,
    /// Object assembled and record written
    Completed,
    /// Failed; see the entry's message
    Error,
}

impl UploadStatus {
    /// Completed and errored uploads never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

/// Status of one upload as seen by pollers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub upload_id: String,
    pub owner_id: String,
    pub file_name: String,
    pub status: UploadStatus,

    /// 0..=100, reaches 100 only together with `Completed`
    pub progress: u8,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<SessionKey>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProgressEntry {
    pub fn new(upload_id: &str, owner_id: &str, file_name: &str) -> Self {
        let now = Utc::now();
        Self {
            upload_id: upload_id.to_string(),
            owner_id: owner_id.to_string(),
            file_name: file_name.to_string(),
            status: UploadStatus::Starting,
            progress: 0,
            message: None,
            object_key: None,
            file_hash: None,
            encryption_key: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update applied to a [`ProgressEntry`]
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub status: Option<UploadStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub object_key: Option<String>,
    pub file_hash: Option<String>,
    pub encryption_key: Option<SessionKey>,
}

impl ProgressUpdate {
    pub fn status(status: UploadStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn progress(percent: u8) -> Self {
        Self {
            progress: Some(percent),
            ..Default::default()
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(UploadStatus::Error),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn completed(object_key: String, file_hash: String, encryption_key: SessionKey) -> Self {
        Self {
            status: Some(UploadStatus::Completed),
            progress: Some(100),
            object_key: Some(object_key),
            file_hash: Some(file_hash),
            encryption_key: Some(encryption_key),
            ..Default::default()
        }
    }
}

/// Percentage of parts done, rounded up: 1 of 3 is 34, 2 of 3 is 67
pub fn progress_percent(parts_done: usize, total_parts: usize) -> u8 {
    if total_parts == 0 {
        return 0;
    }
    let done = parts_done.min(total_parts);
    ((done * 100 + total_parts - 1) / total_parts) as u8
}

// ============================================================================
// Completion Record
// ============================================================================

/// Durable record of a successful upload
#[derive(Debug, Clone)]
pub struct CompletionRecord {
    pub upload_id: String,
    pub owner_id: String,
    pub file_name: String,
    pub file_hash: String,
    pub status: UploadStatus,
    pub object_key: String,
    pub encryption_key: SessionKey,
    pub cipher: CipherMode,
    pub part_count: usize,
    pub file_size: u64,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

// ============================================================================
// Error Types
// ============================================================================

/// Upload error types
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Storage not configured: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("File too large: {size} bytes (max: {max})")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Remote store error: {0}")]
    RemoteStore(#[from] StorageError),

    #[error("Encryption error: {0}")]
    Cipher(String),

    #[error("Metadata store error: {0}")]
    Metadata(String),

    #[error("Upload not found: {0}")]
    NotFound(String),

    #[error("Upload already exists: {0}")]
    AlreadyExists(String),

    #[error("Upload already finished: {0}")]
    Terminal(String),

    #[error("Too many concurrent uploads (max: {0})")]
    Busy(usize),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UploadError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RemoteStore(_) => StatusCode::BAD_GATEWAY,
            Self::Cipher(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Metadata(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::Terminal(_) => StatusCode::CONFLICT,
            Self::Busy(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "STORAGE_NOT_CONFIGURED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Self::RemoteStore(_) => "REMOTE_STORE_ERROR",
            Self::Cipher(_) => "ENCRYPTION_ERROR",
            Self::Metadata(_) => "METADATA_ERROR",
            Self::NotFound(_) => "UPLOAD_NOT_FOUND",
            Self::AlreadyExists(_) => "UPLOAD_EXISTS",
            Self::Terminal(_) => "UPLOAD_FINISHED",
            Self::Busy(_) => "TOO_MANY_UPLOADS",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
