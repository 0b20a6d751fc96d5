//! Upload Routes
//!
//! Endpoints:
//! - POST /api/v1/uploads - Accept a file and start an encrypted upload
//! - GET /api/v1/uploads/:upload_id/progress - Poll an upload's progress
//! - GET /api/v1/uploads/history - The caller's most recent completed uploads

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

use crate::db::UploadHistoryItem;
use crate::error::AppError;
use crate::state::AppState;
use crate::upload::{ProgressEntry, UploadError, UploadRequest};

/// Header carrying the caller's opaque owner id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Number of entries returned by the history endpoint
pub const HISTORY_LIMIT: i64 = 10;

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

// ============================================================================
// Error Response
// ============================================================================

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: String,
}

impl IntoResponse for UploadError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Upload request failed");
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the upload router
pub fn router(max_file_size: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_file_size.saturating_add(MULTIPART_OVERHEAD))
        .unwrap_or(usize::MAX);

    Router::new()
        .route("/", post(start_upload))
        .route("/history", get(history))
        .route("/:upload_id/progress", get(progress))
        .layer(DefaultBodyLimit::max(body_limit))
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartUploadResponse {
    pub upload_id: String,
}

/// POST /api/v1/uploads
///
/// Reads the `file` field into memory, registers the upload and returns its
/// id right away. The encrypted transfer continues in the background.
async fn start_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<StartUploadResponse>), UploadError> {
    let owner_id = owner_id(&headers)
        .ok_or_else(|| UploadError::InvalidInput("missing X-User-Id header".into()))?;
    let max = state.coordinator().max_file_size();

    let mut file = None;
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let mut data = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(|e| multipart_error(e, max))? {
            data.extend_from_slice(&chunk);
            if data.len() as u64 > max {
                return Err(UploadError::FileTooLarge {
                    size: data.len() as u64,
                    max,
                });
            }
        }

        file = Some((file_name, data));
        break;
    }

    let (file_name, data) = file.ok_or_else(|| {
        UploadError::InvalidInput("no file provided, use field name 'file'".into())
    })?;
    if file_name.trim().is_empty() {
        return Err(UploadError::InvalidInput("no file selected".into()));
    }

    let upload_id = Uuid::new_v4().simple().to_string();
    state
        .coordinator()
        .submit(UploadRequest {
            upload_id: upload_id.clone(),
            owner_id,
            file_name,
            data,
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(StartUploadResponse { upload_id })))
}

/// GET /api/v1/uploads/:upload_id/progress
async fn progress(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> Result<Json<ProgressEntry>, UploadError> {
    let entry = state.registry().get(&upload_id).await?;
    Ok(Json(entry))
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub uploads: Vec<UploadHistoryItem>,
}

/// GET /api/v1/uploads/history
async fn history(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<HistoryResponse>, AppError> {
    let owner_id = owner_id(&headers)
        .ok_or_else(|| AppError::BadRequest("missing X-User-Id header".into()))?;

    let uploads = state
        .metadata()
        .recent_uploads(&owner_id, HISTORY_LIMIT)
        .await?;

    Ok(Json(HistoryResponse { uploads }))
}

// ============================================================================
// Helpers
// ============================================================================

fn owner_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn multipart_error(e: MultipartError, max: u64) -> UploadError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        // The body limit sits above `max`, so the file is at least that big
        UploadError::FileTooLarge {
            size: max.saturating_add(MULTIPART_OVERHEAD),
            max,
        }
    } else {
        UploadError::InvalidInput(format!("failed to read upload: {}", e.body_text()))
    }
}
