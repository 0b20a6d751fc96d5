//! Health check endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
    pub storage_configured: bool,
    pub database: &'static str,
    pub active_uploads: usize,
}

/// Reports `degraded` with 503 when the database is down. Missing storage
/// only shows up as `storageConfigured: false`.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let storage_configured = state.coordinator().is_configured();
    let database_ok = match state.metadata().ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            false
        }
    };

    let status = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: if database_ok { "healthy" } else { "degraded" },
            version: env!("CARGO_PKG_VERSION"),
            service: "strongbox-server",
            storage_configured,
            database: if database_ok { "ok" } else { "unreachable" },
            active_uploads: state.registry().active_count().await,
        }),
    )
}
