//! Route modules for Strongbox Server

pub mod health;
pub mod upload;

use axum::{routing::get, Router};

use crate::state::AppState;

/// Build the application router
pub fn router(state: AppState) -> Router {
    let max_file_size = state.coordinator().max_file_size();

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/health", get(health::health_check))
        .nest("/api/v1/uploads", upload::router(max_file_size))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tokio::sync::Semaphore;
    use tower::ServiceExt;

    use crate::config::UploadConfig;
    use crate::db::memory::MemoryMetadataStore;
    use crate::db::MetadataStore;
    use crate::storage::memory::MemoryMultipartStore;
    use crate::storage::MultipartStore;
    use crate::upload::{ProgressRegistry, UploadCoordinator};

    const BOUNDARY: &str = "strongbox-test-boundary";

    struct TestApp {
        app: Router,
        store: Arc<MemoryMultipartStore>,
    }

    fn test_app(store: Option<MemoryMultipartStore>, upload: UploadConfig) -> TestApp {
        test_app_with_metadata(store, upload, MemoryMetadataStore::new())
    }

    fn test_app_with_metadata(
        store: Option<MemoryMultipartStore>,
        upload: UploadConfig,
        metadata: MemoryMetadataStore,
    ) -> TestApp {
        let configured = store.is_some();
        let store = Arc::new(store.unwrap_or_default());
        let metadata: Arc<dyn MetadataStore> = Arc::new(metadata);
        let coordinator = UploadCoordinator::new(
            configured.then(|| store.clone() as Arc<dyn MultipartStore>),
            metadata.clone(),
            ProgressRegistry::new(),
            &upload,
        );

        TestApp {
            app: router(AppState::new(coordinator, metadata)),
            store,
        }
    }

    fn small_chunks() -> UploadConfig {
        UploadConfig {
            chunk_size: 16,
            ..UploadConfig::default()
        }
    }

    fn multipart_body(field: &str, file_name: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(user: Option<&str>, body: Vec<u8>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/uploads")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(user) = user {
            builder = builder.header("X-User-Id", user);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn get_request(uri: &str, user: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(user) = user {
            builder = builder.header("X-User-Id", user);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn wait_until_finished(app: &Router, upload_id: &str) -> Value {
        let uri = format!("/api/v1/uploads/{upload_id}/progress");
        for _ in 0..200 {
            let (status, entry) = send(app, get_request(&uri, None)).await;
            assert_eq!(status, StatusCode::OK);
            if entry["status"] == "completed" || entry["status"] == "error" {
                return entry;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("upload {upload_id} did not finish");
    }

    #[tokio::test]
    async fn test_upload_poll_and_history() {
        let test = test_app(Some(MemoryMultipartStore::new()), small_chunks());
        let data = vec![42u8; 100];

        let (status, body) = send(
            &test.app,
            upload_request(Some("alice"), multipart_body("file", "notes.txt", &data)),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let upload_id = body["uploadId"].as_str().unwrap().to_string();
        assert_eq!(upload_id.len(), 32);

        let entry = wait_until_finished(&test.app, &upload_id).await;
        assert_eq!(entry["status"], "completed");
        assert_eq!(entry["progress"], 100);
        assert_eq!(entry["ownerId"], "alice");
        assert_eq!(entry["fileName"], "notes.txt");
        assert_eq!(entry["encryptionKey"].as_str().unwrap().len(), 64);

        let object_key = entry["objectKey"].as_str().unwrap();
        assert!(object_key.starts_with("uploads/notes-"));
        assert_eq!(test.store.object(object_key).unwrap().len(), 7);

        let (status, history) =
            send(&test.app, get_request("/api/v1/uploads/history", Some("alice"))).await;
        assert_eq!(status, StatusCode::OK);
        let uploads = history["uploads"].as_array().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0]["fileName"], "notes.txt");
        assert_eq!(uploads[0]["fileHash"], entry["fileHash"]);
        assert!(uploads[0].get("encryptionKey").is_none());

        let (_, other) = send(&test.app, get_request("/api/v1/uploads/history", Some("bob"))).await;
        assert!(other["uploads"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_requests() {
        let test = test_app(Some(MemoryMultipartStore::new()), small_chunks());

        let (status, body) = send(
            &test.app,
            upload_request(None, multipart_body("file", "a.txt", b"data")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");

        let (status, _) = send(
            &test.app,
            upload_request(Some("alice"), multipart_body("attachment", "a.txt", b"data")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &test.app,
            upload_request(Some("alice"), multipart_body("file", "", b"data")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &test.app,
            upload_request(Some("alice"), multipart_body("file", "empty.txt", b"")),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(test.store.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_upload_too_large() {
        let test = test_app(
            Some(MemoryMultipartStore::new()),
            UploadConfig {
                max_file_size: 64,
                ..small_chunks()
            },
        );

        let (status, body) = send(
            &test.app,
            upload_request(Some("alice"), multipart_body("file", "big.bin", &[1u8; 65])),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["code"], "FILE_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_upload_busy() {
        let gate = Arc::new(Semaphore::new(0));
        let test = test_app(
            Some(MemoryMultipartStore::new().with_create_gate(gate.clone())),
            UploadConfig {
                max_concurrent: 1,
                ..small_chunks()
            },
        );

        let (status, first) = send(
            &test.app,
            upload_request(Some("alice"), multipart_body("file", "a.txt", b"first")),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (status, body) = send(
            &test.app,
            upload_request(Some("alice"), multipart_body("file", "b.txt", b"second")),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "TOO_MANY_UPLOADS");

        gate.add_permits(1);
        let entry = wait_until_finished(&test.app, first["uploadId"].as_str().unwrap()).await;
        assert_eq!(entry["status"], "completed");
    }

    #[tokio::test]
    async fn test_unknown_upload_progress() {
        let test = test_app(Some(MemoryMultipartStore::new()), small_chunks());
        let (status, body) =
            send(&test.app, get_request("/api/v1/uploads/nope/progress", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "UPLOAD_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_history_requires_user() {
        let test = test_app(Some(MemoryMultipartStore::new()), small_chunks());
        let (status, _) = send(&test.app, get_request("/api/v1/uploads/history", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let test = test_app(Some(MemoryMultipartStore::new()), small_chunks());
        let (status, body) = send(&test.app, get_request("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["storageConfigured"], true);
        assert_eq!(body["database"], "ok");
    }

    #[tokio::test]
    async fn test_health_without_storage_is_still_up() {
        let test = test_app(None, small_chunks());
        let (status, body) = send(&test.app, get_request("/api/v1/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["storageConfigured"], false);
        assert_eq!(body["database"], "ok");
    }

    #[tokio::test]
    async fn test_health_degraded_when_database_down() {
        let test = test_app_with_metadata(
            Some(MemoryMultipartStore::new()),
            small_chunks(),
            MemoryMetadataStore::new().failing_on_ping(),
        );
        let (status, body) = send(&test.app, get_request("/health", None)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["storageConfigured"], true);
        assert_eq!(body["database"], "unreachable");
    }

    #[tokio::test]
    async fn test_upload_without_storage_reports_error() {
        let test = test_app(None, small_chunks());

        let (status, body) = send(
            &test.app,
            upload_request(Some("alice"), multipart_body("file", "a.txt", b"data")),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let entry = wait_until_finished(&test.app, body["uploadId"].as_str().unwrap()).await;
        assert_eq!(entry["status"], "error");
        assert_eq!(test.store.create_calls(), 0);
    }
}
