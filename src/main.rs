//! Strongbox Server
//!
//! Accepts file uploads over HTTP, encrypts them chunk by chunk and stores
//! them in S3-compatible storage as multipart uploads.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use strongbox_server::config::Config;
use strongbox_server::db::{self, MetadataStore, UploadRepository};
use strongbox_server::routes;
use strongbox_server::state::AppState;
use strongbox_server::storage::{MultipartStore, S3Client};
use strongbox_server::upload::{start_reconcile_task, ProgressRegistry, UploadCoordinator};

/// How often finished registry entries are swept
const REGISTRY_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// How often stale multipart uploads are reconciled
const RECONCILE_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "strongbox_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Strongbox Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        chunk_size = config.upload.chunk_size,
        cipher = %config.upload.cipher,
        max_concurrent = config.upload.max_concurrent,
        "Upload settings"
    );

    // Initialize S3 client
    let store: Option<Arc<dyn MultipartStore>> = match &config.storage {
        Some(storage) => {
            tracing::info!(
                endpoint = storage.endpoint.as_deref().unwrap_or("aws"),
                bucket = %storage.bucket,
                "Connecting to object storage"
            );
            let client = S3Client::new(storage)
                .await
                .context("Failed to initialize S3 client")?;
            Some(Arc::new(client) as Arc<dyn MultipartStore>)
        }
        None => {
            tracing::warn!("S3 storage is not configured; uploads will fail until S3_BUCKET, S3_ACCESS_KEY and S3_SECRET_KEY are set");
            None
        }
    };

    // Initialize database
    let db_pool = db::create_pool(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    tracing::info!("Database initialized at {}", config.database.url);
    let metadata: Arc<dyn MetadataStore> = Arc::new(UploadRepository::new(db_pool));

    // Background maintenance
    let registry = ProgressRegistry::new();
    registry.clone().start_cleanup_task(
        Duration::from_secs(config.upload.registry_ttl_secs),
        REGISTRY_SWEEP_INTERVAL,
    );
    if let Some(store) = &store {
        start_reconcile_task(
            store.clone(),
            Duration::from_secs(config.upload.stale_multipart_secs),
            RECONCILE_INTERVAL,
        );
    }

    // Create application state
    let coordinator = UploadCoordinator::new(store, metadata.clone(), registry, &config.upload);
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;
    let app_state = AppState::new(coordinator, metadata);

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = routes::router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server with graceful shutdown
    tracing::info!("Strongbox Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
