use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use pos_audio_pipeline::config::IngestConfig;
use pos_audio_pipeline::ingest::handlers::{
    create_device, get_internal_chunk_file, health, list_devices, patch_device, post_chunk, AppState,
};
use pos_audio_pipeline::{db, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = IngestConfig::load()?;
    telemetry::init(&config.shared.log_level)?;

    let pool = db::connect_with_retry(&config.shared.database_url).await?;
    db::run_migrations(&pool).await?;

    let storage_root = std::path::PathBuf::from(&config.shared.audio_storage_dir);
    tokio::fs::create_dir_all(&storage_root).await?;

    let host = config.host.clone();
    let port = config.port;
    let cors_enabled = config.cors_enabled;

    let state = Arc::new(AppState { pool, config, storage_root });
    let request_id_header = axum::http::HeaderName::from_static("x-request-id");

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/api/v1/chunks", post(post_chunk))
        .route("/api/v1/internal/chunks/:chunk_id/file", get(get_internal_chunk_file))
        .route("/api/v1/admin/devices", post(create_device).get(list_devices))
        .route("/api/v1/admin/devices/:device_id", patch(patch_device))
        .layer(SetRequestIdLayer::new(request_id_header.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(request_id_header))
        .with_state(state);

    if cors_enabled {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{host}:{port}");
    info!(%addr, "ingest acceptor listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
