use std::path::PathBuf;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pos_audio_pipeline::config::VadWorkerConfig;
use pos_audio_pipeline::vad::detect::WebRtcVad;
use pos_audio_pipeline::vad::{process, repository};
use pos_audio_pipeline::{db, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = VadWorkerConfig::load()?;
    telemetry::init(&config.shared.log_level)?;

    let pool = db::connect_with_retry(&config.shared.database_url).await?;
    db::run_migrations(&pool).await?;

    let storage_root = PathBuf::from(&config.shared.audio_storage_dir);
    let shutdown = CancellationToken::new();

    let main_loop = tokio::spawn(run_main_loop(pool.clone(), storage_root, config.clone(), shutdown.clone()));
    let sweeper = tokio::spawn(run_recovery_sweeper(pool.clone(), config.clone(), shutdown.clone()));
    let metrics = tokio::spawn(run_metrics_emitter(pool.clone(), shutdown.clone()));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining vad worker");
    shutdown.cancel();

    let _ = tokio::join!(main_loop, sweeper, metrics);
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut sig = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        sig.recv().await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn run_main_loop(
    pool: sqlx::PgPool,
    storage_root: PathBuf,
    config: VadWorkerConfig,
    shutdown: CancellationToken,
) {
    let mut vad = WebRtcVad::new(config.vad_aggressiveness);

    loop {
        if shutdown.is_cancelled() {
            return;
        }

        let chunks = match repository::claim_queued_chunks(&pool, config.batch_size).await {
            Ok(chunks) => chunks,
            Err(err) => {
                error!(error = %err, "failed to claim queued chunks");
                sleep_or_cancel(Duration::from_secs_f64(config.poll_interval_sec), &shutdown).await;
                continue;
            }
        };

        if chunks.is_empty() {
            sleep_or_cancel(Duration::from_secs_f64(config.poll_interval_sec), &shutdown).await;
            continue;
        }

        for chunk in &chunks {
            if shutdown.is_cancelled() {
                return;
            }
            match process::process_chunk(&pool, &storage_root, &mut vad, &config, chunk).await {
                Ok(()) => info!(chunk_id = %chunk.chunk_id, "chunk processed"),
                Err(err) => {
                    let message = pos_audio_pipeline::error::truncate_error(&err, 1000);
                    warn!(chunk_id = %chunk.chunk_id, error = %err, "chunk processing failed");
                    if let Err(db_err) = repository::finish_chunk_error(&pool, chunk.chunk_id, &message).await {
                        error!(chunk_id = %chunk.chunk_id, error = %db_err, "failed to record chunk error");
                    }
                }
            }
        }
    }
}

async fn run_recovery_sweeper(pool: sqlx::PgPool, config: VadWorkerConfig, shutdown: CancellationToken) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }
        match repository::requeue_stuck_chunks(&pool, config.stuck_timeout_sec).await {
            Ok(0) => {}
            Ok(n) => info!(requeued = n, "recovered stuck chunks"),
            Err(err) => error!(error = %err, "stuck-chunk recovery sweep failed"),
        }
        sleep_or_cancel(Duration::from_secs_f64(config.recovery_interval_sec), &shutdown).await;
    }
}

async fn run_metrics_emitter(pool: sqlx::PgPool, shutdown: CancellationToken) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }
        match repository::count_queued_chunks(&pool).await {
            Ok(depth) => info!(queued_chunks = depth, "vad queue depth"),
            Err(err) => warn!(error = %err, "failed to read vad queue depth"),
        }
        sleep_or_cancel(Duration::from_secs(30), &shutdown).await;
    }
}

async fn sleep_or_cancel(duration: Duration, shutdown: &CancellationToken) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = shutdown.cancelled() => {}
    }
}
