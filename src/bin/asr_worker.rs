use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pos_audio_pipeline::asr::audio_fetcher::{default_cache_dir, AudioFetcher};
use pos_audio_pipeline::asr::transcribe::{AsrEngine, WhisperAsrEngine};
use pos_audio_pipeline::asr::{process, repository};
use pos_audio_pipeline::config::AsrWorkerConfig;
use pos_audio_pipeline::{db, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AsrWorkerConfig::load()?;
    telemetry::init(&config.shared.log_level)?;

    let pool = db::connect_with_retry(&config.shared.database_url).await?;
    db::run_migrations(&pool).await?;

    let storage_root = std::path::PathBuf::from(&config.shared.audio_storage_dir);
    let cache_dir = default_cache_dir(&storage_root);
    tokio::fs::create_dir_all(&cache_dir).await?;

    let fetcher = std::sync::Arc::new(AudioFetcher::new(
        config.ingest_internal_base_url.clone(),
        config.internal_token.clone(),
        cache_dir,
        config.http_timeout_sec,
    ));
    let engine: std::sync::Arc<dyn AsrEngine> = std::sync::Arc::new(WhisperAsrEngine::new(
        &config.whisper_model_fast,
        &config.whisper_model_accurate,
        &config.language,
        config.beam_size,
    ));

    let shutdown = CancellationToken::new();

    let main_loop = tokio::spawn(run_main_loop(pool.clone(), fetcher, engine, config.clone(), shutdown.clone()));
    let sweeper = tokio::spawn(run_recovery_sweeper(pool.clone(), config.clone(), shutdown.clone()));
    let metrics = tokio::spawn(run_metrics_emitter(pool.clone(), shutdown.clone()));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining asr worker");
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
    fetcher: std::sync::Arc<AudioFetcher>,
    engine: std::sync::Arc<dyn AsrEngine>,
    config: AsrWorkerConfig,
    shutdown: CancellationToken,
) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }

        let dialogues = match repository::claim_pending_dialogues(&pool, config.batch_size).await {
            Ok(d) => d,
            Err(err) => {
                error!(error = %err, "failed to claim pending dialogues");
                sleep_or_cancel(Duration::from_secs_f64(config.poll_interval_sec), &shutdown).await;
                continue;
            }
        };

        if dialogues.is_empty() {
            sleep_or_cancel(Duration::from_secs_f64(config.poll_interval_sec), &shutdown).await;
            continue;
        }

        for dialogue in &dialogues {
            if shutdown.is_cancelled() {
                return;
            }
            match process::process_dialogue(&pool, &fetcher, engine.as_ref(), &config, dialogue).await {
                Ok(()) => info!(dialogue_id = %dialogue.dialogue_id, "dialogue transcribed"),
                Err(err) => {
                    let message = pos_audio_pipeline::error::truncate_error(&err, 1000);
                    warn!(dialogue_id = %dialogue.dialogue_id, error = %err, "asr failed");
                    if let Err(db_err) = repository::finish_asr_error(&pool, dialogue.dialogue_id, &message).await {
                        error!(dialogue_id = %dialogue.dialogue_id, error = %db_err, "failed to record asr error");
                    }
                }
            }
        }
    }
}

async fn run_recovery_sweeper(pool: sqlx::PgPool, config: AsrWorkerConfig, shutdown: CancellationToken) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }
        match repository::requeue_stuck_asr(&pool, config.asr_stuck_timeout_sec).await {
            Ok(0) => {}
            Ok(n) => info!(requeued = n, "recovered stuck asr dialogues"),
            Err(err) => error!(error = %err, "stuck-asr recovery sweep failed"),
        }
        sleep_or_cancel(Duration::from_secs_f64(config.recovery_interval_sec), &shutdown).await;
    }
}

async fn run_metrics_emitter(pool: sqlx::PgPool, shutdown: CancellationToken) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }
        match repository::count_pending_dialogues(&pool).await {
            Ok(depth) => info!(pending_dialogues = depth, "asr queue depth"),
            Err(err) => warn!(error = %err, "failed to read asr queue depth"),
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
