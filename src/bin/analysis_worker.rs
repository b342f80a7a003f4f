use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pos_audio_pipeline::analysis::llm_client::{OpenAiUpsellClient, UpsellLlmClient};
use pos_audio_pipeline::analysis::{process, repository};
use pos_audio_pipeline::config::AnalysisWorkerConfig;
use pos_audio_pipeline::{db, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AnalysisWorkerConfig::load()?;
    telemetry::init(&config.shared.log_level)?;

    let pool = db::connect_with_retry(&config.shared.database_url).await?;
    db::run_migrations(&pool).await?;

    let llm: std::sync::Arc<dyn UpsellLlmClient> = std::sync::Arc::new(OpenAiUpsellClient::new(&config));

    let shutdown = CancellationToken::new();

    let main_loop = tokio::spawn(run_main_loop(pool.clone(), llm, config.clone(), shutdown.clone()));
    let sweeper = tokio::spawn(run_recovery_sweeper(pool.clone(), config.clone(), shutdown.clone()));
    let metrics = tokio::spawn(run_metrics_emitter(pool.clone(), shutdown.clone()));

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining analysis worker");
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
    llm: std::sync::Arc<dyn UpsellLlmClient>,
    config: AnalysisWorkerConfig,
    shutdown: CancellationToken,
) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }

        let dialogues = match repository::claim_pending_analysis(&pool, config.batch_size).await {
            Ok(d) => d,
            Err(err) => {
                error!(error = %err, "failed to claim pending analysis dialogues");
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
            match process::process_dialogue(&pool, llm.as_ref(), &config, dialogue).await {
                Ok(()) => info!(dialogue_id = %dialogue.dialogue_id, "dialogue analyzed"),
                Err(err) => {
                    warn!(dialogue_id = %dialogue.dialogue_id, error = %err, "analysis failed");
                }
            }
        }
    }
}

async fn run_recovery_sweeper(pool: sqlx::PgPool, config: AnalysisWorkerConfig, shutdown: CancellationToken) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }
        match repository::requeue_stuck_analysis(&pool, config.analysis_stuck_timeout_sec).await {
            Ok(0) => {}
            Ok(n) => info!(requeued = n, "recovered stuck analysis dialogues"),
            Err(err) => error!(error = %err, "stuck-analysis recovery sweep failed"),
        }
        sleep_or_cancel(Duration::from_secs_f64(config.recovery_interval_sec), &shutdown).await;
    }
}

async fn run_metrics_emitter(pool: sqlx::PgPool, shutdown: CancellationToken) {
    loop {
        if shutdown.is_cancelled() {
            return;
        }
        match repository::count_pending_analysis(&pool).await {
            Ok(depth) => info!(pending_analysis = depth, "analysis queue depth"),
            Err(err) => warn!(error = %err, "failed to read analysis queue depth"),
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
