use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::DbError;

/// Connects with the pool sizing the original deployment used
/// (`pool_size=10, max_overflow=20` in the source settings), retrying up to
/// 30 times at a 2 s interval so a worker started before Postgres is ready
/// does not immediately crash-loop.
pub async fn connect_with_retry(database_url: &str) -> anyhow::Result<PgPool> {
    const MAX_ATTEMPTS: u32 = 30;
    const RETRY_DELAY: Duration = Duration::from_secs(2);

    let mut attempt = 0;
    loop {
        attempt += 1;
        match PgPoolOptions::new()
            .max_connections(30)
            .test_before_acquire(true)
            .connect(database_url)
            .await
        {
            Ok(pool) => {
                info!(attempt, "connected to database");
                return Ok(pool);
            }
            Err(err) if attempt < MAX_ATTEMPTS => {
                warn!(attempt, error = %err, "database not ready, retrying");
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(err) => {
                return Err(anyhow::anyhow!(
                    "database unreachable after {attempt} attempts: {err}"
                ));
            }
        }
    }
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
