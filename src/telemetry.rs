use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Shared logging setup for every binary: structured output to stdout,
/// filtered by `RUST_LOG` if set, else by the service's own `LOG_LEVEL`.
pub fn init(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}
