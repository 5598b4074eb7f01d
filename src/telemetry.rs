use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over the configured level when set. Logs go to stderr so
/// command output on stdout stays clean.
pub fn init(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|err| anyhow::anyhow!("invalid log filter '{log_level}': {err}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to install tracing subscriber: {err}"))
}
