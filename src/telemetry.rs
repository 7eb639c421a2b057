use anyhow::Context;
use tracing_subscriber::EnvFilter;

pub const QUOTES_TOTAL: &str = "arbx_quotes_total";
pub const FETCH_FAILURES_TOTAL: &str = "arbx_fetch_failures_total";
pub const ARBITRAGE_SIGNALS_TOTAL: &str = "arbx_arbitrage_signals_total";
pub const UPDATE_TIMEOUTS_TOTAL: &str = "arbx_update_timeouts_total";
pub const UNKNOWN_ASSET_TOTAL: &str = "arbx_unknown_asset_total";

/// Install the global fmt subscriber. A non-empty `RUST_LOG` replaces
/// `configured`; either one failing to parse is an error.
pub fn init_tracing(configured: &str) -> anyhow::Result<()> {
    let filter = log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), configured)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| anyhow::anyhow!("installing tracing subscriber: {e}"))
}

fn log_filter(from_env: Option<String>, configured: &str) -> anyhow::Result<EnvFilter> {
    match from_env.filter(|directives| !directives.trim().is_empty()) {
        Some(directives) => EnvFilter::try_new(&directives)
            .with_context(|| format!("invalid {} filter {directives:?}", EnvFilter::DEFAULT_ENV)),
        None => EnvFilter::try_new(configured)
            .with_context(|| format!("invalid log level {configured:?}")),
    }
}

#[cfg(feature = "metrics-exporter")]
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()?;

    tracing::info!(port, "Prometheus exporter listening on /metrics");
    metrics::gauge!("arbx_up").set(1.0);
    Ok(())
}

#[cfg(not(feature = "metrics-exporter"))]
pub fn init_metrics(_port: u16) -> anyhow::Result<()> {
    metrics::gauge!("arbx_up").set(1.0);
    Ok(())
}
