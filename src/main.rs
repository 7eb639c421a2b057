use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use arbx_rs::config::Settings;
use arbx_rs::engine::Ledger;
use arbx_rs::market_data::adapters::http::HttpPriceSource;
use arbx_rs::market_data::router::Router;
use arbx_rs::telemetry;

#[derive(Parser, Debug)]
#[command(version, about = "Polls markets for asset prices and reports cross-market arbitrage")]
struct Args {
    /// Path to a settings file (toml, yaml, json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Assets to track (comma-separated)
    #[arg(long, value_delimiter = ',')]
    assets: Option<Vec<String>>,

    /// Markets to poll (comma-separated)
    #[arg(long, value_delimiter = ',')]
    markets: Option<Vec<String>>,

    /// Number of polling tasks allowed in the update phase at once
    #[arg(long)]
    max_concurrent_tasks: Option<usize>,

    /// Minimum seconds between successful requests for one asset/market pair
    #[arg(long)]
    request_interval_s: Option<f64>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, settings: &mut Settings) {
        if let Some(assets) = self.assets {
            settings.monitor.assets = assets.into_iter().map(|a| a.trim().to_string()).collect();
        }
        if let Some(markets) = self.markets {
            settings.monitor.markets = markets.into_iter().map(|m| m.trim().to_string()).collect();
        }
        if let Some(n) = self.max_concurrent_tasks {
            settings.monitor.max_concurrent_tasks = n;
        }
        if let Some(interval) = self.request_interval_s {
            settings.monitor.request_interval_s = interval;
        }
        if let Some(level) = self.log_level {
            settings.log_level = level;
        }
    }
}

// Log one line per tracked asset
fn print_ledger_summary(ledger: &Ledger) {
    for (asset, entry) in ledger.snapshot() {
        if entry.buy_price.is_finite() {
            info!(
                asset = %asset,
                buy = entry.buy_price,
                buy_at = %entry.buy_location,
                sell = entry.sell_price,
                sell_at = %entry.sell_location,
                "Ledger"
            );
        } else {
            info!(asset = %asset, "Ledger: no prices yet");
        }
    }
}

fn spawn_status_reporter(ledger: Arc<Ledger>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // first tick fires immediately
        loop {
            interval.tick().await;
            print_ledger_summary(&ledger);
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref()).context("loading settings")?;
    args.apply(&mut settings);
    settings.validate().context("validating settings")?;

    telemetry::init_tracing(&settings.log_level)?;
    telemetry::init_metrics(settings.metrics_port)?;

    let ledger = Arc::new(Ledger::new(
        &settings.monitor.assets,
        &settings.monitor.default_market,
        settings.monitor.update_timeout(),
    ));
    info!(
        assets = ledger.len(),
        update_timeout_ms = ledger.update_timeout().as_millis() as u64,
        "Ledger ready"
    );
    let source = HttpPriceSource::from_settings(&settings.source).context("building HTTP client")?;
    info!(url = source.price_url(), "Using price source");

    if let Some(every) = settings.status_interval() {
        spawn_status_reporter(Arc::clone(&ledger), every);
    }

    let router = Router::new(settings.monitor.monitor_config(), Arc::clone(&ledger), Arc::new(source));
    router
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    print_ledger_summary(&ledger);
    Ok(())
}
