// Mock price source for local runs: serves GET /price?asset_name=..&market=..
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use arbx_rs::config::GeneratorSettings;
use arbx_rs::generator::{self, PriceBook};
use arbx_rs::telemetry;

#[derive(Parser, Debug)]
#[command(version, about = "Serves simulated asset prices per market")]
struct Args {
    /// Path to a settings file (toml, yaml, json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to bind
    #[arg(long)]
    port: Option<u16>,

    /// Fixed RNG seed for reproducible prices
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let mut settings = GeneratorSettings::load(args.config.as_deref()).context("loading generator settings")?;
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    if args.seed.is_some() {
        settings.seed = args.seed;
    }

    telemetry::init_tracing(&format!("{},tower_http=debug", settings.log_level))?;

    let book = Arc::new(match settings.seed {
        Some(seed) => PriceBook::with_seed(settings.prices.clone(), seed),
        None => PriceBook::new(settings.prices.clone()),
    });
    info!(
        assets = ?book.config().assets,
        markets = ?book.config().markets,
        "Generating prices"
    );

    let listener = TcpListener::bind((settings.host.as_str(), settings.port))
        .await
        .with_context(|| format!("binding {}:{}", settings.host, settings.port))?;

    generator::serve(listener, book, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
    .await?;

    Ok(())
}
