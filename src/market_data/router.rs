// Router drives one polling task per (asset, market) pair against a shared ledger
use std::future::Future;
use std::sync::Arc;

use itertools::iproduct;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, trace};

use crate::config::MonitorConfig;
use crate::engine::{ArbitrageResult, Ledger, LedgerError, Quote, UpdateOutcome};
use crate::market_data::adapters::PriceSource;
use crate::telemetry;

/// Result of one successful fetch cycle.
pub struct Cycle {
    /// Detection against the ledger as it stood before this quote.
    pub arbitrage: ArbitrageResult,
    /// The dispatched update. The polling loop never waits on it.
    pub update: JoinHandle<Result<UpdateOutcome, LedgerError>>,
}

#[derive(Clone)]
pub struct Router {
    config: Arc<MonitorConfig>,
    ledger: Arc<Ledger>,
    source: Arc<dyn PriceSource>,
    permits: Arc<Semaphore>,
}

impl Router {
    pub fn new(config: MonitorConfig, ledger: Arc<Ledger>, source: Arc<dyn PriceSource>) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_tasks.max(1)));
        Self { config: Arc::new(config), ledger, source, permits }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Every (asset, market) pair that gets its own polling task.
    pub fn pairs(&self) -> Vec<(String, String)> {
        iproduct!(self.config.assets.iter(), self.config.markets.iter())
            .map(|(asset, market)| (asset.clone(), market.clone()))
            .collect()
    }

    /// Poll every pair until `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut tasks = JoinSet::new();
        for (asset, market) in self.pairs() {
            let router = self.clone();
            tasks.spawn(async move { router.poll_forever(asset, market).await });
        }
        info!(
            tasks = tasks.len(),
            max_concurrent = self.config.max_concurrent_tasks,
            interval_ms = self.config.request_interval.as_millis() as u64,
            "Started polling tasks"
        );

        tokio::select! {
            _ = shutdown => info!("Shutdown requested, stopping polling tasks"),
            Some(res) = tasks.join_next() => {
                // poll_forever never returns, so this is a panic or abort
                error!(error = ?res.err(), "Polling task exited unexpectedly");
            }
        }
        tasks.shutdown().await;
    }

    async fn poll_forever(&self, asset: String, market: String) {
        loop {
            self.poll_once(&asset, &market).await;
        }
    }

    /// One cycle: fetch, detect, then dispatch the update and pace while
    /// holding a concurrency permit. `None` when the fetch failed.
    #[instrument(level = "trace", skip(self))]
    pub async fn poll_once(&self, asset: &str, market: &str) -> Option<Cycle> {
        let Some(quote) = self.source.fetch(asset, market).await else {
            metrics::counter!(telemetry::FETCH_FAILURES_TOTAL).increment(1);
            return None;
        };
        metrics::counter!(telemetry::QUOTES_TOTAL).increment(1);
        if quote.asset() != asset || quote.market() != market {
            debug!(got_asset = quote.asset(), got_market = quote.market(), "Source answered for a different pair");
        }

        let arbitrage = self.ledger.detect(&quote);
        if arbitrage.found {
            metrics::counter!(telemetry::ARBITRAGE_SIGNALS_TOTAL).increment(arbitrage.opportunities.len() as u64);
        }

        let permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => {
                error!("Concurrency limiter closed");
                return None;
            }
        };
        let update = dispatch_update(Arc::clone(&self.ledger), quote);
        tokio::time::sleep(self.config.request_interval).await;
        drop(permit);

        Some(Cycle { arbitrage, update })
    }
}

// Runs the update on the blocking pool so the polling loop keeps its pace
// even when the entry is contended.
fn dispatch_update(ledger: Arc<Ledger>, quote: Quote) -> JoinHandle<Result<UpdateOutcome, LedgerError>> {
    tokio::task::spawn_blocking(move || {
        let result = ledger.update(&quote);
        match &result {
            Ok(outcome) => trace!(asset = quote.asset(), market = quote.market(), ?outcome, "Ledger updated"),
            Err(LedgerError::UnknownAsset { .. }) => {
                metrics::counter!(telemetry::UNKNOWN_ASSET_TOTAL).increment(1);
            }
            Err(LedgerError::UpdateTimeout { .. }) => {
                metrics::counter!(telemetry::UPDATE_TIMEOUTS_TOTAL).increment(1);
            }
        }
        result
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    use crate::engine::ledger::DEFAULT_UPDATE_TIMEOUT;
    use crate::engine::LedgerEntry;

    // Replays a fixed list of quotes, then keeps failing.
    struct Scripted {
        quotes: Mutex<VecDeque<Option<Quote>>>,
    }

    impl Scripted {
        fn new(quotes: Vec<Option<Quote>>) -> Self {
            Self { quotes: Mutex::new(quotes.into()) }
        }
    }

    #[async_trait::async_trait]
    impl PriceSource for Scripted {
        async fn fetch(&self, _asset: &str, _market: &str) -> Option<Quote> {
            self.quotes.lock().pop_front().flatten()
        }
    }

    // Answers every pair with a fixed mid price per market, counting calls.
    struct Fixed {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl PriceSource for Fixed {
        async fn fetch(&self, asset: &str, market: &str) -> Option<Quote> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            tokio::task::yield_now().await;
            let mid = if market == "US" { 95.0 } else { 100.0 };
            Quote::new(asset, market, mid, 1.0).ok()
        }
    }

    fn config(assets: &[&str], markets: &[&str], interval: Duration) -> MonitorConfig {
        MonitorConfig {
            assets: assets.iter().map(|s| s.to_string()).collect(),
            markets: markets.iter().map(|s| s.to_string()).collect(),
            max_concurrent_tasks: 2,
            request_interval: interval,
        }
    }

    fn router(source: Arc<dyn PriceSource>, interval: Duration) -> Router {
        let ledger = Arc::new(Ledger::new(["Oil", "Copper"], "US", DEFAULT_UPDATE_TIMEOUT));
        Router::new(config(&["Oil", "Copper"], &["US", "UK"], interval), ledger, source)
    }

    #[test]
    fn test_pairs() {
        let r = router(Arc::new(Scripted::new(vec![])), Duration::ZERO);
        assert_eq!(
            r.pairs(),
            vec![
                ("Oil".to_string(), "US".to_string()),
                ("Oil".to_string(), "UK".to_string()),
                ("Copper".to_string(), "US".to_string()),
                ("Copper".to_string(), "UK".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_detect_sees_state_before_update() {
        let source = Scripted::new(vec![
            Some(Quote::new("Oil", "UK", 100.0, 2.0).unwrap()),
            Some(Quote::new("Oil", "US", 95.0, 1.0).unwrap()),
        ]);
        let r = router(Arc::new(source), Duration::ZERO);

        let first = r.poll_once("Oil", "UK").await.unwrap();
        assert!(!first.arbitrage.found);
        let outcome = first.update.await.unwrap().unwrap();
        assert!(outcome.buy_updated && outcome.sell_updated);

        let second = r.poll_once("Oil", "US").await.unwrap();
        assert!(second.arbitrage.found);
        assert_eq!(second.arbitrage.explanations.len(), 1);
        assert_eq!(second.arbitrage.opportunities[0].margin, 2.05);
        second.update.await.unwrap().unwrap();

        let entry = r.ledger().get("Oil").unwrap();
        assert_eq!((entry.buy_price, entry.buy_location.as_str()), (95.95, "US"));
        assert_eq!((entry.sell_price, entry.sell_location.as_str()), (98.0, "UK"));
    }

    #[tokio::test]
    async fn test_failed_fetch_skips_cycle() {
        let r = router(Arc::new(Scripted::new(vec![None])), Duration::ZERO);
        assert!(r.poll_once("Oil", "UK").await.is_none());
        assert_eq!(r.ledger().get("Oil"), Some(LedgerEntry::sentinel("US")));
    }

    #[tokio::test]
    async fn test_unknown_asset_update_is_reported() {
        let source = Scripted::new(vec![Some(Quote::new("Gold", "UK", 1900.0, 0.5).unwrap())]);
        let r = router(Arc::new(source), Duration::ZERO);

        let cycle = r.poll_once("Gold", "UK").await.unwrap();
        assert!(!cycle.arbitrage.found);
        assert!(matches!(cycle.update.await.unwrap(), Err(LedgerError::UnknownAsset { .. })));
        assert!(!r.ledger().contains("Gold"));
    }

    #[tokio::test]
    async fn test_cycle_waits_request_interval() {
        let source = Scripted::new(vec![Some(Quote::new("Oil", "UK", 100.0, 2.0).unwrap())]);
        let r = router(Arc::new(source), Duration::from_millis(50));

        let started = tokio::time::Instant::now();
        r.poll_once("Oil", "UK").await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_until_polls_every_pair() {
        let source = Arc::new(Fixed { calls: AtomicUsize::new(0) });
        let r = router(source.clone(), Duration::from_millis(5));

        r.run_until(tokio::time::sleep(Duration::from_millis(300))).await;

        assert!(source.calls.load(Ordering::Relaxed) >= 4);
        for asset in ["Oil", "Copper"] {
            let entry = r.ledger().get(asset).unwrap();
            // US is cheapest to buy from (95.95), UK pays the most (99.0).
            assert_eq!((entry.buy_price, entry.buy_location.as_str()), (95.95, "US"));
            assert_eq!((entry.sell_price, entry.sell_location.as_str()), (99.0, "UK"));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_limiter_bounds_pacing_phase() {
        let assets = ["Oil", "Copper", "Gold", "Zinc"];
        let ledger = Arc::new(Ledger::new(assets, "US", DEFAULT_UPDATE_TIMEOUT));
        let source = Arc::new(Fixed { calls: AtomicUsize::new(0) });
        let r = Router::new(
            config(&assets, &["US", "UK"], Duration::from_millis(100)),
            ledger,
            source.clone(),
        );
        assert_eq!(r.pairs().len(), 8);

        let ceiling = r.config.max_concurrent_tasks;
        let permits = Arc::clone(&r.permits);
        let watcher = tokio::spawn(async move {
            let mut peak = 0;
            for _ in 0..400 {
                peak = peak.max(ceiling - permits.available_permits());
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            peak
        });

        let started = tokio::time::Instant::now();
        r.run_until(tokio::time::sleep(Duration::from_millis(450))).await;
        let peak = watcher.await.unwrap();

        assert_eq!(peak, ceiling);
        // Every task fetches once before queueing for a permit. After that a
        // fetch needs a finished cycle, and each permit is held for a full
        // interval, so 2 permits over ~450ms finish at most 2 * 5 cycles.
        assert!(started.elapsed() >= Duration::from_millis(450));
        assert!(source.calls.load(Ordering::Relaxed) <= 8 + 2 * 5);
    }
}
