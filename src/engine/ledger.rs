use std::time::Duration;

use ahash::AHashMap;
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::engine::comparator;
use crate::engine::policy;
use crate::engine::types::{ArbitrageResult, LedgerEntry, LedgerError, Quote, UpdateOutcome};

/// Default time an update may wait for an asset's entry.
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(2);

/// Best known buy/sell prices per tracked asset.
///
/// The key set is fixed at construction. Every entry has its own lock, so
/// detection and updates for one asset never block another asset, while a
/// detect and an update on the same asset are mutually exclusive.
#[derive(Debug)]
pub struct Ledger {
    entries: AHashMap<String, Mutex<LedgerEntry>>,
    update_timeout: Duration,
}

impl Ledger {
    #[instrument(skip(assets))]
    pub fn new<I, S>(assets: I, default_market: &str, update_timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries: AHashMap<String, Mutex<LedgerEntry>> = assets
            .into_iter()
            .map(|asset| (asset.into(), Mutex::new(LedgerEntry::sentinel(default_market))))
            .collect();
        info!(assets = entries.len(), "Initialized price ledger");
        Self { entries, update_timeout }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, asset: &str) -> bool {
        self.entries.contains_key(asset)
    }

    pub fn update_timeout(&self) -> Duration {
        self.update_timeout
    }

    /// Consistent copy of one asset's entry.
    pub fn get(&self, asset: &str) -> Option<LedgerEntry> {
        self.entries.get(asset).map(|slot| slot.lock().clone())
    }

    /// Every entry, sorted by asset.
    pub fn snapshot(&self) -> Vec<(String, LedgerEntry)> {
        let mut rows: Vec<(String, LedgerEntry)> = self
            .entries
            .iter()
            .map(|(asset, slot)| (asset.clone(), slot.lock().clone()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }

    /// Compare `quote` with the stored entry without modifying it.
    #[instrument(level = "trace", skip_all, fields(asset = %quote.asset(), market = %quote.market()))]
    pub fn detect(&self, quote: &Quote) -> ArbitrageResult {
        let Some(slot) = self.entries.get(quote.asset()) else {
            trace!("Asset not tracked, nothing to compare against");
            return ArbitrageResult::default();
        };

        let result = {
            let entry = slot.lock();
            comparator::detect(quote, &entry)
        };

        for explanation in &result.explanations {
            info!("{explanation}");
        }
        result
    }

    /// Apply `quote` to its asset's entry.
    ///
    /// Waits at most `update_timeout` for the entry. On timeout nothing is
    /// written. Untracked assets are never inserted.
    #[instrument(level = "debug", skip_all, fields(asset = %quote.asset(), market = %quote.market()))]
    pub fn update(&self, quote: &Quote) -> Result<UpdateOutcome, LedgerError> {
        let Some(slot) = self.entries.get(quote.asset()) else {
            let err = LedgerError::UnknownAsset { asset: quote.asset().to_string() };
            warn!(error = %err, "Ignoring update for untracked asset");
            return Err(err);
        };

        let Some(mut entry) = slot.try_lock_for(self.update_timeout) else {
            let err = LedgerError::UpdateTimeout {
                asset: quote.asset().to_string(),
                market: quote.market().to_string(),
                budget: self.update_timeout,
            };
            error!(error = %err, "Timeout during price update");
            return Err(err);
        };

        debug!(
            mid = quote.mid(),
            spread_pct = quote.spread_pct(),
            curr_price_buy = entry.buy_price,
            new_price_buy = quote.buy_price(),
            curr_price_sell = entry.sell_price,
            new_price_sell = quote.sell_price(),
            "Applying quote"
        );
        let outcome = policy::apply(quote, &mut entry);
        if outcome.buy_updated {
            debug!(price = entry.buy_price, "Updated buying price");
        }
        if outcome.sell_updated {
            debug!(price = entry.sell_price, "Updated selling price");
        }
        Ok(outcome)
    }
}
