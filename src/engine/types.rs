use std::fmt;
use std::time::Duration;

use smallvec::SmallVec;
use thiserror::Error;

/// Prices and margins are kept at this many decimal places.
pub const PRICE_DECIMALS: i32 = 4;
/// Upper bound for asset and market identifiers (after trimming).
pub const MAX_ID_LEN: usize = 64;

pub fn round_price(value: f64) -> f64 {
    let scale = 10f64.powi(PRICE_DECIMALS);
    (value * scale).round() / scale
}

// Which stored extremum a fresh quote crossed.
// SELL: the quote is cheaper than the best known sell price.
// BUY: the quote sells above the best known buy price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    BUY,
    SELL,
}

#[derive(Debug, Error, PartialEq)]
pub enum QuoteError {
    #[error("{field} must not be empty")]
    EmptyField { field: &'static str },
    #[error("{field} is {len} characters long, max is {max}")]
    FieldTooLong { field: &'static str, len: usize, max: usize },
    #[error("{field} must be a positive finite number, got {value}")]
    NotPositive { field: &'static str, value: f64 },
}

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("asset {asset} is not tracked by the ledger")]
    UnknownAsset { asset: String },
    #[error("update of {asset} from {market} did not get the ledger within {budget:?}")]
    UpdateTimeout { asset: String, market: String, budget: Duration },
}

/// A validated price observation for one asset on one market.
///
/// Buy and sell prices are derived once from the mid price and the spread
/// percentage, so every consumer sees the same rounded values.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    asset: String,
    market: String,
    mid: f64,
    spread_pct: f64,
    buy_price: f64,
    sell_price: f64,
}

impl Quote {
    pub fn new(asset: &str, market: &str, mid: f64, spread_pct: f64) -> Result<Self, QuoteError> {
        let asset = validate_id("asset", asset)?;
        let market = validate_id("market", market)?;
        let mid = validate_positive("price", mid)?;
        let spread_pct = validate_positive("spread", spread_pct)?;

        Ok(Self {
            buy_price: round_price(mid * (1.0 + spread_pct / 100.0)),
            sell_price: round_price(mid * (1.0 - spread_pct / 100.0)),
            asset,
            market,
            mid,
            spread_pct,
        })
    }

    pub fn asset(&self) -> &str {
        &self.asset
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    pub fn mid(&self) -> f64 {
        self.mid
    }

    pub fn spread_pct(&self) -> f64 {
        self.spread_pct
    }

    /// Price a buyer pays on this market.
    pub fn buy_price(&self) -> f64 {
        self.buy_price
    }

    /// Price a seller receives on this market.
    pub fn sell_price(&self) -> f64 {
        self.sell_price
    }
}

fn validate_id(field: &'static str, raw: &str) -> Result<String, QuoteError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(QuoteError::EmptyField { field });
    }
    let len = trimmed.chars().count();
    if len > MAX_ID_LEN {
        return Err(QuoteError::FieldTooLong { field, len, max: MAX_ID_LEN });
    }
    Ok(trimmed.to_string())
}

fn validate_positive(field: &'static str, value: f64) -> Result<f64, QuoteError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(QuoteError::NotPositive { field, value })
    }
}

/// Best known prices for one asset across all markets.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    /// Lowest observed price the asset can be bought at.
    pub buy_price: f64,
    pub buy_location: String,
    /// Highest observed price the asset can be sold at.
    pub sell_price: f64,
    pub sell_location: String,
}

impl LedgerEntry {
    /// Entry before any observation: nothing cheap to buy, nothing valuable to sell into.
    pub fn sentinel(default_market: &str) -> Self {
        Self {
            buy_price: f64::INFINITY,
            buy_location: default_market.to_string(),
            sell_price: 0.0,
            sell_location: default_market.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub side: Side,
    pub asset: String,
    pub buy_market: String,
    pub buy_price: f64,
    pub sell_market: String,
    pub sell_price: f64,
    pub margin: f64,
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Prices are already rounded; Debug keeps the trailing ".0" on whole values.
        write!(
            f,
            "Arbitrage possibility detected: Buy {} from {} for {:?}, sell at {} for {:?}, margin: {:?}",
            self.asset, self.buy_market, self.buy_price, self.sell_market, self.sell_price, self.margin
        )
    }
}

/// Outcome of comparing one quote with the ledger. At most two opportunities
/// exist per quote (one per side).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArbitrageResult {
    pub found: bool,
    pub explanations: SmallVec<[String; 2]>,
    pub opportunities: SmallVec<[Opportunity; 2]>,
}

impl ArbitrageResult {
    pub fn push(&mut self, opportunity: Opportunity) {
        self.found = true;
        self.explanations.push(opportunity.to_string());
        self.opportunities.push(opportunity);
    }
}

/// Which sides of an entry an update overwrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub buy_updated: bool,
    pub sell_updated: bool,
}

impl UpdateOutcome {
    pub fn any(&self) -> bool {
        self.buy_updated || self.sell_updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_prices() {
        let quote = Quote::new("Oil", "UK", 100.0, 2.0).unwrap();
        assert_eq!((quote.mid(), quote.spread_pct()), (100.0, 2.0));
        assert_eq!(quote.buy_price(), 102.0);
        assert_eq!(quote.sell_price(), 98.0);

        let quote = Quote::new("Oil", "US", 95.0, 1.0).unwrap();
        assert_eq!(quote.buy_price(), 95.95);
        assert_eq!(quote.sell_price(), 94.05);
    }

    #[test]
    fn test_prices_rounded_to_four_places() {
        let quote = Quote::new("Copper", "US", 1.23456789, 0.3333).unwrap();
        assert_eq!(quote.buy_price(), 1.2387);
        assert_eq!(quote.sell_price(), 1.2305);
    }

    #[test]
    fn test_identifiers_are_trimmed() {
        let quote = Quote::new("  Oil ", "\tUK\n", 10.0, 1.0).unwrap();
        assert_eq!(quote.asset(), "Oil");
        assert_eq!(quote.market(), "UK");
    }

    #[test]
    fn test_rejects_bad_quotes() {
        assert_eq!(
            Quote::new("   ", "UK", 10.0, 1.0),
            Err(QuoteError::EmptyField { field: "asset" })
        );
        assert_eq!(
            Quote::new("Oil", "", 10.0, 1.0),
            Err(QuoteError::EmptyField { field: "market" })
        );
        let long = "x".repeat(MAX_ID_LEN + 1);
        assert_eq!(
            Quote::new(&long, "UK", 10.0, 1.0),
            Err(QuoteError::FieldTooLong { field: "asset", len: MAX_ID_LEN + 1, max: MAX_ID_LEN })
        );
        assert!(matches!(
            Quote::new("Oil", "UK", 0.0, 1.0),
            Err(QuoteError::NotPositive { field: "price", .. })
        ));
        assert!(matches!(
            Quote::new("Oil", "UK", 10.0, -1.0),
            Err(QuoteError::NotPositive { field: "spread", .. })
        ));
        assert!(Quote::new("Oil", "UK", f64::NAN, 1.0).is_err());
        assert!(Quote::new("Oil", "UK", 10.0, f64::INFINITY).is_err());
    }

    #[test]
    fn test_sentinel_entry() {
        let entry = LedgerEntry::sentinel("US");
        assert!(entry.buy_price.is_infinite());
        assert_eq!(entry.sell_price, 0.0);
        assert_eq!(entry.buy_location, "US");
        assert_eq!(entry.sell_location, "US");
    }

    #[test]
    fn test_opportunity_message() {
        let opportunity = Opportunity {
            side: Side::SELL,
            asset: "Oil".into(),
            buy_market: "US".into(),
            buy_price: 95.95,
            sell_market: "UK".into(),
            sell_price: 98.0,
            margin: 2.05,
        };
        assert_eq!(
            opportunity.to_string(),
            "Arbitrage possibility detected: Buy Oil from US for 95.95, sell at UK for 98.0, margin: 2.05"
        );
    }
}
