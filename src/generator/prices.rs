use ahash::AHashMap;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;
use uuid::Uuid;

use crate::engine::types::round_price;
use crate::market_data::adapters::http_types::PriceResponse;

#[derive(Debug, Error, PartialEq)]
pub enum GeneratorError {
    #[error("unknown asset {0}")]
    UnknownAsset(String),
    #[error("unknown market {0}")]
    UnknownMarket(String),
    #[error("invalid generator config: {0}")]
    InvalidConfig(String),
}

/// Shape of the simulated price paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub assets: Vec<String>,
    pub markets: Vec<String>,
    pub price_min: f64,
    pub price_max: f64,
    /// Spread in percent.
    pub spread_min: f64,
    pub spread_max: f64,
    /// Largest relative move per request, e.g. 0.05 = 5%.
    pub price_change_max: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            assets: vec!["Copper".into(), "Oil".into()],
            markets: vec!["US".into(), "UK".into()],
            price_min: 50.0,
            price_max: 150.0,
            spread_min: 0.01,
            spread_max: 2.0,
            price_change_max: 0.05,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<(), GeneratorError> {
        let bad = |msg: String| Err(GeneratorError::InvalidConfig(msg));
        if self.assets.is_empty() || self.markets.is_empty() {
            return bad("assets and markets must not be empty".into());
        }
        for (name, value) in [
            ("price_min", self.price_min),
            ("price_max", self.price_max),
            ("spread_min", self.spread_min),
            ("spread_max", self.spread_max),
            ("price_change_max", self.price_change_max),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return bad(format!("{name} must be positive, got {value}"));
            }
        }
        if self.price_min > self.price_max {
            return bad(format!("price_min {} exceeds price_max {}", self.price_min, self.price_max));
        }
        if self.spread_min > self.spread_max {
            return bad(format!("spread_min {} exceeds spread_max {}", self.spread_min, self.spread_max));
        }
        Ok(())
    }
}

struct WalkState {
    rng: StdRng,
    last: AHashMap<(String, String), f64>,
}

/// Bounded random walk of mid prices, one path per (asset, market).
pub struct PriceBook {
    config: GeneratorConfig,
    state: Mutex<WalkState>,
}

impl PriceBook {
    pub fn new(config: GeneratorConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    pub fn with_seed(config: GeneratorConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: GeneratorConfig, rng: StdRng) -> Self {
        Self { config, state: Mutex::new(WalkState { rng, last: AHashMap::new() }) }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Next quote for the pair; moves its price path one step.
    pub fn quote(&self, asset: &str, market: &str) -> Result<PriceResponse, GeneratorError> {
        let asset = self
            .config
            .assets
            .iter()
            .find(|a| a.as_str() == asset)
            .ok_or_else(|| GeneratorError::UnknownAsset(asset.to_string()))?;
        let market = self
            .config
            .markets
            .iter()
            .find(|m| m.as_str() == market)
            .ok_or_else(|| GeneratorError::UnknownMarket(market.to_string()))?;

        let cfg = &self.config;
        let mut guard = self.state.lock();
        let WalkState { rng, last } = &mut *guard;

        let key = (asset.clone(), market.clone());
        let price = match last.get(&key) {
            Some(prev) => {
                let change = rng.gen_range(-cfg.price_change_max..=cfg.price_change_max);
                (prev * (1.0 + change)).clamp(cfg.price_min, cfg.price_max)
            }
            None => rng.gen_range(cfg.price_min..=cfg.price_max),
        };
        let price = round_price(price).clamp(cfg.price_min, cfg.price_max);
        last.insert(key, price);
        let spread = rng.gen_range(cfg.spread_min..=cfg.spread_max);
        trace!(asset = %asset, market = %market, price, spread, "Generated price");

        Ok(PriceResponse {
            name: asset.clone(),
            market: market.clone(),
            price,
            spread,
            price_quote_id: Some(Uuid::new_v4()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Quote;

    #[test]
    fn test_quotes_stay_in_bounds() {
        let config = GeneratorConfig::default();
        let book = PriceBook::with_seed(config.clone(), 1);

        let mut prev: Option<f64> = None;
        for _ in 0..500 {
            let q = book.quote("Oil", "US").unwrap();
            assert!(q.price >= config.price_min && q.price <= config.price_max);
            assert!(q.spread >= config.spread_min && q.spread <= config.spread_max);
            if let Some(p) = prev {
                // one step plus rounding slack
                assert!((q.price - p).abs() <= p * config.price_change_max + 1e-4);
            }
            prev = Some(q.price);
            assert!(Quote::try_from(q).is_ok());
        }
    }

    #[test]
    fn test_same_seed_same_path() {
        let a = PriceBook::with_seed(GeneratorConfig::default(), 99);
        let b = PriceBook::with_seed(GeneratorConfig::default(), 99);
        for _ in 0..10 {
            let qa = a.quote("Copper", "UK").unwrap();
            let qb = b.quote("Copper", "UK").unwrap();
            assert_eq!((qa.price, qa.spread), (qb.price, qb.spread));
            assert_ne!(qa.price_quote_id, qb.price_quote_id);
        }
    }

    #[test]
    fn test_unknown_pair() {
        let book = PriceBook::with_seed(GeneratorConfig::default(), 1);
        assert_eq!(book.quote("Gold", "US"), Err(GeneratorError::UnknownAsset("Gold".into())));
        assert_eq!(book.quote("Oil", "JP"), Err(GeneratorError::UnknownMarket("JP".into())));
    }

    #[test]
    fn test_validate() {
        assert!(GeneratorConfig::default().validate().is_ok());
        let config = GeneratorConfig { spread_min: 0.0, ..GeneratorConfig::default() };
        assert!(config.validate().is_err());
        let config = GeneratorConfig { price_min: 10.0, price_max: 1.0, ..GeneratorConfig::default() };
        assert!(config.validate().is_err());
        let config = GeneratorConfig { markets: vec![], ..GeneratorConfig::default() };
        assert!(config.validate().is_err());
    }
}
