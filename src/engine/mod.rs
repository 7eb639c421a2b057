// Arbitrage engine entrypoint
pub mod types;       // quotes, ledger entries, results, errors
pub mod comparator;  // cross-market spread detection (pure)
pub mod policy;      // which stored extrema a quote replaces (pure)
pub mod ledger;      // per-asset locked store of best prices

pub use ledger::Ledger;
pub use types::{ArbitrageResult, LedgerEntry, LedgerError, Opportunity, Quote, QuoteError, UpdateOutcome};
