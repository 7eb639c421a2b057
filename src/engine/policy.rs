//! Decides which stored extrema a new quote replaces.
//!
//! A side is overwritten when the quote improves on it, or when the quote
//! comes from the market that side was recorded from. Same-market data always
//! wins, even when it is worse than what is stored.

use crate::engine::types::{LedgerEntry, Quote, UpdateOutcome};

pub fn apply(quote: &Quote, entry: &mut LedgerEntry) -> UpdateOutcome {
    let buy_updated = quote.buy_price() < entry.buy_price || quote.market() == entry.buy_location;
    if buy_updated {
        entry.buy_price = quote.buy_price();
        entry.buy_location = quote.market().to_string();
    }

    let sell_updated = quote.sell_price() > entry.sell_price || quote.market() == entry.sell_location;
    if sell_updated {
        entry.sell_price = quote.sell_price();
        entry.sell_location = quote.market().to_string();
    }

    UpdateOutcome { buy_updated, sell_updated }
}
