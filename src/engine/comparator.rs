//! Cross-market spread detection.
//!
//! Compares a fresh quote against the ledger entry as it stood *before* the
//! quote is applied. Both checks always run; a quote can open a trade on
//! either side, or both.

use crate::engine::types::{round_price, ArbitrageResult, LedgerEntry, Opportunity, Quote, Side};

pub fn detect(quote: &Quote, entry: &LedgerEntry) -> ArbitrageResult {
    let mut result = ArbitrageResult::default();

    // Buy here, sell into the best known sink.
    if quote.buy_price() < entry.sell_price && entry.sell_location != quote.market() {
        result.push(Opportunity {
            side: Side::SELL,
            asset: quote.asset().to_string(),
            buy_market: quote.market().to_string(),
            buy_price: quote.buy_price(),
            sell_market: entry.sell_location.clone(),
            sell_price: entry.sell_price,
            margin: round_price(entry.sell_price - quote.buy_price()),
        });
    }

    // Buy from the best known source, sell here.
    if quote.sell_price() > entry.buy_price && entry.buy_location != quote.market() {
        result.push(Opportunity {
            side: Side::BUY,
            asset: quote.asset().to_string(),
            buy_market: entry.buy_location.clone(),
            buy_price: entry.buy_price,
            sell_market: quote.market().to_string(),
            sell_price: quote.sell_price(),
            margin: round_price(quote.sell_price() - entry.buy_price),
        });
    }

    result
}
