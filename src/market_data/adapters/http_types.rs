// Source: GET /price?asset_name=<asset>&market=<market>
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{Quote, QuoteError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceResponse {
    pub name: String,
    pub market: String,
    pub price: f64,  // mid price
    pub spread: f64, // percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_quote_id: Option<Uuid>,
}

impl TryFrom<PriceResponse> for Quote {
    type Error = QuoteError;

    fn try_from(payload: PriceResponse) -> Result<Self, Self::Error> {
        Quote::new(&payload.name, &payload.market, payload.price, payload.spread)
    }
}
