// Shared trait + errors for price sources

use thiserror::Error;

use crate::engine::{Quote, QuoteError};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("invalid quote: {0}")]
    Invalid(#[from] QuoteError),
}

#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    // A failed fetch is `None`; implementations log and pace retries themselves.
    async fn fetch(&self, asset: &str, market: &str) -> Option<Quote>;
}

pub mod http;
pub mod http_types;
