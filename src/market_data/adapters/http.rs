// HTTP price source backed by the price generator API

use std::time::Duration;

use tracing::{debug, error};

use super::http_types::PriceResponse;
use super::{FetchError, PriceSource};
use crate::config::SourceSettings;
use crate::engine::Quote;

pub struct HttpPriceSource {
    client: reqwest::Client,
    price_url: String,   // e.g. "http://localhost:8000/price"
    retry_delay: Duration, // pause after a failed fetch
}

impl HttpPriceSource {
    pub fn new(base_url: &str, request_timeout: Duration, retry_delay: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            price_url: format!("{}/price", base_url.trim_end_matches('/')),
            retry_delay,
        })
    }

    pub fn from_settings(settings: &SourceSettings) -> Result<Self, FetchError> {
        Self::new(&settings.base_url(), settings.request_timeout(), settings.retry_delay())
    }

    pub fn price_url(&self) -> &str {
        &self.price_url
    }

    async fn request(&self, asset: &str, market: &str) -> Result<Quote, FetchError> {
        let response = self
            .client
            .get(&self.price_url)
            .query(&[("asset_name", asset), ("market", market)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.bytes().await?;
        let payload: PriceResponse = serde_json::from_slice(&body)?;
        debug!(?payload, "Received asset data");
        Ok(Quote::try_from(payload)?)
    }
}

#[async_trait::async_trait]
impl PriceSource for HttpPriceSource {
    async fn fetch(&self, asset: &str, market: &str) -> Option<Quote> {
        match self.request(asset, market).await {
            Ok(quote) => Some(quote),
            Err(e) => {
                error!(asset, market, error = %e, "Price fetch failed");
                tokio::time::sleep(self.retry_delay).await;
                None
            }
        }
    }
}
