use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::FetchError;

pub const EXCHANGE_RATE_API_URL: &str = "https://api.exchangerate.host";

/// Multiplier applied to USD prices to express them in the base currency.
pub const NO_CONVERSION: f64 = 1.0;

#[async_trait]
pub trait ExchangeRateSource: Send + Sync {
    async fn rate(&self, from: &str, to: &str) -> Result<f64, FetchError>;
}

pub struct ExchangeRateClient {
    client: Client,
    base_url: String,
}

impl ExchangeRateClient {
    pub fn new() -> Self {
        Self::with_base_url(EXCHANGE_RATE_API_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for ExchangeRateClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeRateSource for ExchangeRateClient {
    async fn rate(&self, from: &str, to: &str) -> Result<f64, FetchError> {
        let url = format!("{}/latest", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("base", from), ("symbols", to)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))?;

        json.get("rates")
            .and_then(|rates| rates.get(to))
            .and_then(Value::as_f64)
            .filter(|rate| rate.is_finite() && *rate > 0.0)
            .ok_or_else(|| FetchError::Malformed(format!("no {} rate in response", to)))
    }
}

/// Resolves the USD -> `target` rate, falling back to no conversion on any failure.
pub async fn rate_or_default(source: &dyn ExchangeRateSource, target: &str) -> f64 {
    if target.eq_ignore_ascii_case("USD") {
        return NO_CONVERSION;
    }
    match source.rate("USD", target).await {
        Ok(rate) => {
            info!(target, rate, "currency rate resolved");
            rate
        }
        Err(e) => {
            warn!(target, error = %e, "currency rate unavailable, using 1.0");
            NO_CONVERSION
        }
    }
}
