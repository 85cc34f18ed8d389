//! Capital.com live quotes: open a session, then read the latest bid.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::FetchError;

pub const CAPITAL_API_URL: &str = "https://api-capital.backend-capital.com";

const API_KEY_HEADER: &str = "X-CAP-API-KEY";
const CST_HEADER: &str = "CST";
const SECURITY_TOKEN_HEADER: &str = "X-SECURITY-TOKEN";

#[derive(Debug, Clone, Default)]
pub struct CapitalCredentials {
    pub api_key: String,
    pub identifier: Option<String>,
    pub password: Option<String>,
}

/// Tokens returned by the session handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct CapitalSession {
    pub cst: String,
    pub security_token: String,
}

#[derive(Serialize)]
struct SessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Deserialize, Debug)]
struct PriceResponse {
    prices: Vec<PricePoint>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PricePoint {
    close_price: BidAsk,
}

#[derive(Deserialize, Debug)]
struct BidAsk {
    bid: Option<f64>,
}

#[async_trait]
pub trait LiveQuoteSource: Send + Sync {
    async fn latest_bid(&self, symbol: &str) -> Result<f64, FetchError>;
}

pub struct CapitalClient {
    client: Client,
    base_url: String,
    credentials: CapitalCredentials,
}

impl CapitalClient {
    pub fn new(credentials: CapitalCredentials) -> Self {
        Self::with_base_url(CAPITAL_API_URL, credentials)
    }

    pub fn with_base_url(base_url: impl Into<String>, credentials: CapitalCredentials) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    /// Step one: authenticate and pull the two session tokens from the response headers.
    pub async fn open_session(&self) -> Result<CapitalSession, FetchError> {
        let url = format!("{}/api/v1/session", self.base_url);
        let request = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.credentials.api_key);

        let request = match (&self.credentials.identifier, &self.credentials.password) {
            (Some(identifier), Some(password)) => request.json(&SessionRequest {
                identifier,
                password,
            }),
            _ => request.json(&serde_json::json!({})),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Auth(format!("status {}: {}", status.as_u16(), body)));
        }

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        match (header(CST_HEADER), header(SECURITY_TOKEN_HEADER)) {
            (Some(cst), Some(security_token)) => {
                debug!("capital.com session opened");
                Ok(CapitalSession {
                    cst,
                    security_token,
                })
            }
            _ => Err(FetchError::Auth("session tokens missing from response".into())),
        }
    }

    /// Step two: raw price payload for a symbol.
    pub async fn prices(
        &self,
        session: &CapitalSession,
        symbol: &str,
    ) -> Result<Value, FetchError> {
        let url = format!("{}/api/v1/prices/{}", self.base_url, symbol);
        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.credentials.api_key)
            .header(CST_HEADER, &session.cst)
            .header(SECURITY_TOKEN_HEADER, &session.security_token)
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

        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Malformed(e.to_string()))
    }
}

/// The bid of the last price entry.
fn last_bid(payload: Value, symbol: &str) -> Result<f64, FetchError> {
    let parsed: PriceResponse =
        serde_json::from_value(payload).map_err(|e| FetchError::Malformed(e.to_string()))?;
    parsed
        .prices
        .last()
        .and_then(|p| p.close_price.bid)
        .ok_or_else(|| FetchError::Empty(symbol.to_string()))
}

#[async_trait]
impl LiveQuoteSource for CapitalClient {
    async fn latest_bid(&self, symbol: &str) -> Result<f64, FetchError> {
        info!(symbol, "requesting live quote");
        let session = self.open_session().await.inspect_err(|e| {
            warn!(symbol, error = %e, "capital.com authentication failed");
        })?;
        let payload = self.prices(&session, symbol).await?;
        last_bid(payload, symbol)
    }
}
