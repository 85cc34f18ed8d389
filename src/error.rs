use thiserror::Error;

/// Failure at one of the external-call boundaries (market data, brokerage, currency).
///
/// Callers never retry; they either fall back to a documented default or turn the
/// message into an inline error cell.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("no data returned for {0}")]
    Empty(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

/// A price that cannot be used to size a position.
#[derive(Debug, Error, PartialEq)]
#[error("invalid price {price} for share calculation")]
pub struct InvalidPriceError {
    pub price: f64,
}
