use serde::{Deserialize, Serialize};

use crate::error::InvalidPriceError;

/// Whole shares affordable with `investment` at `price`, truncated toward zero.
pub fn affordable_shares(investment: f64, price: f64) -> Result<u64, InvalidPriceError> {
    if !(price.is_finite() && price > 0.0) {
        return Err(InvalidPriceError { price });
    }
    Ok((investment / price).floor().max(0.0) as u64)
}

/// Gain (or loss, when negative) from selling `shares` at the forecast peak.
pub fn estimated_profit(latest_price: f64, best_sell_price: f64, shares: u64) -> f64 {
    (best_sell_price - latest_price) * shares as f64
}

/// Position sizing and profit, with prices quoted in USD and reported in the
/// base currency.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ProfitEstimate {
    pub shares: u64,
    pub latest_price: f64,
    pub best_sell_price: f64,
    pub estimated_profit: f64,
}

impl ProfitEstimate {
    /// Shares are sized in USD, the currency of the investment column; prices
    /// and profit are then expressed in the base currency via `currency_rate`.
    pub fn compute(
        investment_usd: f64,
        latest_price_usd: f64,
        best_sell_price_usd: f64,
        currency_rate: f64,
    ) -> Result<Self, InvalidPriceError> {
        let shares = affordable_shares(investment_usd, latest_price_usd)?;
        let latest_price = latest_price_usd * currency_rate;
        let best_sell_price = best_sell_price_usd * currency_rate;
        Ok(Self {
            shares,
            latest_price,
            best_sell_price,
            estimated_profit: estimated_profit(latest_price, best_sell_price, shares),
        })
    }
}
