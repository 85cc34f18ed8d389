//! Daily price history: the series type the analysis runs on and the
//! market-data source that fills it.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use yahoo_finance_api as yahoo;

use crate::error::FetchError;

const DAILY_INTERVAL: &str = "1d";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl PriceBar {
    /// A bar where only the close is known.
    #[cfg(test)]
    pub fn from_close(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
        }
    }
}

impl ta::Close for PriceBar {
    fn close(&self) -> f64 {
        self.close
    }
}

/// Bars ordered by ascending date with no duplicate dates and finite closes.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PriceSeries {
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Normalizes raw bars: drops non-finite closes, sorts by date and keeps
    /// the last bar seen for any repeated date.
    pub fn new(mut bars: Vec<PriceBar>) -> Self {
        bars.retain(|b| b.close.is_finite());
        // stable sort keeps arrival order within a date, so the later bar wins below
        bars.sort_by_key(|b| b.date);
        let mut deduped: Vec<PriceBar> = Vec::with_capacity(bars.len());
        for bar in bars {
            match deduped.last_mut() {
                Some(last) if last.date == bar.date => *last = bar,
                _ => deduped.push(bar),
            }
        }
        Self { bars: deduped }
    }

    #[cfg(test)]
    pub fn from_closes<I>(points: I) -> Self
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        Self::new(
            points
                .into_iter()
                .map(|(date, close)| PriceBar::from_close(date, close))
                .collect(),
        )
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    pub fn latest_close(&self) -> Option<f64> {
        self.last().map(|b| b.close)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.last().map(|b| b.date)
    }

    /// The most recent `n` bars (or all of them when shorter).
    pub fn tail(&self, n: usize) -> &[PriceBar] {
        let start = self.bars.len().saturating_sub(n);
        &self.bars[start..]
    }
}

/// Source of daily bars for a symbol over a trailing window of days.
#[async_trait]
pub trait PriceHistorySource: Send + Sync {
    async fn daily_history(&self, symbol: &str, days: u32) -> Result<PriceSeries, FetchError>;

    /// Latest close from a one-day request.
    async fn latest_close(&self, symbol: &str) -> Result<f64, FetchError> {
        self.daily_history(symbol, 1)
            .await?
            .latest_close()
            .ok_or_else(|| FetchError::Empty(symbol.to_string()))
    }
}

/// Trading day of a bar timestamp, read in the exchange's timezone.
fn bar_date(timestamp: i64, gmt_offset: i32) -> Option<NaiveDate> {
    let offset = FixedOffset::east_opt(gmt_offset)?;
    let at = DateTime::from_timestamp(timestamp, 0)?;
    Some(at.with_timezone(&offset).date_naive())
}

/// Yahoo Finance chart endpoint, adjusted closes.
pub struct YahooHistory {
    connector: yahoo::YahooConnector,
}

impl YahooHistory {
    pub fn new() -> Result<Self, FetchError> {
        let connector = yahoo::YahooConnector::new()
            .map_err(|e| FetchError::Transport(format!("Yahoo Finance connector: {}", e)))?;
        Ok(Self { connector })
    }

    fn quote_to_bar(quote: &yahoo::Quote, gmt_offset: i32) -> Option<PriceBar> {
        let date = bar_date(quote.timestamp as i64, gmt_offset)?;
        Some(PriceBar {
            date,
            open: quote.open,
            high: quote.high,
            low: quote.low,
            close: quote.adjclose,
        })
    }
}

#[async_trait]
impl PriceHistorySource for YahooHistory {
    async fn daily_history(&self, symbol: &str, days: u32) -> Result<PriceSeries, FetchError> {
        let range = format!("{}d", days.max(1));
        info!(symbol, %range, "fetching daily history");

        let response = self
            .connector
            .get_quote_range(symbol, DAILY_INTERVAL, &range)
            .await
            .map_err(|e| FetchError::Transport(format!("{}: {}", symbol, e)))?;

        let quotes = response
            .quotes()
            .map_err(|e| FetchError::Malformed(format!("{}: {}", symbol, e)))?;

        if quotes.is_empty() {
            warn!(symbol, "no bars returned");
            return Err(FetchError::Empty(symbol.to_string()));
        }

        let gmt_offset = match response.metadata() {
            Ok(meta) => meta.gmtoffset,
            Err(e) => {
                warn!(symbol, error = %e, "no exchange metadata, dating bars in UTC");
                0
            }
        };
        let bars = quotes
            .iter()
            .filter_map(|q| Self::quote_to_bar(q, gmt_offset))
            .collect();
        let series = PriceSeries::new(bars);
        debug!(symbol, bars = series.len(), "history received");
        Ok(series)
    }
}
