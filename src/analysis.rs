//! This module contains the per-symbol analysis pipeline, the batch run that
//! folds its outcomes into a portfolio summary, and the two file-to-file jobs
//! built on them.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, anyhow};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::advice::{Advice, Alert, AlertThresholds, LiveAdvice};
use crate::exchange_rate::{self, ExchangeRateSource};
use crate::forecast::{self, ForecastAnchor, ForecastPoint};
use crate::indicators::{self, RSI_PERIOD};
use crate::live_quote::{CapitalClient, LiveQuoteSource};
use crate::portfolio::{self, PortfolioEntry, PortfolioRow};
use crate::price_history::{PriceHistorySource, PriceSeries};
use crate::profit::ProfitEstimate;
use crate::report::{self, DashboardTable, RunSnapshot};
use crate::settings::Settings;
use crate::storage_utils::AsyncStorageManager;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisSettings {
    pub forecast_days: u32,
    pub min_data_points: usize,
    pub anchor: ForecastAnchor,
    pub thresholds: AlertThresholds,
    pub use_live_price: bool,
}

impl AnalysisSettings {
    pub fn new(settings: &Settings, anchor: ForecastAnchor) -> Self {
        Self {
            forecast_days: settings.forecast_days,
            min_data_points: settings.min_data_points,
            anchor,
            thresholds: settings.thresholds,
            use_live_price: settings.use_live_price,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Yahoo,
    Capital,
    YahooFallback,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            DataSource::Yahoo => "Yahoo",
            DataSource::Capital => "Capital.com",
            DataSource::YahooFallback => "Yahoo (fallback)",
        })
    }
}

/// Everything computed for one symbol in one run. Prices are in the base currency.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub symbol: String,
    pub investment: f64,
    pub latest_rsi: f64,
    pub advice: Advice,
    pub latest_price: f64,
    pub shares: u64,
    pub best_sell_date: NaiveDate,
    pub best_sell_price: f64,
    pub estimated_profit: f64,
    pub data_source: DataSource,
    pub live_advice: LiveAdvice,
    pub alert: Alert,
    pub forecast: Vec<ForecastPoint>,
}

/// A finished analysis together with the bars it was computed from.
#[derive(Debug, Clone)]
pub struct SymbolAnalysis {
    pub result: AnalysisResult,
    pub series: PriceSeries,
}

/// Why a symbol produced no result. Covers failed or empty history downloads
/// as well as series too short to analyze; either way the symbol is left out.
#[derive(Debug, Clone, PartialEq)]
pub struct Skip(pub String);

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum SymbolOutcome {
    Analyzed(AnalysisResult),
    Skipped {
        line: usize,
        symbol: Option<String>,
        reason: String,
    },
}

/// Aggregates over the analyzed symbols of one run.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PortfolioSummary {
    pub buy: usize,
    pub hold: usize,
    pub sell: usize,
    pub total_investment: f64,
    pub total_profit: f64,
    rsi_sum: f64,
}

impl PortfolioSummary {
    pub fn record(&mut self, result: &AnalysisResult) {
        match result.advice {
            Advice::Buy => self.buy += 1,
            Advice::Hold => self.hold += 1,
            Advice::Sell => self.sell += 1,
        }
        self.total_investment += result.investment;
        self.total_profit += result.estimated_profit;
        self.rsi_sum += result.latest_rsi;
    }

    pub fn count(&self, advice: Advice) -> usize {
        match advice {
            Advice::Buy => self.buy,
            Advice::Hold => self.hold,
            Advice::Sell => self.sell,
        }
    }

    pub fn analyzed(&self) -> usize {
        self.buy + self.hold + self.sell
    }

    pub fn average_rsi(&self) -> Option<f64> {
        let n = self.analyzed();
        (n > 0).then(|| self.rsi_sum / n as f64)
    }
}

/// State owned by the batch orchestrator for a single run.
#[derive(Debug, Default)]
pub struct RunContext {
    pub outcomes: Vec<SymbolOutcome>,
    pub summary: PortfolioSummary,
}

impl RunContext {
    pub fn push(&mut self, outcome: SymbolOutcome) {
        if let SymbolOutcome::Analyzed(result) = &outcome {
            self.summary.record(result);
        }
        self.outcomes.push(outcome);
    }

    #[cfg(test)]
    pub fn results(&self) -> impl Iterator<Item = &AnalysisResult> {
        self.outcomes.iter().filter_map(|o| match o {
            SymbolOutcome::Analyzed(r) => Some(r),
            _ => None,
        })
    }
}

pub struct Sources<'a> {
    pub history: &'a dyn PriceHistorySource,
    pub live: Option<&'a dyn LiveQuoteSource>,
}

async fn resolve_latest_price(
    symbol: &str,
    history_close: f64,
    settings: &AnalysisSettings,
    sources: &Sources<'_>,
) -> (f64, DataSource) {
    if !settings.use_live_price {
        return (history_close, DataSource::Yahoo);
    }
    let Some(live) = sources.live else {
        warn!(symbol, "live price requested but no brokerage credentials configured");
        return (history_close, DataSource::YahooFallback);
    };
    match live.latest_bid(symbol).await {
        Ok(bid) if bid.is_finite() && bid > 0.0 => (bid, DataSource::Capital),
        Ok(bid) => {
            warn!(symbol, bid, "unusable live bid, using history close");
            (history_close, DataSource::YahooFallback)
        }
        Err(e) => {
            warn!(symbol, error = %e, "live quote failed, using history close");
            (history_close, DataSource::YahooFallback)
        }
    }
}

/// Runs fetch, RSI, advice, forecast and profit for one row.
pub async fn analyze_symbol(
    row: &PortfolioRow,
    settings: &AnalysisSettings,
    sources: &Sources<'_>,
    currency_rate: f64,
    today: NaiveDate,
) -> Result<SymbolAnalysis, Skip> {
    let symbol = row.symbol.as_str();

    let series = sources
        .history
        .daily_history(symbol, row.window_days)
        .await
        .map_err(|e| Skip(format!("no price history: {}", e)))?;

    if series.len() < settings.min_data_points {
        return Err(Skip(format!(
            "only {} data points, need {}",
            series.len(),
            settings.min_data_points
        )));
    }

    let latest_rsi = indicators::latest_rsi(series.bars(), RSI_PERIOD).ok_or_else(|| {
        Skip(format!(
            "{} closes are not enough for RSI({})",
            series.len(),
            RSI_PERIOD
        ))
    })?;
    let advice = Advice::from_rsi(latest_rsi);

    let history_close = series
        .latest_close()
        .ok_or_else(|| Skip("no closing price".into()))?;
    let (latest_price_usd, data_source) =
        resolve_latest_price(symbol, history_close, settings, sources).await;

    let forecast = forecast::forecast(&series, settings.forecast_days, settings.anchor, today)
        .ok_or_else(|| Skip("forecast unavailable".into()))?;

    let estimate = ProfitEstimate::compute(
        row.investment,
        latest_price_usd,
        forecast.best_sell_price,
        currency_rate,
    )
    .map_err(|e| Skip(e.to_string()))?;

    let forecast = forecast.scaled(currency_rate);
    let profit = estimate.estimated_profit;

    let result = AnalysisResult {
        symbol: row.symbol.clone(),
        investment: row.investment,
        latest_rsi,
        advice,
        latest_price: estimate.latest_price,
        shares: estimate.shares,
        best_sell_date: forecast.best_sell_date,
        best_sell_price: forecast.best_sell_price,
        estimated_profit: profit,
        data_source,
        live_advice: LiveAdvice::classify(latest_rsi, profit),
        alert: Alert::classify(latest_rsi, profit, &settings.thresholds),
        forecast: forecast.points,
    };

    Ok(SymbolAnalysis { result, series })
}

/// Processes every entry in order, one symbol at a time.
pub async fn run_batch(
    entries: &[PortfolioEntry],
    settings: &AnalysisSettings,
    sources: &Sources<'_>,
    currency_rate: f64,
    today: NaiveDate,
) -> RunContext {
    let mut ctx = RunContext::default();

    for entry in entries {
        let row = match &entry.row {
            Ok(row) => row,
            Err(issue) => {
                warn!(line = entry.line, %issue, "skipping input row");
                ctx.push(SymbolOutcome::Skipped {
                    line: entry.line,
                    symbol: None,
                    reason: issue.to_string(),
                });
                continue;
            }
        };

        info!(symbol = %row.symbol, days = row.window_days, "processing");
        let outcome = match analyze_symbol(row, settings, sources, currency_rate, today).await {
            Ok(analysis) => SymbolOutcome::Analyzed(analysis.result),
            Err(Skip(reason)) => {
                warn!(symbol = %row.symbol, %reason, "skipping symbol");
                SymbolOutcome::Skipped {
                    line: entry.line,
                    symbol: Some(row.symbol.clone()),
                    reason,
                }
            }
        };
        ctx.push(outcome);
    }

    info!(
        analyzed = ctx.summary.analyzed(),
        total = entries.len(),
        "batch finished"
    );
    ctx
}

/// Capital.com client when live prices are enabled and a key is configured.
pub fn brokerage(settings: &Settings) -> Option<CapitalClient> {
    if !settings.use_live_price {
        return None;
    }
    let client = settings.capital_credentials().map(CapitalClient::new);
    if client.is_none() {
        warn!("Use Live Price is set but no Capital API key is configured");
    }
    client
}

/// Files and overrides for one multi-symbol run.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub input: PathBuf,
    pub settings: PathBuf,
    pub dashboard: PathBuf,
    pub storage_dir: PathBuf,
    pub anchor: Option<ForecastAnchor>,
}

/// Runs the multi-symbol pipeline:
/// 1. Reads the input table and resolves the anchor and currency rate.
/// 2. Analyzes every row against `sources`.
/// 3. Writes the Dashboard and the JSON snapshot.
pub async fn run_analysis_pipeline(
    job: &BatchJob,
    settings: &Settings,
    sources: &Sources<'_>,
    rates: &dyn ExchangeRateSource,
    today: NaiveDate,
) -> anyhow::Result<RunSnapshot> {
    let entries = portfolio::load_portfolio(&job.input)?;
    let anchor = settings.anchor_or(job.anchor, ForecastAnchor::CurrentDate);
    info!(rows = entries.len(), %anchor, currency = %settings.base_currency, "starting batch");

    let rate = exchange_rate::rate_or_default(rates, &settings.base_currency).await;
    let analysis_settings = AnalysisSettings::new(settings, anchor);
    let ctx = run_batch(&entries, &analysis_settings, sources, rate, today).await;

    report::save_dashboard(&job.dashboard, &ctx)?;
    info!(path = %job.dashboard.display(), "dashboard written");

    let snapshot = RunSnapshot::new(&ctx, settings, rate, anchor);
    let storage = AsyncStorageManager::new(&job.storage_dir).await?;
    report::save_snapshot(&storage, &snapshot).await?;
    Ok(snapshot)
}

/// Files and overrides for a single-symbol run.
#[derive(Debug, Clone)]
pub struct SingleJob {
    pub input: PathBuf,
    pub output: PathBuf,
    /// 1-based data row; the first complete row when absent.
    pub row: Option<usize>,
    pub anchor: Option<ForecastAnchor>,
}

fn pick_row(entries: &[PortfolioEntry], row: Option<usize>) -> anyhow::Result<&PortfolioRow> {
    match row {
        Some(n) => {
            let entry = n
                .checked_sub(1)
                .and_then(|i| entries.get(i))
                .ok_or_else(|| anyhow!("input table has no data row {}", n))?;
            entry
                .row
                .as_ref()
                .map_err(|issue| anyhow!("data row {} is unusable: {}", n, issue))
        }
        None => entries
            .iter()
            .find_map(|e| e.row.as_ref().ok())
            .ok_or_else(|| anyhow!("input table has no complete row")),
    }
}

/// Analyzes one row and writes its report table.
pub async fn run_single_pipeline(
    job: &SingleJob,
    settings: &Settings,
    sources: &Sources<'_>,
    rates: &dyn ExchangeRateSource,
    today: NaiveDate,
) -> anyhow::Result<SymbolAnalysis> {
    let entries = portfolio::load_portfolio(&job.input)?;
    let row = pick_row(&entries, job.row)?;
    let anchor = settings.anchor_or(job.anchor, ForecastAnchor::LastObservedDate);

    let rate = exchange_rate::rate_or_default(rates, &settings.base_currency).await;
    let analysis_settings = AnalysisSettings::new(settings, anchor);
    let analysis = analyze_symbol(row, &analysis_settings, sources, rate, today)
        .await
        .map_err(|reason| anyhow!("{} skipped: {}", row.symbol, reason))?;

    let file = std::fs::File::create(&job.output)
        .with_context(|| format!("creating report {}", job.output.display()))?;
    report::write_symbol_report(file, &analysis, rate)?;
    info!(symbol = %row.symbol, path = %job.output.display(), "report written");

    Ok(analysis)
}

/// Dashboard rows for a finished run, for callers that never touch the file.
pub fn dashboard_of(snapshot: &RunSnapshot) -> DashboardTable {
    DashboardTable::from_outcomes(&snapshot.outcomes, &snapshot.summary)
}
