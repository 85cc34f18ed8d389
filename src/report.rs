//! Tabular output: the per-symbol report, the Dashboard table and the JSON run
//! snapshot. Prices are rounded to cents here and nowhere else.

use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::advice::{Advice, Alert, LiveAdvice};
use crate::analysis::{DataSource, PortfolioSummary, RunContext, SymbolAnalysis, SymbolOutcome};
use crate::forecast::ForecastAnchor;
use crate::settings::Settings;
use crate::storage_utils::AsyncStorageManager;

pub const DASHBOARD_HEADERS: [&str; 5] = ["Stock Symbol", "Advice", "Profit", "RSI", "Alert"];
pub const SUMMARY_HEADERS: [&str; 2] = ["Advice", "Count"];
pub const CHART_HISTORY_DAYS: usize = 30;

const SNAPSHOT_NAME: &str = "results";

pub fn round2(value: f64) -> f64 {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded == 0.0 { 0.0 } else { rounded }
}

fn cents(value: f64) -> String {
    format!("{:.2}", round2(value))
}

// --- Lenient numeric cells ---

struct LenientF64Visitor;

impl<'de> Visitor<'de> for LenientF64Visitor {
    type Value = Option<f64>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a number, or text standing in for a missing value")
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
        Ok(v.is_finite().then_some(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        // hand-entered notes and blanks read as absent
        Ok(v.trim().parse::<f64>().ok().filter(|n| n.is_finite()))
    }

    fn visit_bool<E>(self, _v: bool) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }
}

fn deserialize_f64_lenient<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientF64Visitor)
}

// --- Dashboard table ---

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct DashboardRow {
    #[serde(rename = "Stock Symbol")]
    pub symbol: String,
    #[serde(rename = "Advice")]
    pub advice: String,
    #[serde(rename = "Profit", deserialize_with = "deserialize_f64_lenient", default)]
    pub profit: Option<f64>,
    #[serde(rename = "RSI", deserialize_with = "deserialize_f64_lenient", default)]
    pub rsi: Option<f64>,
    #[serde(rename = "Alert", default)]
    pub alert: String,
}

impl DashboardRow {
    /// `None` when the cell holds something other than a recommendation.
    pub fn parsed_advice(&self) -> Option<Advice> {
        self.advice.parse().ok()
    }

    pub fn parsed_alert(&self) -> Option<Alert> {
        self.alert.parse().ok()
    }

    pub fn live_advice(&self) -> Option<LiveAdvice> {
        let rsi = self.rsi?;
        Some(LiveAdvice::classify(rsi, self.profit.unwrap_or(0.0)))
    }

    pub fn purchased(&self) -> bool {
        self.parsed_advice().is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardTable {
    pub rows: Vec<DashboardRow>,
    pub counts: Vec<(Advice, usize)>,
}

impl DashboardTable {
    pub fn count(&self, advice: Advice) -> usize {
        self.counts
            .iter()
            .find(|(a, _)| *a == advice)
            .map_or(0, |(_, n)| *n)
    }

    pub fn total_counted(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }

    /// Count and percentage share per advice, in Buy/Hold/Sell order.
    pub fn distribution(&self) -> Vec<(Advice, usize, f64)> {
        let total = self.total_counted();
        Advice::ALL
            .iter()
            .map(|&advice| {
                let count = self.count(advice);
                let pct = if total == 0 {
                    0.0
                } else {
                    count as f64 * 100.0 / total as f64
                };
                (advice, count, pct)
            })
            .collect()
    }
}

impl DashboardTable {
    /// Analyzed symbols in input order; skipped rows are left out.
    pub fn from_run(ctx: &RunContext) -> Self {
        Self::from_outcomes(&ctx.outcomes, &ctx.summary)
    }

    pub fn from_outcomes(outcomes: &[SymbolOutcome], summary: &PortfolioSummary) -> Self {
        let rows = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                SymbolOutcome::Analyzed(r) => Some(DashboardRow {
                    symbol: r.symbol.clone(),
                    advice: r.advice.to_string(),
                    profit: Some(round2(r.estimated_profit)),
                    rsi: Some(round2(r.latest_rsi)),
                    alert: r.alert.to_string(),
                }),
                SymbolOutcome::Skipped { .. } => None,
            })
            .collect();
        let counts = Advice::ALL
            .iter()
            .map(|&advice| (advice, summary.count(advice)))
            .collect();
        Self { rows, counts }
    }
}

/// Writes the Dashboard: the symbol rows, a blank row, then the advice counts.
pub fn write_dashboard<W: Write>(writer: W, table: &DashboardTable) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(writer);

    wtr.write_record(DASHBOARD_HEADERS)?;
    for row in &table.rows {
        wtr.write_record([
            row.symbol.clone(),
            row.advice.clone(),
            row.profit.map(cents).unwrap_or_default(),
            row.rsi.map(cents).unwrap_or_default(),
            row.alert.clone(),
        ])?;
    }

    wtr.write_record([""; 5])?;
    wtr.write_record(SUMMARY_HEADERS)?;
    for advice in Advice::ALL {
        wtr.write_record([advice.to_string(), table.count(advice).to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn read_dashboard<R: Read>(reader: R) -> Result<DashboardTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = rdr.records();

    let headers = match records.next() {
        Some(record) => record?,
        None => bail!("dashboard table is empty"),
    };
    for column in DASHBOARD_HEADERS {
        if !headers.iter().any(|h| h == column) {
            bail!("dashboard table has no '{}' column", column);
        }
    }

    let mut table = DashboardTable::default();
    let mut in_summary = false;
    for record in records {
        let record = record?;
        let blank = record.iter().all(str::is_empty);

        if !in_summary {
            if blank || record.get(0) == Some(SUMMARY_HEADERS[0]) {
                in_summary = true;
                continue;
            }
            let line = record.position().map_or(0, |p| p.line());
            let row: DashboardRow = record
                .deserialize(Some(&headers))
                .with_context(|| format!("reading dashboard line {}", line))?;
            table.rows.push(row);
            continue;
        }

        if blank || record.get(0) == Some(SUMMARY_HEADERS[0]) {
            continue;
        }
        let advice = record.get(0).and_then(|a| a.parse::<Advice>().ok());
        let count = record.get(1).and_then(|c| c.parse::<usize>().ok());
        if let (Some(advice), Some(count)) = (advice, count) {
            table.counts.push((advice, count));
        }
    }
    Ok(table)
}

pub fn save_dashboard(path: &Path, ctx: &RunContext) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating dashboard {}", path.display()))?;
    write_dashboard(file, &DashboardTable::from_run(ctx))
}

pub fn load_dashboard(path: &Path) -> Result<DashboardTable> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening dashboard {}", path.display()))?;
    read_dashboard(file)
}

// --- Single-symbol report ---

/// Summary row, forecast table and the actual-vs-forecast chart series.
pub fn write_symbol_report<W: Write>(
    writer: W,
    analysis: &SymbolAnalysis,
    currency_rate: f64,
) -> Result<()> {
    let r = &analysis.result;
    let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(writer);

    wtr.write_record([
        "Latest RSI",
        "Advice",
        "Latest Price",
        "Buyable Shares",
        "Forecasted Best Sell Date",
        "Forecasted Sell Price",
        "Estimated Profit",
    ])?;
    wtr.write_record([
        cents(r.latest_rsi),
        r.advice.to_string(),
        cents(r.latest_price),
        r.shares.to_string(),
        r.best_sell_date.format("%Y-%m-%d").to_string(),
        cents(r.best_sell_price),
        cents(r.estimated_profit),
    ])?;

    wtr.write_record([""; 3])?;
    wtr.write_record(["Forecast Date", "Predicted Price"])?;
    for point in &r.forecast {
        wtr.write_record([point.date.format("%Y-%m-%d").to_string(), cents(point.price)])?;
    }

    wtr.write_record([""; 3])?;
    wtr.write_record(["Chart Date", "Actual Price", "Forecasted Price"])?;
    for bar in analysis.series.tail(CHART_HISTORY_DAYS) {
        wtr.write_record([
            bar.date.format("%Y-%m-%d").to_string(),
            cents(bar.close * currency_rate),
            String::new(),
        ])?;
    }
    for point in &r.forecast {
        wtr.write_record([
            point.date.format("%Y-%m-%d").to_string(),
            String::new(),
            cents(point.price),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

// --- Run snapshot ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    pub generated_at: DateTime<Utc>,
    pub base_currency: String,
    pub currency_symbol: String,
    pub currency_rate: f64,
    pub forecast_anchor: ForecastAnchor,
    pub outcomes: Vec<SymbolOutcome>,
    pub summary: PortfolioSummary,
    pub average_rsi: Option<f64>,
}

impl RunSnapshot {
    pub fn new(
        ctx: &RunContext,
        settings: &Settings,
        currency_rate: f64,
        forecast_anchor: ForecastAnchor,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            base_currency: settings.base_currency.clone(),
            currency_symbol: settings.currency_symbol.clone(),
            currency_rate,
            forecast_anchor,
            outcomes: ctx.outcomes.clone(),
            summary: ctx.summary.clone(),
            average_rsi: ctx.summary.average_rsi(),
        }
    }

    pub fn data_sources(&self) -> HashMap<String, DataSource> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                SymbolOutcome::Analyzed(r) => Some((r.symbol.clone(), r.data_source)),
                _ => None,
            })
            .collect()
    }
}

pub async fn save_snapshot(storage: &AsyncStorageManager, snapshot: &RunSnapshot) -> Result<()> {
    storage.save(SNAPSHOT_NAME, snapshot).await
}

pub async fn load_snapshot(storage: &AsyncStorageManager) -> Result<RunSnapshot> {
    storage.load(SNAPSHOT_NAME).await
}

/// Reads the last snapshot under `dir` for viewers. The directory is never
/// created here.
pub async fn find_snapshot(dir: &Path) -> Result<RunSnapshot> {
    let storage = AsyncStorageManager::existing(dir)
        .ok_or_else(|| anyhow!("no storage directory at {}", dir.display()))?;
    load_snapshot(&storage).await
}
