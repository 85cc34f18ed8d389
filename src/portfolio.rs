//! Input table: one row per symbol with its history window and investment.

use std::fmt;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const SYMBOL_COLUMN: &str = "Stock Symbol";
pub const DAYS_COLUMN: &str = "Days of Data";
pub const INVESTMENT_COLUMN: &str = "Investment (USD)";

#[derive(Deserialize, Debug)]
struct RawRow {
    #[serde(rename = "Stock Symbol")]
    symbol: Option<String>,
    #[serde(rename = "Days of Data")]
    days: Option<String>,
    #[serde(rename = "Investment (USD)")]
    investment: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PortfolioRow {
    pub symbol: String,
    pub window_days: u32,
    pub investment: f64,
}

/// Why an input row cannot be analyzed.
#[derive(Debug, Clone, PartialEq)]
pub enum RowIssue {
    Missing(Vec<&'static str>),
    Invalid { column: &'static str, value: String },
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RowIssue::Missing(columns) => write!(f, "missing {}", columns.join(", ")),
            RowIssue::Invalid { column, value } => write!(f, "invalid {} '{}'", column, value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioEntry {
    /// Spreadsheet row number, header being row 1.
    pub line: usize,
    pub row: Result<PortfolioRow, RowIssue>,
}

fn present(cell: Option<String>) -> Option<String> {
    cell.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_window(raw: &str) -> Option<u32> {
    let days: f64 = raw.parse().ok()?;
    (days.is_finite() && days >= 1.0 && days.fract() == 0.0 && days <= u32::MAX as f64)
        .then_some(days as u32)
}

fn parse_investment(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',' && *c != '$').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite() && *v > 0.0)
}

impl RawRow {
    fn validate(self) -> Result<PortfolioRow, RowIssue> {
        let symbol = present(self.symbol);
        let days = present(self.days);
        let investment = present(self.investment);

        let (Some(symbol), Some(days), Some(investment)) = (&symbol, &days, &investment) else {
            let missing = [
                (SYMBOL_COLUMN, symbol.is_none()),
                (DAYS_COLUMN, days.is_none()),
                (INVESTMENT_COLUMN, investment.is_none()),
            ]
            .into_iter()
            .filter_map(|(column, absent)| absent.then_some(column))
            .collect();
            return Err(RowIssue::Missing(missing));
        };

        let window_days = parse_window(days).ok_or_else(|| RowIssue::Invalid {
            column: DAYS_COLUMN,
            value: days.clone(),
        })?;
        let investment = parse_investment(investment).ok_or_else(|| RowIssue::Invalid {
            column: INVESTMENT_COLUMN,
            value: investment.clone(),
        })?;

        Ok(PortfolioRow {
            symbol: symbol.to_uppercase(),
            window_days,
            investment,
        })
    }
}

pub fn read_portfolio<R: Read>(reader: R) -> Result<Vec<PortfolioEntry>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    for column in [SYMBOL_COLUMN, DAYS_COLUMN, INVESTMENT_COLUMN] {
        if !headers.iter().any(|h| h == column) {
            bail!("input table has no '{}' column", column);
        }
    }

    let mut entries = Vec::new();
    for (index, record) in rdr.deserialize::<RawRow>().enumerate() {
        let raw = record.with_context(|| format!("reading input row {}", index + 2))?;
        entries.push(PortfolioEntry {
            line: index + 2,
            row: raw.validate(),
        });
    }
    Ok(entries)
}

pub fn load_portfolio(path: &Path) -> Result<Vec<PortfolioEntry>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening input table {}", path.display()))?;
    read_portfolio(file)
}
