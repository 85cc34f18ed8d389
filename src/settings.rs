//! Key/value settings table and the secrets that live in the environment.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::advice::AlertThresholds;
use crate::forecast::{DEFAULT_HORIZON_DAYS, ForecastAnchor};
use crate::live_quote::CapitalCredentials;

pub const DEFAULT_MIN_DATA_POINTS: usize = 10;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    pub base_currency: String,
    pub currency_symbol: String,
    pub forecast_days: u32,
    pub min_data_points: usize,
    pub thresholds: AlertThresholds,
    pub use_live_price: bool,
    pub capital_api_key: Option<String>,
    /// Only set when the table names one; commands supply their own default.
    pub forecast_anchor: Option<ForecastAnchor>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_currency: "USD".to_string(),
            currency_symbol: "$".to_string(),
            forecast_days: DEFAULT_HORIZON_DAYS,
            min_data_points: DEFAULT_MIN_DATA_POINTS,
            thresholds: AlertThresholds::default(),
            use_live_price: false,
            capital_api_key: None,
            forecast_anchor: None,
        }
    }
}

fn parse_number(key: &str, raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| anyhow!("setting '{}' is not a number: '{}'", key, raw))
}

fn parse_count(key: &str, raw: &str) -> Result<u32> {
    let value = parse_number(key, raw)?;
    if value < 1.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return Err(anyhow!("setting '{}' must be a positive whole number: '{}'", key, raw));
    }
    Ok(value as u32)
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "yes" | "y" | "true" => Ok(true),
        "no" | "n" | "false" => Ok(false),
        _ => Err(anyhow!("setting '{}' must be Yes or No: '{}'", key, raw)),
    }
}

impl Settings {
    /// Builds settings from key/value pairs; blank values keep the default.
    pub fn from_pairs(pairs: HashMap<String, String>) -> Result<Self> {
        let mut settings = Settings::default();
        let get = |key: &str| pairs.get(key).map(String::as_str).filter(|v| !v.is_empty());

        if let Some(v) = get("Base Currency") {
            settings.base_currency = v.to_uppercase();
        }
        if let Some(v) = get("Currency Symbol") {
            settings.currency_symbol = v.to_string();
        }
        if let Some(v) = get("Forecast Days") {
            settings.forecast_days = parse_count("Forecast Days", v)?;
        }
        if let Some(v) = get("Minimum Data Points") {
            settings.min_data_points = parse_count("Minimum Data Points", v)? as usize;
        }
        if let Some(v) = get("RSI Alert Threshold") {
            settings.thresholds.rsi_alert = parse_number("RSI Alert Threshold", v)?;
        }
        if let Some(v) = get("Profit Alert Minimum") {
            settings.thresholds.profit_alert_minimum = parse_number("Profit Alert Minimum", v)?;
        }
        if let Some(v) = get("Profit Target Threshold") {
            settings.thresholds.profit_target = parse_number("Profit Target Threshold", v)?;
        }
        if let Some(v) = get("Use Live Price") {
            settings.use_live_price = parse_flag("Use Live Price", v)?;
        }
        if let Some(v) = get("Capital API Key") {
            settings.capital_api_key = Some(v.to_string());
        }
        if let Some(v) = get("Forecast Anchor") {
            settings.forecast_anchor = Some(v.parse().map_err(|e: String| anyhow!(e))?);
        }

        Ok(settings)
    }

    /// CLI override, then the table, then the command's own default.
    pub fn anchor_or(
        &self,
        cli: Option<ForecastAnchor>,
        fallback: ForecastAnchor,
    ) -> ForecastAnchor {
        cli.or(self.forecast_anchor).unwrap_or(fallback)
    }

    pub fn capital_credentials(&self) -> Option<CapitalCredentials> {
        let api_key = self
            .capital_api_key
            .clone()
            .or_else(|| std::env::var("CAPITAL_API_KEY").ok())
            .filter(|k| !k.is_empty())?;
        Some(CapitalCredentials {
            api_key,
            identifier: std::env::var("CAPITAL_IDENTIFIER").ok(),
            password: std::env::var("CAPITAL_PASSWORD").ok(),
        })
    }
}

/// Reads a two-column `Setting,Value` table.
pub fn read_settings<R: Read>(reader: R) -> Result<Settings> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut pairs = HashMap::new();
    for record in rdr.records() {
        let record = record?;
        if let Some(key) = record.get(0).filter(|k| !k.is_empty()) {
            pairs.insert(key.to_string(), record.get(1).unwrap_or_default().to_string());
        }
    }
    Settings::from_pairs(pairs)
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening settings table {}", path.display()))?;
    read_settings(file).with_context(|| format!("parsing settings table {}", path.display()))
}
