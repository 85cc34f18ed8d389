use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::price_history::PriceSeries;

pub const DEFAULT_HORIZON_DAYS: u32 = 7;

/// Day the forecast window is counted from.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastAnchor {
    LastObservedDate,
    CurrentDate,
}

impl ForecastAnchor {
    pub fn resolve(&self, series: &PriceSeries, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            ForecastAnchor::LastObservedDate => series.last_date(),
            ForecastAnchor::CurrentDate => Some(today),
        }
    }
}

impl fmt::Display for ForecastAnchor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ForecastAnchor::LastObservedDate => "Last Observed Date",
            ForecastAnchor::CurrentDate => "Current Date",
        })
    }
}

impl FromStr for ForecastAnchor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "lastobserveddate" | "lastobserved" => Ok(ForecastAnchor::LastObservedDate),
            "currentdate" | "today" => Ok(ForecastAnchor::CurrentDate),
            _ => Err(format!("unknown forecast anchor '{}'", s)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    pub price: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Forecast {
    pub best_sell_date: NaiveDate,
    pub best_sell_price: f64,
    pub points: Vec<ForecastPoint>,
}

impl Forecast {
    /// Same dates, prices multiplied by `rate`.
    pub fn scaled(&self, rate: f64) -> Self {
        Self {
            best_sell_date: self.best_sell_date,
            best_sell_price: self.best_sell_price * rate,
            points: self
                .points
                .iter()
                .map(|p| ForecastPoint {
                    date: p.date,
                    price: p.price * rate,
                })
                .collect(),
        }
    }
}

/// Least-squares line `price = slope * ordinal + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearTrend {
    /// Closed-form fit on centered ordinals. A single point yields a flat line.
    pub fn fit(points: &[(f64, f64)]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

        let (sxy, sxx) = points.iter().fold((0.0, 0.0), |(sxy, sxx), (x, y)| {
            let dx = x - mean_x;
            (sxy + dx * (y - mean_y), sxx + dx * dx)
        });

        let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
        Some(Self {
            slope,
            intercept: mean_y - slope * mean_x,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Days since 0001-01-01, counting that day as 1.
pub fn ordinal(date: NaiveDate) -> f64 {
    date.num_days_from_ce() as f64
}

/// Fits the close-price trend and evaluates it on the `horizon` days after the anchor.
///
/// Ties between forecast days go to the earliest date.
pub fn forecast(
    series: &PriceSeries,
    horizon: u32,
    anchor: ForecastAnchor,
    today: NaiveDate,
) -> Option<Forecast> {
    if horizon == 0 {
        return None;
    }
    let observations: Vec<(f64, f64)> = series
        .bars()
        .iter()
        .map(|b| (ordinal(b.date), b.close))
        .collect();
    let trend = LinearTrend::fit(&observations)?;
    let start = anchor.resolve(series, today)?;

    let points: Vec<ForecastPoint> = (1..=u64::from(horizon))
        .filter_map(|offset| start.checked_add_days(Days::new(offset)))
        .map(|date| ForecastPoint {
            date,
            price: trend.predict(ordinal(date)),
        })
        .collect();

    let best = points.iter().fold(None::<&ForecastPoint>, |best, p| match best {
        Some(b) if p.price <= b.price => Some(b),
        _ => Some(p),
    })?;

    Some(Forecast {
        best_sell_date: best.date,
        best_sell_price: best.price,
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn linear_series(start: NaiveDate, closes: impl IntoIterator<Item = f64>) -> PriceSeries {
        PriceSeries::from_closes(
            closes
                .into_iter()
                .enumerate()
                .map(|(i, c)| (start + Days::new(i as u64), c)),
        )
    }

    #[test]
    fn ordinal_matches_proleptic_gregorian_count() {
        assert_eq!(ordinal(date(1, 1, 1)), 1.0);
        assert_eq!(ordinal(date(2024, 1, 1)), 738886.0);
    }

    #[test]
    fn linear_input_continues_exactly() {
        let start = date(2024, 1, 1);
        let series = linear_series(start, (0..30).map(|i| 100.0 + i as f64));
        let f = forecast(&series, 7, ForecastAnchor::LastObservedDate, date(2030, 1, 1)).unwrap();

        assert_eq!(f.points.len(), 7);
        for (k, point) in f.points.iter().enumerate() {
            assert_eq!(point.date, date(2024, 1, 30) + Days::new(k as u64 + 1));
            assert_relative_eq!(point.price, 130.0 + k as f64, epsilon = 1e-6);
        }
        assert_eq!(f.best_sell_date, date(2024, 2, 6));
        assert_relative_eq!(f.best_sell_price, 136.0, epsilon = 1e-6);
    }

    #[test]
    fn current_date_anchor_ignores_stale_data() {
        let series = linear_series(date(2024, 1, 1), (0..20).map(|i| 50.0 + 2.0 * i as f64));
        let today = date(2024, 3, 1);
        let f = forecast(&series, 3, ForecastAnchor::CurrentDate, today).unwrap();

        assert_eq!(f.points[0].date, date(2024, 3, 2));
        assert_eq!(f.best_sell_date, date(2024, 3, 4));
        // 2024-03-04 is 63 days after 2024-01-01
        assert_relative_eq!(f.best_sell_price, 50.0 + 2.0 * 63.0, epsilon = 1e-6);
    }

    #[test]
    fn last_observed_anchor_follows_series() {
        let series = linear_series(date(2024, 1, 1), (0..20).map(|i| 50.0 + i as f64));
        let f = forecast(&series, 2, ForecastAnchor::LastObservedDate, date(2024, 3, 1)).unwrap();
        assert_eq!(f.points[0].date, date(2024, 1, 21));
    }

    #[test]
    fn falling_trend_sells_first_day() {
        let series = linear_series(date(2024, 1, 1), (0..20).map(|i| 200.0 - i as f64));
        let f = forecast(&series, 7, ForecastAnchor::LastObservedDate, date(2024, 1, 1)).unwrap();
        assert_eq!(f.best_sell_date, date(2024, 1, 21));
    }

    #[test]
    fn flat_trend_ties_go_to_earliest() {
        let series = linear_series(date(2024, 1, 1), std::iter::repeat(42.0).take(15));
        let f = forecast(&series, 5, ForecastAnchor::LastObservedDate, date(2024, 1, 1)).unwrap();
        assert_eq!(f.best_sell_date, date(2024, 1, 16));
        assert_relative_eq!(f.best_sell_price, 42.0, epsilon = 1e-9);
    }

    #[test]
    fn gaps_in_dates_use_calendar_ordinals() {
        // weekend gap: the fit is against calendar days, not row index
        let series = PriceSeries::from_closes([
            (date(2024, 1, 5), 10.0),
            (date(2024, 1, 8), 13.0),
            (date(2024, 1, 9), 14.0),
        ]);
        let trend = LinearTrend::fit(
            &series
                .bars()
                .iter()
                .map(|b| (ordinal(b.date), b.close))
                .collect::<Vec<_>>(),
        )
        .unwrap();
        assert_relative_eq!(trend.slope, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn single_point_is_flat() {
        let trend = LinearTrend::fit(&[(5.0, 9.0)]).unwrap();
        assert_eq!(trend.slope, 0.0);
        assert_eq!(trend.predict(100.0), 9.0);
        assert!(LinearTrend::fit(&[]).is_none());
    }

    #[test]
    fn zero_horizon_or_empty_series() {
        let series = linear_series(date(2024, 1, 1), [1.0, 2.0]);
        assert!(forecast(&series, 0, ForecastAnchor::CurrentDate, date(2024, 1, 1)).is_none());
        assert!(
            forecast(&PriceSeries::default(), 7, ForecastAnchor::CurrentDate, date(2024, 1, 1))
                .is_none()
        );
    }

    #[test]
    fn scaling_keeps_dates() {
        let series = linear_series(date(2024, 1, 1), (0..10).map(|i| 10.0 + i as f64));
        let f = forecast(&series, 2, ForecastAnchor::LastObservedDate, date(2024, 1, 1)).unwrap();
        let scaled = f.scaled(3.0);
        assert_eq!(scaled.best_sell_date, f.best_sell_date);
        assert_relative_eq!(scaled.best_sell_price, f.best_sell_price * 3.0);
    }

    #[test]
    fn anchor_parses_settings_values() {
        assert_eq!(
            "Last Observed Date".parse::<ForecastAnchor>(),
            Ok(ForecastAnchor::LastObservedDate)
        );
        assert_eq!(
            "current-date".parse::<ForecastAnchor>(),
            Ok(ForecastAnchor::CurrentDate)
        );
        assert!("tomorrow".parse::<ForecastAnchor>().is_err());
    }
}
