use std::fmt;

use ta::errors::{Result as TaResult, TaError};
use ta::{Close, Next, Period, Reset};

pub const RSI_PERIOD: usize = 14;

/// Relative Strength Index with Wilder smoothing.
///
/// The first value is emitted once `period` price changes have been seen
/// (i.e. `period + 1` closes); the averages are seeded with the simple mean of
/// those changes and then smoothed with `alpha = 1 / period`.
#[derive(Debug, Clone)]
pub struct WilderRsi {
    period: usize,
    prev_close: Option<f64>,
    seen: usize,
    avg_gain: f64,
    avg_loss: f64,
}

impl WilderRsi {
    pub fn new(period: usize) -> TaResult<Self> {
        if period == 0 {
            return Err(TaError::InvalidParameter);
        }
        Ok(Self {
            period,
            prev_close: None,
            seen: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        })
    }

    fn value(&self) -> f64 {
        if self.avg_loss == 0.0 {
            return 100.0;
        }
        let rs = self.avg_gain / self.avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

impl Next<f64> for WilderRsi {
    type Output = Option<f64>;

    fn next(&mut self, close: f64) -> Self::Output {
        let Some(prev) = self.prev_close.replace(close) else {
            return None;
        };

        let change = close - prev;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);
        let n = self.period as f64;

        self.seen += 1;
        if self.seen <= self.period {
            self.avg_gain += gain / n;
            self.avg_loss += loss / n;
            if self.seen < self.period {
                return None;
            }
        } else {
            self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
            self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
        }

        Some(self.value())
    }
}

impl<T: Close> Next<&T> for WilderRsi {
    type Output = Option<f64>;

    fn next(&mut self, input: &T) -> Self::Output {
        self.next(input.close())
    }
}

impl Reset for WilderRsi {
    fn reset(&mut self) {
        self.prev_close = None;
        self.seen = 0;
        self.avg_gain = 0.0;
        self.avg_loss = 0.0;
    }
}

impl Period for WilderRsi {
    fn period(&self) -> usize {
        self.period
    }
}

impl Default for WilderRsi {
    fn default() -> Self {
        Self {
            period: RSI_PERIOD,
            prev_close: None,
            seen: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }
}

impl fmt::Display for WilderRsi {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RSI({})", self.period)
    }
}

/// RSI value aligned with every input close; `None` until defined.
pub fn rsi_series<T: Close>(bars: &[T], period: usize) -> Vec<Option<f64>> {
    let Ok(mut rsi) = WilderRsi::new(period) else {
        return vec![None; bars.len()];
    };
    bars.iter().map(|bar| rsi.next(bar)).collect()
}

/// Most recent defined RSI, or `None` when the series is too short.
pub fn latest_rsi<T: Close>(bars: &[T], period: usize) -> Option<f64> {
    rsi_series(bars, period).into_iter().flatten().last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Bar(f64);

    impl Close for Bar {
        fn close(&self) -> f64 {
            self.0
        }
    }

    fn bars(closes: &[f64]) -> Vec<Bar> {
        closes.iter().copied().map(Bar).collect()
    }

    #[test]
    fn undefined_below_fifteen_closes() {
        let closes: Vec<f64> = (0..14).map(|i| 100.0 + i as f64).collect();
        assert_eq!(latest_rsi(&bars(&closes), RSI_PERIOD), None);
        assert!(rsi_series(&bars(&closes), RSI_PERIOD).iter().all(Option::is_none));
    }

    #[test]
    fn first_value_at_fifteenth_close() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        let series = rsi_series(&bars(&closes), RSI_PERIOD);
        assert!(series[13].is_none());
        assert_eq!(series[14], Some(100.0));
    }

    #[test]
    fn falling_series_is_zero() {
        let closes: Vec<f64> = (0..20).map(|i| 200.0 - i as f64).collect();
        assert_relative_eq!(latest_rsi(&bars(&closes), RSI_PERIOD).unwrap(), 0.0);
    }

    #[test]
    fn alternating_moves_balance_out() {
        // +1, -1, +1, ... over 14 changes: equal average gain and loss
        let closes: Vec<f64> = (0..15)
            .map(|i| if i % 2 == 0 { 100.0 } else { 101.0 })
            .collect();
        assert_relative_eq!(latest_rsi(&bars(&closes), RSI_PERIOD).unwrap(), 50.0);
    }

    #[test]
    fn wilder_smoothing_after_seed() {
        // 14 gains of 1 seed avg_gain = 1, avg_loss = 0; then a loss of 2
        let mut closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        closes.push(112.0);
        let rsi = latest_rsi(&bars(&closes), RSI_PERIOD).unwrap();
        let avg_gain = 13.0 / 14.0;
        let avg_loss = 2.0 / 14.0;
        let expected = 100.0 - 100.0 / (1.0 + avg_gain / avg_loss);
        assert_relative_eq!(rsi, expected, epsilon = 1e-12);
    }

    #[test]
    fn stays_within_bounds() {
        let closes = [
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
            45.61, 46.28, 46.28, 46.00, 46.03, 46.41, 46.22, 45.64,
        ];
        for value in rsi_series(&bars(&closes), RSI_PERIOD).into_iter().flatten() {
            assert!((0.0..=100.0).contains(&value));
        }
        let first = rsi_series(&bars(&closes), RSI_PERIOD)[14].unwrap();
        assert_relative_eq!(first, 70.46, epsilon = 0.01);
    }

    #[test]
    fn reset_starts_over() {
        let mut rsi = WilderRsi::default();
        for i in 0..20 {
            rsi.next(100.0 + i as f64);
        }
        rsi.reset();
        assert_eq!(rsi.next(50.0), None);
        assert_eq!(rsi.period(), RSI_PERIOD);
        assert_eq!(rsi.to_string(), "RSI(14)");
    }

    #[test]
    fn zero_period_rejected() {
        assert!(WilderRsi::new(0).is_err());
    }
}
