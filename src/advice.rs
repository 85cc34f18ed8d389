//! Labels derived from RSI and estimated profit.
//!
//! Each classifier is a total function evaluated first-match-wins. The RSI
//! windows used by [`LiveAdvice`] cannot overlap: `Wait` needs RSI in
//! `[40, 60]`, which excludes both `< 30` and `> 70`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const OVERSOLD: f64 = 30.0;
pub const OVERBOUGHT: f64 = 70.0;
const NEUTRAL_RSI: f64 = 50.0;
const NEUTRAL_BAND: f64 = 10.0;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Advice {
    Buy,
    Hold,
    Sell,
}

impl Advice {
    pub const ALL: [Advice; 3] = [Advice::Buy, Advice::Hold, Advice::Sell];

    /// Strict thresholds: exactly 30 and exactly 70 are both `Hold`.
    pub fn from_rsi(rsi: f64) -> Self {
        if rsi < OVERSOLD {
            Advice::Buy
        } else if rsi > OVERBOUGHT {
            Advice::Sell
        } else {
            Advice::Hold
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Advice::Buy => "Buy",
            Advice::Hold => "Hold",
            Advice::Sell => "Sell",
        }
    }
}

impl fmt::Display for Advice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Advice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Advice::Buy),
            "hold" => Ok(Advice::Hold),
            "sell" => Ok(Advice::Sell),
            other => Err(format!("unknown advice '{}'", other)),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveAdvice {
    StrongBuy,
    ConsiderSelling,
    Wait,
    Review,
}

impl LiveAdvice {
    pub fn classify(rsi: f64, profit: f64) -> Self {
        if rsi < OVERSOLD && profit > 0.0 {
            LiveAdvice::StrongBuy
        } else if rsi > OVERBOUGHT && profit > 0.0 {
            LiveAdvice::ConsiderSelling
        } else if (rsi - NEUTRAL_RSI).abs() <= NEUTRAL_BAND {
            LiveAdvice::Wait
        } else {
            LiveAdvice::Review
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LiveAdvice::StrongBuy => "Strong Buy",
            LiveAdvice::ConsiderSelling => "Consider Selling",
            LiveAdvice::Wait => "Wait",
            LiveAdvice::Review => "Review",
        }
    }
}

impl fmt::Display for LiveAdvice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct AlertThresholds {
    pub rsi_alert: f64,
    pub profit_alert_minimum: f64,
    pub profit_target: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            rsi_alert: 30.0,
            profit_alert_minimum: 50.0,
            profit_target: 100.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alert {
    TargetHit,
    RsiTooLow,
    LowProfit,
    Ok,
}

impl Alert {
    pub fn classify(rsi: f64, profit: f64, thresholds: &AlertThresholds) -> Self {
        if profit >= thresholds.profit_target {
            Alert::TargetHit
        } else if rsi < thresholds.rsi_alert {
            Alert::RsiTooLow
        } else if profit < thresholds.profit_alert_minimum {
            Alert::LowProfit
        } else {
            Alert::Ok
        }
    }

    pub fn is_alerting(&self) -> bool {
        *self != Alert::Ok
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Alert::TargetHit => "Target Hit",
            Alert::RsiTooLow => "RSI Too Low",
            Alert::LowProfit => "Low Profit",
            Alert::Ok => "OK",
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Alert {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Target Hit" => Ok(Alert::TargetHit),
            "RSI Too Low" => Ok(Alert::RsiTooLow),
            "Low Profit" => Ok(Alert::LowProfit),
            "OK" => Ok(Alert::Ok),
            other => Err(format!("unknown alert '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advice_thresholds_are_strict() {
        assert_eq!(Advice::from_rsi(29.99), Advice::Buy);
        assert_eq!(Advice::from_rsi(30.00), Advice::Hold);
        assert_eq!(Advice::from_rsi(50.0), Advice::Hold);
        assert_eq!(Advice::from_rsi(70.00), Advice::Hold);
        assert_eq!(Advice::from_rsi(70.01), Advice::Sell);
    }

    #[test]
    fn advice_parses_back() {
        for advice in Advice::ALL {
            assert_eq!(advice.to_string().parse::<Advice>(), Ok(advice));
        }
        assert!("Maybe".parse::<Advice>().is_err());
    }

    #[test]
    fn live_advice_priority() {
        assert_eq!(LiveAdvice::classify(25.0, 10.0), LiveAdvice::StrongBuy);
        assert_eq!(LiveAdvice::classify(75.0, 10.0), LiveAdvice::ConsiderSelling);
        assert_eq!(LiveAdvice::classify(55.0, 10.0), LiveAdvice::Wait);
        assert_eq!(LiveAdvice::classify(55.0, -10.0), LiveAdvice::Wait);
        // oversold without profit cannot reach the neutral band
        assert_eq!(LiveAdvice::classify(25.0, 0.0), LiveAdvice::Review);
        assert_eq!(LiveAdvice::classify(75.0, -5.0), LiveAdvice::Review);
        assert_eq!(LiveAdvice::classify(35.0, 100.0), LiveAdvice::Review);
    }

    #[test]
    fn live_advice_neutral_band_edges() {
        assert_eq!(LiveAdvice::classify(40.0, 1.0), LiveAdvice::Wait);
        assert_eq!(LiveAdvice::classify(60.0, 1.0), LiveAdvice::Wait);
        assert_eq!(LiveAdvice::classify(39.99, 1.0), LiveAdvice::Review);
        assert_eq!(LiveAdvice::classify(60.01, 1.0), LiveAdvice::Review);
    }

    #[test]
    fn live_advice_has_single_label_everywhere() {
        // sweep RSI and profit sign: the first two branches never coincide with Wait
        for tenth in 0..=1000 {
            let rsi = tenth as f64 / 10.0;
            for profit in [-1.0, 0.0, 1.0] {
                let label = LiveAdvice::classify(rsi, profit);
                let oversold_gain = rsi < OVERSOLD && profit > 0.0;
                let overbought_gain = rsi > OVERBOUGHT && profit > 0.0;
                let neutral = (rsi - 50.0).abs() <= 10.0;
                assert!(!(neutral && (oversold_gain || overbought_gain)));
                assert_eq!(label == LiveAdvice::Wait, neutral);
            }
        }
    }

    #[test]
    fn alert_priority() {
        let t = AlertThresholds::default();
        assert_eq!(Alert::classify(20.0, 150.0, &t), Alert::TargetHit);
        assert_eq!(Alert::classify(50.0, 100.0, &t), Alert::TargetHit);
        assert_eq!(Alert::classify(20.0, 80.0, &t), Alert::RsiTooLow);
        assert_eq!(Alert::classify(50.0, 49.99, &t), Alert::LowProfit);
        assert_eq!(Alert::classify(30.0, 50.0, &t), Alert::Ok);
        assert_eq!(Alert::classify(30.0, -20.0, &t), Alert::LowProfit);
    }

    #[test]
    fn alerting_matches_combined_flag() {
        let t = AlertThresholds::default();
        for (rsi, profit) in [(20.0, 60.0), (50.0, 10.0), (50.0, 120.0), (50.0, 60.0)] {
            let flag =
                rsi < t.rsi_alert || profit < t.profit_alert_minimum || profit >= t.profit_target;
            assert_eq!(Alert::classify(rsi, profit, &t).is_alerting(), flag);
        }
    }

    #[test]
    fn alert_labels_parse_back() {
        for alert in [Alert::TargetHit, Alert::RsiTooLow, Alert::LowProfit, Alert::Ok] {
            assert_eq!(alert.as_str().parse::<Alert>(), Ok(alert));
        }
    }
}
