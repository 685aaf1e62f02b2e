//! Shared types for the broker-flow pipeline
//!
//! Input rows supplied by the tabular collaborators and the records the core
//! produces for persistence.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Broker (securities trader branch) identifier
pub type BrokerId = String;

/// One broker's activity at one price level on one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    pub stock_id: String,
    pub broker_id: BrokerId,
    pub price: f64,
    #[serde(rename = "buy")]
    pub buy_qty: f64,
    #[serde(rename = "sell")]
    pub sell_qty: f64,
}

impl Transaction {
    /// Shares traded in both directions
    pub fn volume(&self) -> f64 {
        self.buy_qty + self.sell_qty
    }

    /// Price times traded volume, used for volume weighting
    pub fn turnover(&self) -> f64 {
        self.price * self.volume()
    }
}

/// Daily close for a stock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub stock_id: String,
    pub date: NaiveDate,
    pub close: f64,
}

/// Fractional daily return of the market index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketReturn {
    pub date: NaiveDate,
    pub market_return: f64,
}

/// Monthly revenue disclosure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnouncementEvent {
    pub stock_id: String,
    pub announcement_date: NaiveDate,
    pub revenue_growth_pct: f64,
}

/// One point of a replay's output series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySignalPoint {
    pub date: NaiveDate,
    pub price: f64,
    pub bps_factor: f64,
}

/// Joined original/smart signal row, one per trading day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRow {
    pub date: NaiveDate,
    pub price: f64,
    pub original_bps: f64,
    /// Empty when no smart subset could be identified for the stock
    pub smart_bps: Option<f64>,
}

/// Which column of the signal file drives event trades
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    #[default]
    Smart,
    Original,
}

impl SignalSource {
    /// Signal value for a row; a missing smart value aggregates as zero
    pub fn value(&self, row: &SignalRow) -> f64 {
        match self {
            SignalSource::Smart => row.smart_bps.unwrap_or(0.0),
            SignalSource::Original => row.original_bps,
        }
    }
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalSource::Smart => write!(f, "smart"),
            SignalSource::Original => write!(f, "original"),
        }
    }
}

impl std::str::FromStr for SignalSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "smart" => Ok(SignalSource::Smart),
            "original" => Ok(SignalSource::Original),
            other => Err(format!("unknown signal source '{}'", other)),
        }
    }
}

/// Why a simulated trade was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Held to the announcement row
    Event,
    /// Close breached the stop-loss threshold
    StopLoss,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Event => write!(f, "Event"),
            ExitReason::StopLoss => write!(f, "StopLoss"),
        }
    }
}

/// A completed long-only event trade. Percent fields are in percent units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub stock_id: String,
    pub announcement_date: NaiveDate,
    pub revenue_growth_pct: f64,
    pub signal_sum: f64,
    pub notional_value: f64,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub exit_date: NaiveDate,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub return_pct: f64,
    pub market_return_pct: f64,
    pub alpha_pct: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_source_missing_smart_is_zero() {
        let row = SignalRow {
            date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            price: 100.0,
            original_bps: 1500.0,
            smart_bps: None,
        };
        assert_eq!(SignalSource::Smart.value(&row), 0.0);
        assert_eq!(SignalSource::Original.value(&row), 1500.0);
    }

    #[test]
    fn test_signal_source_parse() {
        assert_eq!("Smart".parse::<SignalSource>().unwrap(), SignalSource::Smart);
        assert_eq!("original".parse::<SignalSource>().unwrap(), SignalSource::Original);
        assert!("both".parse::<SignalSource>().is_err());
    }
}
