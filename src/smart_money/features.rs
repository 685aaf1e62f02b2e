//! Broker behavioral features
//!
//! Turns a transaction tape into one feature vector per broker over an
//! adaptive lookback window:
//! - frequency: share of the window's trading days the broker was active
//! - overnight_ratio: |net volume| / total volume (directional conviction)
//! - log_avg_daily_volume: ln(1 + volume per active day)

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info, warn};

use crate::config::ClusteringConfig;
use crate::error::{Error, Result};
use crate::types::{BrokerId, Transaction};

/// Behavioral summary of one broker over a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerFeatures {
    pub broker_id: BrokerId,
    pub total_buy: f64,
    pub total_sell: f64,
    pub total_volume: f64,
    pub active_days: u32,
    pub frequency: f64,
    pub net_volume: f64,
    pub overnight_ratio: f64,
    pub avg_daily_volume: f64,
    pub log_avg_daily_volume: f64,
}

impl BrokerFeatures {
    /// The vector used for clustering, in fixed order
    pub fn clustering_vector(&self) -> [f64; 3] {
        [self.frequency, self.overnight_ratio, self.log_avg_daily_volume]
    }
}

/// The calendar window features were computed over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub lookback_days: i64,
    pub trading_days: usize,
    /// True when the default lookback was too sparse and got widened
    pub widened: bool,
}

/// Per-broker accumulator while scanning the tape
#[derive(Default)]
struct BrokerTally {
    buy: f64,
    sell: f64,
    days: HashSet<NaiveDate>,
}

/// Feature extractor with adaptive window widening
pub struct FeatureExtractor {
    config: ClusteringConfig,
}

impl FeatureExtractor {
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    /// Pick the lookback window: the default lookback, widened to the
    /// fallback when it holds fewer than `min_trading_days` trading days
    pub fn select_window<'a>(
        &self,
        stock_id: &str,
        transactions: &'a [Transaction],
    ) -> Result<(FeatureWindow, Vec<&'a Transaction>)> {
        let end = transactions
            .iter()
            .map(|tx| tx.date)
            .max()
            .ok_or_else(|| Error::MissingData(format!("empty tape for {}", stock_id)))?;

        let mut lookback = self.config.default_lookback_days;
        let mut window = slice_window(transactions, end, lookback);
        let mut trading_days = distinct_days(&window);
        let mut widened = false;

        if trading_days < self.config.min_trading_days {
            warn!(
                stock = %stock_id,
                trading_days,
                lookback,
                fallback = self.config.fallback_lookback_days,
                "Sparse clustering window, widening"
            );
            lookback = self.config.fallback_lookback_days;
            window = slice_window(transactions, end, lookback);
            trading_days = distinct_days(&window);
            widened = true;
        }

        // Nobody can reach min_active_days with fewer trading days than that
        let required = self.config.min_active_days.max(1) as usize;
        if trading_days < required {
            return Err(Error::InsufficientHistory {
                stock_id: stock_id.to_string(),
                trading_days,
                required,
            });
        }

        let info = FeatureWindow {
            start: end - Duration::days(lookback),
            end,
            lookback_days: lookback,
            trading_days,
            widened,
        };
        info!(
            stock = %stock_id,
            lookback = info.lookback_days,
            trading_days = info.trading_days,
            rows = window.len(),
            "Selected clustering window"
        );
        Ok((info, window))
    }

    /// Compute features for every broker in `transactions`. Frequency uses
    /// the window's distinct trading days as a shared denominator.
    pub fn extract(&self, transactions: &[&Transaction]) -> Vec<BrokerFeatures> {
        let period_days = distinct_days(transactions);
        let mut tallies: BTreeMap<&str, BrokerTally> = BTreeMap::new();

        for tx in transactions {
            let tally = tallies.entry(tx.broker_id.as_str()).or_default();
            tally.buy += tx.buy_qty;
            tally.sell += tx.sell_qty;
            tally.days.insert(tx.date);
        }

        let features: Vec<BrokerFeatures> = tallies
            .into_iter()
            .map(|(broker_id, tally)| build_features(broker_id, &tally, period_days))
            .collect();

        debug!(brokers = features.len(), period_days, "Extracted broker features");
        features
    }

    /// Window selection followed by extraction
    pub fn extract_adaptive(
        &self,
        stock_id: &str,
        transactions: &[Transaction],
    ) -> Result<(FeatureWindow, Vec<BrokerFeatures>)> {
        let (window, rows) = self.select_window(stock_id, transactions)?;
        let features = self.extract(&rows);
        Ok((window, features))
    }
}

fn build_features(broker_id: &str, tally: &BrokerTally, period_days: usize) -> BrokerFeatures {
    let total_volume = tally.buy + tally.sell;
    let active_days = tally.days.len() as u32;
    let net_volume = tally.buy - tally.sell;

    let frequency = safe_div(active_days as f64, period_days as f64);
    let overnight_ratio = safe_div(net_volume.abs(), total_volume);
    let avg_daily_volume = safe_div(total_volume, active_days as f64);

    BrokerFeatures {
        broker_id: broker_id.to_string(),
        total_buy: tally.buy,
        total_sell: tally.sell,
        total_volume,
        active_days,
        frequency,
        net_volume,
        overnight_ratio,
        avg_daily_volume,
        log_avg_daily_volume: avg_daily_volume.max(0.0).ln_1p(),
    }
}

/// Division that resolves zero (or non-finite) denominators to 0
fn safe_div(num: f64, den: f64) -> f64 {
    if den > 0.0 && den.is_finite() {
        num / den
    } else {
        0.0
    }
}

fn slice_window(transactions: &[Transaction], end: NaiveDate, lookback: i64) -> Vec<&Transaction> {
    let start = end - Duration::days(lookback);
    transactions.iter().filter(|tx| tx.date >= start).collect()
}

fn distinct_days(transactions: &[&Transaction]) -> usize {
    transactions
        .iter()
        .map(|tx| tx.date)
        .collect::<BTreeSet<_>>()
        .len()
}
