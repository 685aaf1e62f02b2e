//! Daily entry scan and holding review
//!
//! Entry candidates come from trailing signal accumulation up to a given
//! date. Held positions are marked at that date's close against the
//! stop-loss and take-profit thresholds.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Result;
use crate::types::{SignalRow, SignalSource};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryCandidate {
    pub stock_id: String,
    pub date: NaiveDate,
    pub price: f64,
    /// Signal summed over the trailing window including `date`
    pub trailing_sum: f64,
}

/// BUY candidates for `date`, strongest accumulation first.
/// A stock qualifies only when `date` is a trading row with at least
/// `window` rows before it.
pub fn scan_entries(
    date: NaiveDate,
    signals: &BTreeMap<String, Vec<SignalRow>>,
    window: usize,
    min_qty: f64,
    source: SignalSource,
) -> Vec<EntryCandidate> {
    let mut candidates: Vec<EntryCandidate> = signals
        .iter()
        .filter_map(|(stock_id, rows)| {
            let idx = rows.binary_search_by(|r| r.date.cmp(&date)).ok()?;
            if idx < window {
                return None;
            }
            let trailing_sum: f64 = rows[idx + 1 - window..=idx]
                .iter()
                .map(|r| source.value(r))
                .sum();
            (trailing_sum > min_qty).then(|| EntryCandidate {
                stock_id: stock_id.clone(),
                date,
                price: rows[idx].price,
                trailing_sum,
            })
        })
        .collect();

    candidates.sort_by(|a, b| b.trailing_sum.total_cmp(&a.trailing_sum));
    candidates
}

/// An open position recorded in the portfolio file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub qty: f64,
}

/// stock_id -> holding
pub type Portfolio = BTreeMap<String, Holding>;

pub fn load_portfolio(path: &Path) -> Result<Portfolio> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HoldingAction {
    SellStopLoss,
    SellTakeProfit,
    Hold,
}

impl std::fmt::Display for HoldingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HoldingAction::SellStopLoss => write!(f, "SELL (STOP LOSS)"),
            HoldingAction::SellTakeProfit => write!(f, "SELL (TAKE PROFIT)"),
            HoldingAction::Hold => write!(f, "HOLD"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingReview {
    pub stock_id: String,
    pub price: f64,
    /// Fractional unrealized P&L
    pub pnl: f64,
    pub action: HoldingAction,
}

/// Reviews for priced holdings, plus the ids that had no price on the date
pub fn review_holdings<F>(
    portfolio: &Portfolio,
    price_on: F,
    stop_loss_pct: f64,
    take_profit_pct: f64,
) -> (Vec<HoldingReview>, Vec<String>)
where
    F: Fn(&str) -> Option<f64>,
{
    let mut reviews = Vec::new();
    let mut unpriced = Vec::new();

    for (stock_id, holding) in portfolio {
        let price = match price_on(stock_id) {
            Some(p) if p > 0.0 && holding.entry_price > 0.0 => p,
            _ => {
                unpriced.push(stock_id.clone());
                continue;
            }
        };
        let pnl = (price - holding.entry_price) / holding.entry_price;
        let action = if pnl <= -stop_loss_pct {
            HoldingAction::SellStopLoss
        } else if pnl > take_profit_pct {
            HoldingAction::SellTakeProfit
        } else {
            HoldingAction::Hold
        };
        reviews.push(HoldingReview {
            stock_id: stock_id.clone(),
            price,
            pnl,
            action,
        });
    }

    (reviews, unpriced)
}
