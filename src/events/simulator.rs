//! Event trade simulator
//!
//! Long-only entry `entry_offset` trading rows before an announcement, held
//! to the announcement row unless the stop-loss fires first. Alpha is the
//! trade return less the market return compounded over the same calendar
//! span.

use chrono::{Duration, NaiveDate};
use std::collections::HashMap;
use tracing::debug;

use crate::config::BacktestConfig;
use crate::error::Result;
use crate::events::aligner::align;
use crate::types::{AnnouncementEvent, ExitReason, SignalRow, SignalSource, Trade};

pub struct TradeSimulator {
    entry_offset: usize,
    stop_loss_pct: f64,
    min_notional: f64,
    source: SignalSource,
}

impl TradeSimulator {
    pub fn new(config: &BacktestConfig) -> Self {
        Self {
            entry_offset: config.entry_offset,
            stop_loss_pct: config.stop_loss_pct,
            min_notional: config.min_notional,
            source: config.signal_source,
        }
    }

    pub fn with_source(mut self, source: SignalSource) -> Self {
        self.source = source;
        self
    }

    /// Simulate one event.
    ///
    /// `Err(AlignmentFailure)` when the event cannot be placed on the
    /// series, `Ok(None)` when it is placed but does not qualify.
    pub fn simulate(
        &self,
        event: &AnnouncementEvent,
        rows: &[SignalRow],
        market_returns: &HashMap<NaiveDate, f64>,
    ) -> Result<Option<Trade>> {
        let aligned = align(
            &event.stock_id,
            rows,
            event.announcement_date,
            self.entry_offset,
        )?;
        let entry = &rows[aligned.entry_index];
        let entry_price = entry.price;

        // A missing close must never become a 0 price in return math
        if entry_price <= 0.0 {
            debug!(stock = %event.stock_id, date = %entry.date, "No entry price, skipping event");
            return Ok(None);
        }

        let signal_sum: f64 = rows[aligned.entry_index..aligned.exit_index]
            .iter()
            .map(|r| self.source.value(r))
            .sum();
        let notional_value = signal_sum * entry_price;
        if notional_value <= self.min_notional {
            debug!(
                stock = %event.stock_id,
                date = %event.announcement_date,
                notional_value,
                "Below notional threshold"
            );
            return Ok(None);
        }

        let (exit_index, exit_reason) = self.walk(rows, aligned.entry_index, aligned.exit_index);
        let exit = &rows[exit_index];
        if exit.price <= 0.0 {
            debug!(stock = %event.stock_id, date = %exit.date, "No exit price, skipping event");
            return Ok(None);
        }

        let trade_return = (exit.price - entry_price) / entry_price;
        let market_return = compound_market_return(market_returns, entry.date, exit.date);
        let alpha = trade_return - market_return;

        Ok(Some(Trade {
            stock_id: event.stock_id.clone(),
            announcement_date: event.announcement_date,
            revenue_growth_pct: event.revenue_growth_pct,
            signal_sum,
            notional_value,
            entry_date: entry.date,
            entry_price,
            exit_date: exit.date,
            exit_price: exit.price,
            exit_reason,
            return_pct: trade_return * 100.0,
            market_return_pct: market_return * 100.0,
            alpha_pct: alpha * 100.0,
        }))
    }

    /// First row after entry whose close breaches the stop, else the exit row.
    /// Rows without a close are not checked.
    fn walk(&self, rows: &[SignalRow], entry_index: usize, exit_index: usize) -> (usize, ExitReason) {
        let entry_price = rows[entry_index].price;
        for (i, row) in rows
            .iter()
            .enumerate()
            .take(exit_index + 1)
            .skip(entry_index + 1)
        {
            if row.price <= 0.0 {
                continue;
            }
            if (row.price - entry_price) / entry_price <= -self.stop_loss_pct {
                return (i, ExitReason::StopLoss);
            }
        }
        (exit_index, ExitReason::Event)
    }
}

/// Market return compounded over every calendar day in (after, through].
/// Days absent from the table contribute no move.
pub fn compound_market_return(
    market_returns: &HashMap<NaiveDate, f64>,
    after: NaiveDate,
    through: NaiveDate,
) -> f64 {
    let mut growth = 1.0;
    let mut day = after + Duration::days(1);
    while day <= through {
        if let Some(r) = market_returns.get(&day) {
            growth *= 1.0 + r;
        }
        day += Duration::days(1);
    }
    growth - 1.0
}
