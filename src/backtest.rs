//! Multi-stock event backtest over written signal files

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use chrono::NaiveDate;

use crate::config::Config;
use crate::data::{load_announcements, load_signal_set, write_csv, write_json, MarketData};
use crate::error::{Error, Result};
use crate::events::{BacktestSummary, TradeSimulator};
use crate::types::{AnnouncementEvent, SignalRow, SignalSource, Trade};

/// Ledger plus statistics for one signal source
#[derive(Debug, Clone)]
pub struct BacktestRun {
    pub trades: Vec<Trade>,
    pub summary: BacktestSummary,
    /// Events that could not be aligned to a trading row
    pub unaligned: usize,
}

pub struct Backtester<'a> {
    config: &'a Config,
}

impl<'a> Backtester<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    /// Announcements in the configured date range
    pub fn events(&self) -> Result<Vec<AnnouncementEvent>> {
        let mut events = load_announcements(&self.config.data, self.config.batch.read_retry_ms)?;
        let total = events.len();
        events.retain(|e| self.config.backtest.in_range(e.announcement_date));
        info!(events = events.len(), total, "Loaded announcements");
        Ok(events)
    }

    /// Signal series for every stock with an in-range announcement
    pub fn signals(&self, events: &[AnnouncementEvent]) -> Result<BTreeMap<String, Vec<SignalRow>>> {
        let mut ids: Vec<String> = events.iter().map(|e| e.stock_id.clone()).collect();
        ids.dedup();
        load_signal_set(&self.config.data, &ids, self.config.batch.read_retry_ms)
    }

    /// Simulate every event against already loaded inputs
    pub fn simulate(
        &self,
        source: SignalSource,
        events: &[AnnouncementEvent],
        signals: &BTreeMap<String, Vec<SignalRow>>,
        market_returns: &HashMap<NaiveDate, f64>,
    ) -> Result<BacktestRun> {
        let simulator = TradeSimulator::new(&self.config.backtest).with_source(source);
        let mut trades = Vec::new();
        let mut unaligned = 0;

        for event in events {
            let Some(rows) = signals.get(&event.stock_id) else {
                continue;
            };
            match simulator.simulate(event, rows, market_returns) {
                Ok(Some(trade)) => trades.push(trade),
                Ok(None) => {}
                Err(e @ Error::AlignmentFailure { .. }) => {
                    debug!(error = %e, "Event skipped");
                    unaligned += 1;
                }
                Err(e) => return Err(e),
            }
        }

        trades.sort_by(|a, b| {
            a.stock_id
                .cmp(&b.stock_id)
                .then_with(|| a.announcement_date.cmp(&b.announcement_date))
        });
        let summary = BacktestSummary::from_trades(source, &trades, self.config.backtest.top_trades);

        info!(
            source = %source,
            trades = trades.len(),
            unaligned,
            avg_alpha = summary.avg_alpha_pct,
            "Backtest simulated"
        );
        Ok(BacktestRun {
            trades,
            summary,
            unaligned,
        })
    }

    /// Load inputs, simulate one source and persist the ledger and summary
    pub fn run(&self, source: SignalSource) -> Result<BacktestRun> {
        let events = self.events()?;
        let signals = self.signals(&events)?;
        if signals.is_empty() {
            warn!("No signal files for any announced stock; run `batch` first");
        }
        let market = MarketData::load(&self.config.data, self.config.batch.read_retry_ms)?;
        let run = self.simulate(source, &events, &signals, &market.market_returns)?;

        let data = &self.config.data;
        write_csv(&data.trades_path(), &run.trades)?;
        write_json(&data.summary_path(), &run.summary)?;
        info!(path = %data.trades_path().display(), "Trade ledger written");
        Ok(run)
    }

    /// Smart and original signals over identical inputs
    pub fn compare(&self) -> Result<(BacktestRun, BacktestRun)> {
        let events = self.events()?;
        let signals = self.signals(&events)?;
        let market = MarketData::load(&self.config.data, self.config.batch.read_retry_ms)?;
        let smart = self.simulate(SignalSource::Smart, &events, &signals, &market.market_returns)?;
        let original =
            self.simulate(SignalSource::Original, &events, &signals, &market.market_returns)?;
        Ok((smart, original))
    }
}
