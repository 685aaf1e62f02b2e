//! Pre-announcement flow scan
//!
//! Sums the signal over the last few trading rows before each announcement
//! and flags events where heavy buying preceded strong growth, or heavy
//! selling preceded a strong decline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::ScanConfig;
use crate::types::{AnnouncementEvent, SignalRow, SignalSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontRunRow {
    pub stock_id: String,
    pub announcement_date: chrono::NaiveDate,
    pub revenue_growth_pct: f64,
    pub signal_sum: f64,
    /// signal_sum signed by the direction of growth
    pub score: f64,
    pub is_front_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockFrontRunSummary {
    pub stock_id: String,
    pub events: usize,
    pub detected_events: usize,
    pub mean_growth_pct: f64,
}

pub struct FrontRunScanner {
    window: usize,
    min_qty: f64,
    min_growth_pct: f64,
    source: SignalSource,
}

impl FrontRunScanner {
    pub fn new(config: &ScanConfig, source: SignalSource) -> Self {
        Self {
            window: config.front_run_window,
            min_qty: config.front_run_min_qty,
            min_growth_pct: config.front_run_min_growth_pct,
            source,
        }
    }

    /// None when no signal row precedes the announcement
    pub fn scan_event(&self, event: &AnnouncementEvent, rows: &[SignalRow]) -> Option<FrontRunRow> {
        let before = rows.partition_point(|r| r.date < event.announcement_date);
        if before == 0 {
            return None;
        }
        let start = before.saturating_sub(self.window);
        let signal_sum: f64 = rows[start..before].iter().map(|r| self.source.value(r)).sum();
        let growth = event.revenue_growth_pct;

        let is_front_run = (signal_sum > self.min_qty && growth > self.min_growth_pct)
            || (signal_sum < -self.min_qty && growth < -self.min_growth_pct);

        Some(FrontRunRow {
            stock_id: event.stock_id.clone(),
            announcement_date: event.announcement_date,
            revenue_growth_pct: growth,
            signal_sum,
            score: if growth > 0.0 { signal_sum } else { -signal_sum },
            is_front_run,
        })
    }

    /// Scan every event with a loaded series, largest |signal_sum| first
    pub fn scan(
        &self,
        events: &[AnnouncementEvent],
        signals: &BTreeMap<String, Vec<SignalRow>>,
    ) -> Vec<FrontRunRow> {
        let mut rows: Vec<FrontRunRow> = events
            .iter()
            .filter_map(|event| {
                let series = signals.get(&event.stock_id)?;
                self.scan_event(event, series)
            })
            .collect();

        rows.sort_by(|a, b| {
            b.signal_sum
                .abs()
                .total_cmp(&a.signal_sum.abs())
                .then_with(|| a.stock_id.cmp(&b.stock_id))
                .then_with(|| a.announcement_date.cmp(&b.announcement_date))
        });
        rows
    }
}

/// Detected events and mean growth per stock
pub fn summarize_by_stock(rows: &[FrontRunRow]) -> Vec<StockFrontRunSummary> {
    let mut by_stock: BTreeMap<&str, (usize, usize, f64)> = BTreeMap::new();
    for row in rows {
        let entry = by_stock.entry(row.stock_id.as_str()).or_insert((0, 0, 0.0));
        entry.0 += 1;
        entry.1 += usize::from(row.is_front_run);
        entry.2 += row.revenue_growth_pct;
    }

    by_stock
        .into_iter()
        .map(|(stock_id, (events, detected, growth))| StockFrontRunSummary {
            stock_id: stock_id.to_string(),
            events,
            detected_events: detected,
            mean_growth_pct: growth / events as f64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn series(values: &[f64]) -> Vec<SignalRow> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| SignalRow {
                date: date(1 + i as u32),
                price: 20.0,
                original_bps: 0.0,
                smart_bps: Some(*v),
            })
            .collect()
    }

    fn event(stock: &str, d: u32, growth: f64) -> AnnouncementEvent {
        AnnouncementEvent {
            stock_id: stock.to_string(),
            announcement_date: date(d),
            revenue_growth_pct: growth,
        }
    }

    fn scanner() -> FrontRunScanner {
        FrontRunScanner::new(&ScanConfig::default(), SignalSource::Smart)
    }

    #[test]
    fn test_window_excludes_announcement_day() {
        // Rows on Jan 1..=8; announcement on the 8th uses Jan 3..=7
        let rows = series(&[100_000.0, 100_000.0, 3_000.0, 3_000.0, 3_000.0, 3_000.0, 3_000.0, 1e9]);
        let row = scanner().scan_event(&event("2317", 8, 15.0), &rows).unwrap();
        assert!((row.signal_sum - 15_000.0).abs() < 1e-9);
        assert!(row.is_front_run);
    }

    #[test]
    fn test_selling_before_decline() {
        let rows = series(&[-5_000.0, -5_000.0, -5_000.0]);
        let row = scanner().scan_event(&event("2317", 10, -20.0), &rows).unwrap();
        assert!(row.is_front_run);
        assert_eq!(row.score, 15_000.0);

        // Strong selling ahead of strong growth is not front-running
        let row = scanner().scan_event(&event("2317", 10, 20.0), &rows).unwrap();
        assert!(!row.is_front_run);
    }

    #[test]
    fn test_no_prior_rows() {
        let rows = series(&[1.0, 2.0]);
        assert!(scanner().scan_event(&event("2317", 1, 50.0), &rows).is_none());
    }

    #[test]
    fn test_scan_sorted_by_magnitude() {
        let mut signals = BTreeMap::new();
        signals.insert("A".to_string(), series(&[1_000.0, 1_000.0]));
        signals.insert("B".to_string(), series(&[-50_000.0, 0.0]));
        let events = vec![event("A", 5, 30.0), event("B", 5, -30.0), event("C", 5, 1.0)];

        let rows = scanner().scan(&events, &signals);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].stock_id, "B");

        let summary = summarize_by_stock(&rows);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[1].stock_id, "B");
        assert_eq!(summary[1].detected_events, 1);
        assert_eq!(summary[0].detected_events, 0);
    }
}
