//! Original vs smart signal comparison
//!
//! Replays the full tape twice with independent books: once over every
//! broker and once over the accumulator subset. The smart series is left
//! joined onto the original one by date.

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::config::ReplayConfig;
use crate::data::CloseLookup;
use crate::replay::engine::InventoryReplayEngine;
use crate::types::{BrokerId, SignalRow, Transaction};

pub struct SignalComparator {
    engine: InventoryReplayEngine,
}

impl SignalComparator {
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            engine: InventoryReplayEngine::new(config),
        }
    }

    /// Joined daily series. With `smart = None` no smart subset exists and
    /// every `smart_bps` is empty; with a subset, days on which no smart
    /// broker traded carry 0.
    pub fn compare(
        &self,
        transactions: &[Transaction],
        closes: &CloseLookup,
        smart: Option<&BTreeSet<BrokerId>>,
    ) -> Vec<SignalRow> {
        let original = self.engine.replay(transactions, closes);

        let smart_by_date: Option<HashMap<_, f64>> = smart.map(|brokers| {
            let filtered = transactions
                .iter()
                .filter(|tx| brokers.contains(&tx.broker_id));
            self.engine
                .replay(filtered, closes)
                .into_iter()
                .map(|p| (p.date, p.bps_factor))
                .collect()
        });

        debug!(
            days = original.len(),
            smart_days = smart_by_date.as_ref().map_or(0, |m| m.len()),
            "Compared signals"
        );

        original
            .into_iter()
            .map(|point| SignalRow {
                date: point.date,
                price: point.price,
                original_bps: point.bps_factor,
                smart_bps: smart_by_date
                    .as_ref()
                    .map(|m| m.get(&point.date).copied().unwrap_or(0.0)),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, d).unwrap()
    }

    fn tx(d: u32, broker: &str, price: f64, buy: f64, sell: f64) -> Transaction {
        Transaction {
            date: day(d),
            stock_id: "2454".to_string(),
            broker_id: broker.to_string(),
            price,
            buy_qty: buy,
            sell_qty: sell,
        }
    }

    fn tape() -> Vec<Transaction> {
        vec![
            tx(1, "A", 10.0, 100.0, 0.0),
            tx(1, "B", 10.0, 50.0, 0.0),
            tx(2, "A", 11.0, 20.0, 0.0),
            tx(2, "B", 11.0, 0.0, 10.0),
            tx(3, "B", 12.0, 5.0, 0.0),
        ]
    }

    #[test]
    fn test_without_smart_subset() {
        let rows = SignalComparator::new(ReplayConfig::default()).compare(
            &tape(),
            &CloseLookup::new(),
            None,
        );
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.smart_bps.is_none()));
        // Both brokers rank on day 2: 20 - 10
        assert_eq!(rows[1].original_bps, 10.0);
    }

    #[test]
    fn test_smart_subset_left_join() {
        let smart: BTreeSet<BrokerId> = ["A".to_string()].into_iter().collect();
        let rows = SignalComparator::new(ReplayConfig::default()).compare(
            &tape(),
            &CloseLookup::new(),
            Some(&smart),
        );

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].smart_bps, Some(0.0));
        assert_eq!(rows[1].smart_bps, Some(20.0));
        // A silent on day 3
        assert_eq!(rows[2].smart_bps, Some(0.0));
        assert_eq!(rows[2].original_bps, 5.0);
    }

    #[test]
    fn test_passes_do_not_share_state() {
        let smart: BTreeSet<BrokerId> = ["B".to_string()].into_iter().collect();
        let comparator = SignalComparator::new(ReplayConfig::default());
        let first = comparator.compare(&tape(), &CloseLookup::new(), Some(&smart));
        let second = comparator.compare(&tape(), &CloseLookup::new(), Some(&smart));
        assert_eq!(first, second);
    }
}
