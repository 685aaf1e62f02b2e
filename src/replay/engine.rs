//! Inventory replay engine
//!
//! Replays a broker-filtered tape one trading day at a time. Each day runs
//! in two phases:
//!
//! 1. Read-only: value the day, net each active broker's trades, rank the
//!    book (still holding yesterday's closing positions) by total P&L and
//!    sum today's net buying of the top brokers into the day's signal.
//! 2. Mutation: fold today's actions into the book.
//!
//! Ranking therefore never sees today's trades. On the first day the book
//! is empty and the signal is zero.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

use crate::config::ReplayConfig;
use crate::data::CloseLookup;
use crate::replay::state::{BrokerBook, DailyAction};
use crate::types::{DailySignalPoint, Transaction};

/// Read-only outcome of phase one for a single day
#[derive(Debug, Clone, PartialEq)]
pub struct DayEvaluation {
    pub point: DailySignalPoint,
    pub actions: Vec<DailyAction>,
    pub winners: Vec<String>,
}

/// Top-performer order-flow replay
pub struct InventoryReplayEngine {
    top_n: usize,
}

impl InventoryReplayEngine {
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            top_n: config.top_n,
        }
    }

    /// Replay with a fresh book; the book is dropped when the run ends
    pub fn replay<'a, I>(&self, transactions: I, closes: &CloseLookup) -> Vec<DailySignalPoint>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut book = BrokerBook::new();
        self.replay_into(transactions, closes, &mut book)
    }

    /// Replay into a caller-owned book, one signal point per trading date
    pub fn replay_into<'a, I>(
        &self,
        transactions: I,
        closes: &CloseLookup,
        book: &mut BrokerBook,
    ) -> Vec<DailySignalPoint>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let days = group_by_day(transactions);
        let mut points = Vec::with_capacity(days.len());

        for (date, day) in &days {
            let evaluation = self.evaluate_day(*date, day, closes, book);
            trace!(
                %date,
                price = evaluation.point.price,
                winners = ?evaluation.winners,
                bps = evaluation.point.bps_factor,
                "Day evaluated"
            );
            book.apply(&evaluation.actions);
            points.push(evaluation.point);
        }

        debug!(
            days = points.len(),
            brokers = book.len(),
            "Replay finished"
        );
        points
    }

    /// Phase one: everything that must be computed before the book moves
    pub fn evaluate_day(
        &self,
        date: NaiveDate,
        day: &[&Transaction],
        closes: &CloseLookup,
        book: &BrokerBook,
    ) -> DayEvaluation {
        let price = valuation_price(date, day, closes);
        let actions = daily_actions(day);

        let winners: Vec<String> = book
            .rank(price, self.top_n)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        let winner_set: BTreeSet<&str> = winners.iter().map(String::as_str).collect();

        let bps_factor: f64 = actions
            .iter()
            .filter(|a| winner_set.contains(a.broker_id.as_str()))
            .map(|a| a.net_buy_qty)
            .sum();

        DayEvaluation {
            point: DailySignalPoint {
                date,
                price,
                bps_factor,
            },
            actions,
            winners,
        }
    }
}

/// Trading days in ascending order with their transactions
fn group_by_day<'a, I>(transactions: I) -> BTreeMap<NaiveDate, Vec<&'a Transaction>>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut days: BTreeMap<NaiveDate, Vec<&'a Transaction>> = BTreeMap::new();
    for tx in transactions {
        days.entry(tx.date).or_default().push(tx);
    }
    days
}

/// External close when available, else the day's VWAP, else 0
pub fn valuation_price(date: NaiveDate, day: &[&Transaction], closes: &CloseLookup) -> f64 {
    if let Some(close) = closes.get(&date) {
        return *close;
    }
    let volume: f64 = day.iter().map(|tx| tx.volume()).sum();
    if volume > 0.0 {
        day.iter().map(|tx| tx.turnover()).sum::<f64>() / volume
    } else {
        0.0
    }
}

/// Net buy quantity and VWAP per broker, ordered by broker id
pub fn daily_actions(day: &[&Transaction]) -> Vec<DailyAction> {
    let mut tallies: BTreeMap<&str, (f64, f64, f64)> = BTreeMap::new();
    for tx in day {
        let tally = tallies.entry(tx.broker_id.as_str()).or_insert((0.0, 0.0, 0.0));
        tally.0 += tx.buy_qty;
        tally.1 += tx.sell_qty;
        tally.2 += tx.turnover();
    }

    tallies
        .into_iter()
        .map(|(broker_id, (buy, sell, turnover))| {
            let volume = buy + sell;
            DailyAction {
                broker_id: broker_id.to_string(),
                net_buy_qty: buy - sell,
                avg_price: if volume > 0.0 { turnover / volume } else { 0.0 },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, d).unwrap()
    }

    fn tx(d: u32, broker: &str, price: f64, buy: f64, sell: f64) -> Transaction {
        Transaction {
            date: day(d),
            stock_id: "2330".to_string(),
            broker_id: broker.to_string(),
            price,
            buy_qty: buy,
            sell_qty: sell,
        }
    }

    fn engine() -> InventoryReplayEngine {
        InventoryReplayEngine::new(ReplayConfig::default())
    }

    #[test]
    fn test_first_day_signal_is_zero() {
        let tape = vec![tx(1, "A", 10.0, 500.0, 0.0), tx(1, "B", 10.0, 0.0, 200.0)];
        let points = engine().replay(&tape, &CloseLookup::new());
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].bps_factor, 0.0);
        assert!((points[0].price - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_broker_book() {
        let tape = vec![tx(1, "A", 10.0, 100.0, 0.0), tx(2, "A", 15.0, 0.0, 40.0)];
        let mut book = BrokerBook::new();
        let points = engine().replay_into(&tape, &CloseLookup::new(), &mut book);

        let state = book.get("A").unwrap();
        assert_eq!(state.quantity, 60.0);
        assert!((state.average_cost - 10.0).abs() < 1e-12);
        assert!((state.realized_pnl - 200.0).abs() < 1e-12);

        // A was the only ranked broker on day 2 and sold 40
        assert_eq!(points[1].bps_factor, -40.0);
    }

    #[test]
    fn test_ranking_uses_previous_close_state() {
        // top_n = 1 isolates which broker leads the ranking
        let engine = InventoryReplayEngine::new(ReplayConfig { top_n: 1 });
        let mut closes = CloseLookup::new();
        closes.insert(day(1), 10.0);
        closes.insert(day(2), 10.0);
        closes.insert(day(3), 10.0);

        let tape = vec![
            // Day 1: A bought cheap, B bought dear
            tx(1, "A", 5.0, 100.0, 0.0),
            tx(1, "B", 12.0, 100.0, 0.0),
            // Day 2: B sells at a huge price; A buys more
            tx(2, "A", 10.0, 30.0, 0.0),
            tx(2, "B", 50.0, 0.0, 100.0),
            // Day 3: both trade
            tx(3, "A", 10.0, 7.0, 0.0),
            tx(3, "B", 10.0, 11.0, 0.0),
        ];
        let points = engine.replay(&tape, &closes);

        assert_eq!(points[0].bps_factor, 0.0);
        // Day 2 ranks on day-1 closing marks: A +500, B -200. B's sale is ignored.
        assert_eq!(points[1].bps_factor, 30.0);
        // Day 3 ranks after B realized (50-12)*100 = 3800 on day 2
        assert_eq!(points[2].bps_factor, 11.0);
    }

    #[test]
    fn test_external_close_overrides_vwap() {
        let engine = InventoryReplayEngine::new(ReplayConfig { top_n: 1 });
        // A holds 100 from 10, B holds 300 from 20: B leads above 25, A below
        let tape = vec![
            tx(1, "A", 10.0, 100.0, 0.0),
            tx(1, "B", 20.0, 300.0, 0.0),
            tx(2, "A", 20.0, 1.0, 0.0),
            tx(2, "B", 20.0, 2.0, 0.0),
        ];
        let mut closes = CloseLookup::new();
        closes.insert(day(2), 40.0);

        let points = engine.replay(&tape, &closes);
        assert_eq!(points[1].price, 40.0);
        assert_eq!(points[1].bps_factor, 2.0);

        // Same tape valued at the day-2 VWAP of 20 ranks A first
        let points = engine.replay(&tape, &CloseLookup::new());
        assert!((points[1].price - 20.0).abs() < 1e-12);
        assert_eq!(points[1].bps_factor, 1.0);

        let mut book = BrokerBook::new();
        engine.replay_into(tape.iter().filter(|t| t.date == day(1)), &closes, &mut book);
        let day_two: Vec<&Transaction> = tape.iter().filter(|t| t.date == day(2)).collect();
        let evaluation = engine.evaluate_day(day(2), &day_two, &closes, &book);
        assert_eq!(evaluation.winners, vec!["B".to_string()]);
        assert_eq!(evaluation.point.price, 40.0);
    }

    #[test]
    fn test_vwap_fallback_and_top_five() {
        let mut tape = Vec::new();
        for (i, broker) in ["A", "B", "C", "D", "E", "F"].iter().enumerate() {
            tape.push(tx(1, broker, 10.0 - i as f64, 10.0, 0.0));
        }
        for broker in ["A", "B", "C", "D", "E", "F"] {
            tape.push(tx(2, broker, 20.0, 1.0, 0.0));
        }
        let points = engine().replay(&tape, &CloseLookup::new());

        // Day 1 VWAP over equal volumes at 10..5
        assert!((points[0].price - 7.5).abs() < 1e-12);
        // A bought dearest on day 1 and is left out of the top five
        assert_eq!(points[1].bps_factor, 5.0);
    }

    #[test]
    fn test_one_point_per_trading_day_sorted() {
        let tape = vec![
            tx(9, "A", 10.0, 1.0, 0.0),
            tx(2, "A", 10.0, 1.0, 0.0),
            tx(5, "B", 10.0, 0.0, 1.0),
            tx(2, "B", 10.0, 0.0, 1.0),
        ];
        let points = engine().replay(&tape, &CloseLookup::new());
        let dates: Vec<NaiveDate> = points.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![day(2), day(5), day(9)]);
    }

    #[test]
    fn test_zero_volume_day_prices_at_zero() {
        let tape = vec![tx(1, "A", 10.0, 0.0, 0.0)];
        let points = engine().replay(&tape, &CloseLookup::new());
        assert_eq!(points[0].price, 0.0);
    }

    #[test]
    fn test_replay_is_idempotent() {
        let tape: Vec<Transaction> = (1..=20)
            .flat_map(|d| {
                vec![
                    tx(d, "A", 10.0 + d as f64 * 0.3, (d % 3) as f64 * 10.0, (d % 2) as f64 * 7.0),
                    tx(d, "B", 11.0 - d as f64 * 0.1, (d % 4) as f64 * 5.0, 3.0),
                    tx(d, "C", 9.5, 2.0, (d % 5) as f64),
                ]
            })
            .collect();
        let a = engine().replay(&tape, &CloseLookup::new());
        let b = engine().replay(&tape, &CloseLookup::new());
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);
    }
}
