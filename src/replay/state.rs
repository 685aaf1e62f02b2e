//! Per-broker inventory state
//!
//! Tracks position, average cost and realized P&L for one broker within a
//! single replay run. Shorts are not modeled: selling past an empty
//! inventory leaves the position flat.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::BrokerId;

/// Running inventory of one broker
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokerState {
    /// Shares held, never negative
    pub quantity: f64,
    /// Volume-weighted cost of the shares held
    pub average_cost: f64,
    pub realized_pnl: f64,
}

impl BrokerState {
    /// Unrealized P&L marked at `price`
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.average_cost) * self.quantity
    }

    /// Realized plus unrealized P&L marked at `price`
    pub fn total_pnl(&self, price: f64) -> f64 {
        self.realized_pnl + self.unrealized_pnl(price)
    }

    /// Apply one day's net action at its volume-weighted price
    pub fn apply(&mut self, net_buy_qty: f64, avg_price: f64) {
        if net_buy_qty > 0.0 {
            let new_quantity = self.quantity + net_buy_qty;
            self.average_cost =
                (self.quantity * self.average_cost + net_buy_qty * avg_price) / new_quantity;
            self.quantity = new_quantity;
        } else if net_buy_qty < 0.0 {
            let sell_qty = -net_buy_qty;
            if self.quantity > 0.0 {
                let closed = sell_qty.min(self.quantity);
                self.realized_pnl += (avg_price - self.average_cost) * closed;
                self.quantity = (self.quantity - sell_qty).max(0.0);
            }
        }
    }
}

/// A broker's net activity on one day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAction {
    pub broker_id: BrokerId,
    pub net_buy_qty: f64,
    /// Volume-weighted price of the day's trades (0 with no volume)
    pub avg_price: f64,
}

/// Owned broker_id -> state map for one replay pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrokerBook {
    states: BTreeMap<BrokerId, BrokerState>,
}

impl BrokerBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, broker_id: &str) -> Option<&BrokerState> {
        self.states.get(broker_id)
    }

    pub(crate) fn len(&self) -> usize {
        self.states.len()
    }

    /// Top `n` brokers by total P&L marked at `price`, best first.
    /// Equal P&L ranks by broker id.
    pub fn rank(&self, price: f64, n: usize) -> Vec<(BrokerId, f64)> {
        let mut ranked: Vec<(BrokerId, f64)> = self
            .states
            .iter()
            .map(|(id, state)| (id.clone(), state.total_pnl(price)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }

    /// Apply a day's actions; brokers absent from `actions` are untouched
    pub fn apply(&mut self, actions: &[DailyAction]) {
        for action in actions {
            self.states
                .entry(action.broker_id.clone())
                .or_default()
                .apply(action.net_buy_qty, action.avg_price);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_then_partial_sell() {
        let mut state = BrokerState::default();
        state.apply(100.0, 10.0);
        assert_eq!(state.quantity, 100.0);
        assert!((state.average_cost - 10.0).abs() < 1e-12);

        state.apply(-40.0, 15.0);
        assert!((state.realized_pnl - 200.0).abs() < 1e-12);
        assert_eq!(state.quantity, 60.0);
        assert!((state.average_cost - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_average_cost_blends_buys() {
        let mut state = BrokerState::default();
        state.apply(100.0, 10.0);
        state.apply(100.0, 20.0);
        assert_eq!(state.quantity, 200.0);
        assert!((state.average_cost - 15.0).abs() < 1e-12);
        assert!((state.total_pnl(18.0) - 600.0).abs() < 1e-12);
    }

    #[test]
    fn test_oversell_is_capped_at_flat() {
        let mut state = BrokerState::default();
        state.apply(50.0, 10.0);
        state.apply(-80.0, 12.0);
        assert_eq!(state.quantity, 0.0);
        assert!((state.realized_pnl - 100.0).abs() < 1e-12);

        // Selling from flat changes nothing
        state.apply(-30.0, 99.0);
        assert_eq!(state.quantity, 0.0);
        assert!((state.realized_pnl - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_quantity_never_negative() {
        let mut state = BrokerState::default();
        let actions = [
            (-10.0, 5.0),
            (30.0, 7.0),
            (-45.0, 6.0),
            (12.0, 8.0),
            (-1.0, 9.0),
            (-100.0, 1.0),
            (3.0, 2.0),
        ];
        for (qty, price) in actions {
            state.apply(qty, price);
            assert!(state.quantity >= 0.0);
            assert!(state.average_cost >= 0.0);
        }
    }

    #[test]
    fn test_rank_orders_by_pnl_then_id() {
        let mut book = BrokerBook::new();
        book.apply(&[
            DailyAction { broker_id: "B".into(), net_buy_qty: 10.0, avg_price: 10.0 },
            DailyAction { broker_id: "A".into(), net_buy_qty: 10.0, avg_price: 10.0 },
            DailyAction { broker_id: "C".into(), net_buy_qty: 10.0, avg_price: 5.0 },
        ]);
        let ranked = book.rank(12.0, 2);
        assert_eq!(ranked[0].0, "C");
        assert_eq!(ranked[1].0, "A");
        assert_eq!(ranked.len(), 2);
    }
}
