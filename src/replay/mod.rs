//! Stateful order-flow replay
//!
//! - Per-broker inventory book
//! - Day-by-day replay with rank-before-mutate ordering
//! - Original vs smart signal comparison

pub mod comparator;
pub mod engine;
pub mod state;

pub use comparator::SignalComparator;
pub use engine::{DayEvaluation, InventoryReplayEngine};
pub use state::{BrokerBook, BrokerState, DailyAction};
