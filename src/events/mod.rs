//! Announcement-driven analysis over per-stock signal series
//!
//! - `aligner` - announcement date to trading row alignment
//! - `simulator` - long-only event trades with stop-loss and alpha
//! - `summary` - backtest statistics
//! - `front_run` - pre-announcement flow scan
//! - `timing` - signal profile around announcements
//! - `daily` - daily entry scan and holding review

pub mod aligner;
pub mod daily;
pub mod front_run;
pub mod simulator;
pub mod summary;
pub mod timing;

pub use aligner::{align, locate, AlignedEvent};
pub use daily::{
    load_portfolio, review_holdings, scan_entries, EntryCandidate, Holding, HoldingAction,
    HoldingReview, Portfolio,
};
pub use front_run::{summarize_by_stock, FrontRunRow, FrontRunScanner, StockFrontRunSummary};
pub use simulator::{compound_market_return, TradeSimulator};
pub use summary::BacktestSummary;
pub use timing::{profile, TimingBucket, TimingProfile};
