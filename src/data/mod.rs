//! Tabular collaborators: CSV loading and persistence

pub mod loader;
pub mod writer;

pub use loader::{
    list_stock_ids, load_announcements, load_signal_file, load_signal_set, load_transactions,
    most_active_stocks, read_stock_list, CloseLookup, MarketData,
};
pub use writer::{write_csv, write_json};
