//! Broker Flow Library
//!
//! Broker behavioral segmentation and stateful order-flow replay for
//! pre-announcement accumulation research.

pub mod backtest;
pub mod batch;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod replay;
pub mod smart_money;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
