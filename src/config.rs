//! Configuration loading and validation

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::SignalSource;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Input and output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Directory (under data_dir) holding one transaction file per stock
    #[serde(default = "default_transactions_dir")]
    pub transactions_dir: String,
    #[serde(default = "default_prices_file")]
    pub prices_file: String,
    #[serde(default = "default_market_returns_file")]
    pub market_returns_file: String,
    #[serde(default = "default_announcements_file")]
    pub announcements_file: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            output_dir: default_output_dir(),
            transactions_dir: default_transactions_dir(),
            prices_file: default_prices_file(),
            market_returns_file: default_market_returns_file(),
            announcements_file: default_announcements_file(),
        }
    }
}

impl DataConfig {
    pub fn transactions_path(&self, stock_id: &str) -> PathBuf {
        self.data_dir
            .join(&self.transactions_dir)
            .join(format!("{}.csv", stock_id))
    }

    pub fn prices_path(&self) -> PathBuf {
        self.data_dir.join(&self.prices_file)
    }

    pub fn market_returns_path(&self) -> PathBuf {
        self.data_dir.join(&self.market_returns_file)
    }

    pub fn announcements_path(&self) -> PathBuf {
        self.data_dir.join(&self.announcements_file)
    }

    pub fn signal_path(&self, stock_id: &str) -> PathBuf {
        self.output_dir
            .join("signals")
            .join(format!("{}.csv", stock_id))
    }

    pub fn cluster_path(&self, stock_id: &str) -> PathBuf {
        self.output_dir
            .join("clusters")
            .join(format!("{}.csv", stock_id))
    }

    pub fn trades_path(&self) -> PathBuf {
        self.output_dir.join("trades.csv")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join("backtest_summary.json")
    }

    pub fn front_run_path(&self) -> PathBuf {
        self.output_dir.join("front_run.csv")
    }
}

/// Behavioral segmentation thresholds.
///
/// The lookbacks, member floor and cluster count are empirically tuned;
/// keep them configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Calendar-day lookback tried first
    #[serde(default = "default_lookback_days")]
    pub default_lookback_days: i64,
    /// Wider lookback used when the first window is too sparse
    #[serde(default = "default_fallback_lookback_days")]
    pub fallback_lookback_days: i64,
    /// Distinct trading days required before widening stops
    #[serde(default = "default_min_trading_days")]
    pub min_trading_days: usize,
    /// Brokers active fewer days than this are not clustered
    #[serde(default = "default_min_active_days")]
    pub min_active_days: u32,
    #[serde(default = "default_n_clusters")]
    pub n_clusters: usize,
    #[serde(default = "default_n_components")]
    pub n_components: usize,
    /// Member floor for accumulator candidates
    #[serde(default = "default_min_cluster_members")]
    pub min_cluster_members: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_n_init")]
    pub n_init: usize,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            default_lookback_days: default_lookback_days(),
            fallback_lookback_days: default_fallback_lookback_days(),
            min_trading_days: default_min_trading_days(),
            min_active_days: default_min_active_days(),
            n_clusters: default_n_clusters(),
            n_components: default_n_components(),
            min_cluster_members: default_min_cluster_members(),
            seed: default_seed(),
            n_init: default_n_init(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Number of most profitable brokers whose flow forms the daily signal
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
        }
    }
}

/// Event trade simulation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Trading rows between entry and the announcement row
    #[serde(default = "default_entry_offset")]
    pub entry_offset: usize,
    /// Fractional loss that closes the position (0.07 = 7%)
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    /// Minimum signal_sum * entry_price to open a trade
    #[serde(default = "default_min_notional")]
    pub min_notional: f64,
    #[serde(default)]
    pub signal_source: SignalSource,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Trades listed in the summary ranking
    #[serde(default = "default_top_trades")]
    pub top_trades: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            entry_offset: default_entry_offset(),
            stop_loss_pct: default_stop_loss_pct(),
            min_notional: default_min_notional(),
            signal_source: SignalSource::default(),
            start_date: None,
            end_date: None,
            top_trades: default_top_trades(),
        }
    }
}

impl BacktestConfig {
    /// Whether an announcement falls inside the configured date range
    pub fn in_range(&self, date: NaiveDate) -> bool {
        self.start_date.map_or(true, |start| date >= start)
            && self.end_date.map_or(true, |end| date < end)
    }
}

/// Research scans over produced signal files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_front_run_min_qty")]
    pub front_run_min_qty: f64,
    #[serde(default = "default_front_run_min_growth_pct")]
    pub front_run_min_growth_pct: f64,
    #[serde(default = "default_front_run_window")]
    pub front_run_window: usize,
    #[serde(default = "default_timing_lookback")]
    pub timing_lookback: usize,
    #[serde(default = "default_daily_window")]
    pub daily_window: usize,
    #[serde(default = "default_daily_min_qty")]
    pub daily_min_qty: f64,
    /// JSON holdings checked by the daily scan
    #[serde(default)]
    pub portfolio_file: Option<PathBuf>,
    /// Fractional gain that flags a holding for profit taking (0.20 = 20%)
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            front_run_min_qty: default_front_run_min_qty(),
            front_run_min_growth_pct: default_front_run_min_growth_pct(),
            front_run_window: default_front_run_window(),
            timing_lookback: default_timing_lookback(),
            daily_window: default_daily_window(),
            daily_min_qty: default_daily_min_qty(),
            portfolio_file: None,
            take_profit_pct: default_take_profit_pct(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Worker threads (0 = one per core)
    #[serde(default)]
    pub threads: usize,
    /// Skip stocks whose signal file already exists
    #[serde(default = "default_true")]
    pub skip_existing: bool,
    /// Max elapsed time for retrying transient read failures
    #[serde(default = "default_read_retry_ms")]
    pub read_retry_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            skip_existing: true,
            read_retry_ms: default_read_retry_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_transactions_dir() -> String {
    "transactions".to_string()
}

fn default_prices_file() -> String {
    "prices.csv".to_string()
}

fn default_market_returns_file() -> String {
    "market_returns.csv".to_string()
}

fn default_announcements_file() -> String {
    "announcements.csv".to_string()
}

fn default_lookback_days() -> i64 { 60 }
fn default_fallback_lookback_days() -> i64 { 180 }
fn default_min_trading_days() -> usize { 5 }
fn default_min_active_days() -> u32 { 2 }
fn default_n_clusters() -> usize { 4 }
fn default_n_components() -> usize { 2 }
fn default_min_cluster_members() -> usize { 3 }
fn default_seed() -> u64 { 42 }
fn default_n_init() -> usize { 10 }
fn default_max_iterations() -> usize { 300 }
fn default_tolerance() -> f64 { 1e-4 }

fn default_top_n() -> usize { 5 }

fn default_entry_offset() -> usize { 5 }
fn default_stop_loss_pct() -> f64 { 0.07 }
fn default_min_notional() -> f64 { 10_000_000.0 }
fn default_top_trades() -> usize { 10 }

fn default_front_run_min_qty() -> f64 { 10_000.0 }
fn default_front_run_min_growth_pct() -> f64 { 10.0 }
fn default_front_run_window() -> usize { 5 }
fn default_timing_lookback() -> usize { 20 }
fn default_daily_window() -> usize { 5 }
fn default_daily_min_qty() -> f64 { 500_000.0 }
fn default_take_profit_pct() -> f64 { 0.20 }

fn default_read_retry_ms() -> u64 {
    2000
}

impl Config {
    /// Load configuration from file, with environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables, e.g. BROKERFLOW__BACKTEST__STOP_LOSS_PCT
            .add_source(
                config::Environment::with_prefix("BROKERFLOW")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let c = &self.clustering;
        if c.n_clusters < 2 {
            anyhow::bail!("clustering.n_clusters must be at least 2, got {}", c.n_clusters);
        }
        if c.n_components == 0 || c.n_components > 3 {
            anyhow::bail!(
                "clustering.n_components must be between 1 and 3, got {}",
                c.n_components
            );
        }
        if c.default_lookback_days <= 0 {
            anyhow::bail!("clustering.default_lookback_days must be positive");
        }
        if c.fallback_lookback_days < c.default_lookback_days {
            anyhow::bail!(
                "clustering.fallback_lookback_days ({}) cannot be shorter than default_lookback_days ({})",
                c.fallback_lookback_days,
                c.default_lookback_days
            );
        }
        if c.n_init == 0 || c.max_iterations == 0 {
            anyhow::bail!("clustering.n_init and clustering.max_iterations must be positive");
        }

        if self.replay.top_n == 0 {
            anyhow::bail!("replay.top_n must be positive");
        }

        let b = &self.backtest;
        if b.entry_offset == 0 {
            anyhow::bail!("backtest.entry_offset must be positive");
        }
        if !(b.stop_loss_pct > 0.0 && b.stop_loss_pct < 1.0) {
            anyhow::bail!(
                "backtest.stop_loss_pct must be in (0, 1), got {}",
                b.stop_loss_pct
            );
        }
        if let (Some(start), Some(end)) = (b.start_date, b.end_date) {
            if start >= end {
                anyhow::bail!("backtest.start_date must be before end_date");
            }
        }

        if self.scan.front_run_window == 0 || self.scan.daily_window == 0 {
            anyhow::bail!("scan windows must be positive");
        }
        if self.scan.take_profit_pct <= 0.0 {
            anyhow::bail!("scan.take_profit_pct must be positive");
        }

        Ok(())
    }

    /// Human-readable summary of the effective configuration
    pub fn display(&self) -> String {
        format!(
            r#"Configuration:
  Data:
    data_dir: {}
    output_dir: {}
  Clustering:
    lookback: {}d (fallback {}d, min {} trading days)
    min_active_days: {}
    clusters: {} on {} components (seed {}, n_init {})
    min_cluster_members: {}
  Replay:
    top_n: {}
  Backtest:
    entry_offset: {} rows
    stop_loss: {}%
    min_notional: {}
    signal_source: {}
  Batch:
    threads: {}
    skip_existing: {}
"#,
            self.data.data_dir.display(),
            self.data.output_dir.display(),
            self.clustering.default_lookback_days,
            self.clustering.fallback_lookback_days,
            self.clustering.min_trading_days,
            self.clustering.min_active_days,
            self.clustering.n_clusters,
            self.clustering.n_components,
            self.clustering.seed,
            self.clustering.n_init,
            self.clustering.min_cluster_members,
            self.replay.top_n,
            self.backtest.entry_offset,
            self.backtest.stop_loss_pct * 100.0,
            self.backtest.min_notional,
            self.backtest.signal_source,
            if self.batch.threads == 0 {
                "auto".to_string()
            } else {
                self.batch.threads.to_string()
            },
            self.batch.skip_existing,
        )
    }
}
