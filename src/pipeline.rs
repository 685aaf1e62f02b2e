//! Per-stock pipeline
//!
//! tape -> adaptive window features -> clustering -> accumulator subset ->
//! original/smart replay -> signal file.
//!
//! Segmentation failures only cost the smart column; the original signal
//! is still written.

use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::Config;
use crate::data::{load_transactions, write_csv, MarketData};
use crate::error::Result;
use crate::replay::SignalComparator;
use crate::smart_money::{
    BehaviorClusterer, ClusterId, ClusteringResult, FeatureExtractor, FeatureWindow,
};
use crate::types::{BrokerId, SignalRow, Transaction};

/// Whether a smart subset was found for a stock
#[derive(Debug, Clone, PartialEq)]
pub enum SmartStatus {
    Identified { cluster: ClusterId, brokers: usize },
    /// Segmentation was skipped; the reason is the error text
    Missing(String),
}

impl SmartStatus {
    pub fn is_identified(&self) -> bool {
        matches!(self, SmartStatus::Identified { .. })
    }
}

/// Result of one stock's pipeline run
#[derive(Debug, Clone)]
pub struct StockOutcome {
    pub stock_id: String,
    pub trading_days: usize,
    pub smart: SmartStatus,
    pub signal_path: PathBuf,
    /// Written only when clustering succeeded
    pub cluster_path: Option<PathBuf>,
}

/// Segmentation output for one stock
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub window: FeatureWindow,
    pub result: ClusteringResult,
}

pub struct StockPipeline<'a> {
    config: &'a Config,
    market: &'a MarketData,
}

impl<'a> StockPipeline<'a> {
    pub fn new(config: &'a Config, market: &'a MarketData) -> Self {
        Self { config, market }
    }

    /// Adaptive window feature extraction followed by clustering
    pub fn segment(&self, stock_id: &str, transactions: &[Transaction]) -> Result<Segmentation> {
        let extractor = FeatureExtractor::new(self.config.clustering.clone());
        let (window, features) = extractor.extract_adaptive(stock_id, transactions)?;
        let result = BehaviorClusterer::new(self.config.clustering.clone()).cluster(stock_id, &features)?;
        Ok(Segmentation { window, result })
    }

    /// Joined signal series. Smart failures that only skip the smart
    /// signal are absorbed into the status; anything else propagates.
    pub fn signals(
        &self,
        stock_id: &str,
        transactions: &[Transaction],
    ) -> Result<(Vec<SignalRow>, SmartStatus, Option<Segmentation>)> {
        match self.segment(stock_id, transactions) {
            Ok(seg) => {
                let smart = seg.result.smart_brokers();
                let status = SmartStatus::Identified {
                    cluster: seg.result.accumulator,
                    brokers: smart.len(),
                };
                let rows = self.compare(stock_id, transactions, Some(&smart));
                Ok((rows, status, Some(seg)))
            }
            Err(e) if e.skips_smart_signal() => {
                warn!(stock = %stock_id, error = %e, "No smart subset, writing original signal only");
                let rows = self.compare(stock_id, transactions, None);
                Ok((rows, SmartStatus::Missing(e.to_string()), None))
            }
            Err(e) => Err(e),
        }
    }

    fn compare(
        &self,
        stock_id: &str,
        transactions: &[Transaction],
        smart: Option<&BTreeSet<BrokerId>>,
    ) -> Vec<SignalRow> {
        let closes = self.market.closes_for(stock_id);
        SignalComparator::new(self.config.replay.clone()).compare(transactions, &closes, smart)
    }

    /// Full run for one stock, writing the signal file and cluster report
    pub fn run(&self, stock_id: &str) -> Result<StockOutcome> {
        let data = &self.config.data;
        let transactions = load_transactions(data, stock_id, self.config.batch.read_retry_ms)?;
        let (rows, smart, segmentation) = self.signals(stock_id, &transactions)?;

        let signal_path = data.signal_path(stock_id);
        write_csv(&signal_path, &rows)?;

        let cluster_path = match &segmentation {
            Some(seg) => {
                let path = data.cluster_path(stock_id);
                write_csv(&path, &seg.result.report_rows())?;
                Some(path)
            }
            None => None,
        };

        info!(
            stock = %stock_id,
            trading_days = rows.len(),
            smart = smart.is_identified(),
            path = %signal_path.display(),
            "Signal file written"
        );

        Ok(StockOutcome {
            stock_id: stock_id.to_string(),
            trading_days: rows.len(),
            smart,
            signal_path,
            cluster_path,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::DataConfig;
    use crate::data::load_signal_file;
    use crate::error::Error;
    use chrono::{Duration, NaiveDate};
    use std::fmt::Write as _;
    use std::path::Path;
    use tempfile::tempdir;

    /// Twelve brokers over 30 trading days in four behavioral styles
    pub(crate) fn synthetic_tape(stock_id: &str) -> String {
        let mut csv = String::from("date,stock_id,broker_id,price,buy,sell\n");
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        for day in 0..30i64 {
            let date = start + Duration::days(day);
            let price = 100.0 + day as f64 * 0.5;
            for b in 0..12 {
                let style = b % 4;
                let (active, buy, sell) = match style {
                    // Steady accumulators
                    0 => (true, 5_000.0 + b as f64 * 10.0, 0.0),
                    // Day traders
                    1 => (true, 3_000.0, 3_000.0),
                    // Occasional small traders
                    2 => (day % 5 == 0, 100.0, 50.0),
                    // Large sporadic sellers
                    _ => (day % 3 == 0, 0.0, 20_000.0),
                };
                if active {
                    let _ = writeln!(
                        csv,
                        "{},{},B{:02},{},{},{}",
                        date, stock_id, b, price, buy, sell
                    );
                }
            }
        }
        csv
    }

    pub(crate) fn config_in(dir: &Path) -> Config {
        Config {
            data: DataConfig {
                data_dir: dir.join("data"),
                output_dir: dir.join("out"),
                ..DataConfig::default()
            },
            ..Config::default()
        }
    }

    pub(crate) fn write_tape(config: &Config, stock_id: &str, body: &str) {
        let path = config.data.transactions_path(stock_id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn test_run_writes_signal_and_cluster_files() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        write_tape(&config, "2330", &synthetic_tape("2330"));

        let market = MarketData::default();
        let outcome = StockPipeline::new(&config, &market).run("2330").unwrap();

        assert_eq!(outcome.trading_days, 30);
        assert!(outcome.smart.is_identified());
        assert!(outcome.cluster_path.as_ref().unwrap().exists());

        let rows = load_signal_file(&outcome.signal_path, 100).unwrap();
        assert_eq!(rows.len(), 30);
        assert!(rows.iter().all(|r| r.smart_bps.is_some()));
        assert_eq!(rows[0].original_bps, 0.0);
        assert!(rows.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_too_few_brokers_writes_original_only() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let tape = "date,stock_id,broker_id,price,buy,sell\n\
                    2025-01-02,1234,A,10,100,0\n\
                    2025-01-03,1234,A,11,0,50\n\
                    2025-01-03,1234,B,11,20,0\n\
                    2025-01-06,1234,B,12,20,0\n";
        write_tape(&config, "1234", tape);

        let market = MarketData::default();
        let outcome = StockPipeline::new(&config, &market).run("1234").unwrap();

        assert!(!outcome.smart.is_identified());
        assert!(outcome.cluster_path.is_none());
        let rows = load_signal_file(&outcome.signal_path, 100).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.smart_bps.is_none()));
    }

    #[test]
    fn test_missing_tape_is_stock_fatal() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let market = MarketData::default();
        let err = StockPipeline::new(&config, &market).run("0000").unwrap_err();
        assert!(matches!(err, Error::MissingData(_)));
        assert!(err.is_stock_fatal());
    }
}
