//! Parallel per-stock batch driver
//!
//! Stocks share only read-only market tables, so each one runs its own
//! pipeline on a local rayon pool. A failing stock is logged and reported
//! without stopping the rest of the batch.

use rayon::prelude::*;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::config::Config;
use crate::data::MarketData;
use crate::error::{Error, Result};
use crate::pipeline::{SmartStatus, StockPipeline};

/// A stock whose pipeline failed
#[derive(Debug)]
pub struct StockFailure {
    pub stock_id: String,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    /// Signal file already present
    pub skipped: Vec<String>,
    /// Written with the original signal only
    pub smart_missing: Vec<String>,
    pub failed: Vec<StockFailure>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.skipped.len() + self.failed.len()
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "Batch finished in {:.1}s: {} succeeded ({} without smart signal), {} skipped, {} failed\n",
            self.elapsed.as_secs_f64(),
            self.succeeded.len(),
            self.smart_missing.len(),
            self.skipped.len(),
            self.failed.len()
        );
        for f in &self.failed {
            out.push_str(&format!("  {}: {}\n", f.stock_id, f.error));
        }
        out
    }
}

enum StockResult {
    Done { smart: bool },
    Skipped,
    Failed(Error),
}

pub struct BatchRunner<'a> {
    config: &'a Config,
    market: &'a MarketData,
}

impl<'a> BatchRunner<'a> {
    pub fn new(config: &'a Config, market: &'a MarketData) -> Self {
        Self { config, market }
    }

    pub fn run(&self, stock_ids: &[String]) -> Result<BatchReport> {
        let start = Instant::now();

        let mut builder = rayon::ThreadPoolBuilder::new();
        if self.config.batch.threads > 0 {
            builder = builder.num_threads(self.config.batch.threads);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create thread pool: {}", e)))?;

        info!(
            stocks = stock_ids.len(),
            threads = pool.current_num_threads(),
            "Starting batch"
        );

        let results: Vec<(String, StockResult)> = pool.install(|| {
            stock_ids
                .par_iter()
                .map(|stock_id| (stock_id.clone(), self.run_one(stock_id)))
                .collect()
        });

        let mut report = BatchReport::default();
        for (stock_id, result) in results {
            match result {
                StockResult::Done { smart } => {
                    if !smart {
                        report.smart_missing.push(stock_id.clone());
                    }
                    report.succeeded.push(stock_id);
                }
                StockResult::Skipped => report.skipped.push(stock_id),
                StockResult::Failed(error) => report.failed.push(StockFailure { stock_id, error }),
            }
        }
        report.elapsed = start.elapsed();

        info!(
            succeeded = report.succeeded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Batch complete"
        );
        Ok(report)
    }

    fn run_one(&self, stock_id: &str) -> StockResult {
        if self.config.batch.skip_existing && self.config.data.signal_path(stock_id).exists() {
            return StockResult::Skipped;
        }

        match StockPipeline::new(self.config, self.market).run(stock_id) {
            Ok(outcome) => StockResult::Done {
                smart: matches!(outcome.smart, SmartStatus::Identified { .. }),
            },
            Err(e) => {
                error!(stock = %stock_id, error = %e, "Stock pipeline failed");
                StockResult::Failed(e)
            }
        }
    }
}
