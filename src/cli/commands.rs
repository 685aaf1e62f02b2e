//! CLI command implementations

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::path::Path;
use tracing::{info, warn};

use crate::backtest::Backtester;
use crate::batch::BatchRunner;
use crate::config::Config;
use crate::data::{
    list_stock_ids, load_signal_set, load_transactions, most_active_stocks, read_stock_list,
    write_csv, MarketData,
};
use crate::events::{
    load_portfolio, profile, review_holdings, scan_entries, summarize_by_stock, FrontRunScanner,
};
use crate::pipeline::{SmartStatus, StockPipeline};
use crate::types::SignalSource;

/// Segment one stock's brokers and print the cluster summary
pub fn cluster(config: &Config, stock_id: &str) -> Result<()> {
    let market = MarketData::default();
    let transactions = load_transactions(&config.data, stock_id, config.batch.read_retry_ms)
        .with_context(|| format!("Failed to load transactions for {}", stock_id))?;

    let seg = StockPipeline::new(config, &market)
        .segment(stock_id, &transactions)
        .with_context(|| format!("Clustering failed for {}", stock_id))?;

    let path = config.data.cluster_path(stock_id);
    write_csv(&path, &seg.result.report_rows())?;

    println!("\n=== BROKER CLUSTERS: {} ===\n", stock_id);
    println!(
        "Window: {} to {} ({} days lookback, {} trading days{})",
        seg.window.start,
        seg.window.end,
        seg.window.lookback_days,
        seg.window.trading_days,
        if seg.window.widened { ", widened" } else { "" }
    );
    println!(
        "Explained variance: {}",
        seg.result
            .explained_variance_ratio
            .iter()
            .map(|v| format!("{:.1}%", v * 100.0))
            .collect::<Vec<_>>()
            .join(" / ")
    );
    println!();
    println!(
        "{:>8} {:>8} {:>10} {:>10} {:>12}",
        "Cluster", "Members", "Frequency", "Overnight", "LogVolume"
    );
    for s in &seg.result.summaries {
        let marker = if s.cluster_id == seg.result.accumulator { " <- smart" } else { "" };
        println!(
            "{:>8} {:>8} {:>10.3} {:>10.3} {:>12.2}{}",
            s.cluster_id,
            s.member_count,
            s.mean_frequency,
            s.mean_overnight_ratio,
            s.mean_log_avg_daily_volume,
            marker
        );
    }

    let smart = seg.result.smart_brokers();
    println!(
        "\nSmart brokers ({}): {}",
        smart.len(),
        smart.into_iter().collect::<Vec<_>>().join(", ")
    );
    if let Some(acc) = seg.result.summary(seg.result.accumulator) {
        println!(
            "Accumulator cluster {}: mean overnight ratio {:.3}, {} members",
            acc.cluster_id, acc.mean_overnight_ratio, acc.member_count
        );
    }
    println!("Report written to {}", path.display());
    Ok(())
}

/// Run the full pipeline for one stock
pub fn signal(config: &Config, stock_id: &str) -> Result<()> {
    let market = MarketData::load(&config.data, config.batch.read_retry_ms)?;
    let outcome = StockPipeline::new(config, &market)
        .run(stock_id)
        .with_context(|| format!("Signal generation failed for {}", stock_id))?;

    match &outcome.smart {
        SmartStatus::Identified { cluster, brokers } => println!(
            "{}: {} trading days, smart cluster {} with {} brokers",
            stock_id, outcome.trading_days, cluster, brokers
        ),
        SmartStatus::Missing(reason) => println!(
            "{}: {} trading days, original signal only ({})",
            stock_id, outcome.trading_days, reason
        ),
    }
    println!("Signal file: {}", outcome.signal_path.display());
    Ok(())
}

/// Run the pipeline over many stocks in parallel
pub fn batch(
    config: &Config,
    stocks: Vec<String>,
    stocks_file: Option<&Path>,
    top: Option<usize>,
) -> Result<()> {
    let mut ids = stocks;
    if let Some(path) = stocks_file {
        ids.extend(
            read_stock_list(path)
                .with_context(|| format!("Failed to read stock list {}", path.display()))?,
        );
    }
    if ids.is_empty() {
        let dir = config.data.data_dir.join(&config.data.transactions_dir);
        ids = list_stock_ids(&dir)
            .with_context(|| format!("Failed to list transaction files in {}", dir.display()))?;
        info!(stocks = ids.len(), "Discovered stocks from transaction files");
    }
    ids.sort();
    ids.dedup();

    if let Some(n) = top {
        let ranked = most_active_stocks(&config.data, &ids, n, config.batch.read_retry_ms)
            .context("Failed to rank stocks by activity")?;
        println!("Most active {} of {} stocks:", ranked.len(), ids.len());
        for (stock_id, rows) in &ranked {
            println!("  {:>8} {:>10} rows", stock_id, rows);
        }
        ids = ranked.into_iter().map(|(stock_id, _)| stock_id).collect();
    }

    let market = MarketData::load(&config.data, config.batch.read_retry_ms)?;
    let report = BatchRunner::new(config, &market).run(&ids)?;
    print!("{}", report.render());
    Ok(())
}

/// Event backtest over written signal files
pub fn backtest(config: &Config, source: Option<SignalSource>, compare: bool) -> Result<()> {
    let tester = Backtester::new(config);

    if compare {
        let (smart, original) = tester.compare()?;
        println!("\n=== SIGNAL A/B COMPARISON ===\n");
        print!("{}", smart.summary.render());
        println!();
        print!("{}", original.summary.render());
        println!(
            "\nAlpha edge (smart - original): {:.2}% avg, {:.2}% total",
            smart.summary.avg_alpha_pct - original.summary.avg_alpha_pct,
            smart.summary.total_alpha_pct - original.summary.total_alpha_pct
        );
        return Ok(());
    }

    let source = source.unwrap_or(config.backtest.signal_source);
    let run = tester.run(source)?;
    if run.unaligned > 0 {
        warn!(events = run.unaligned, "Events skipped for lack of trading history");
    }
    println!();
    print!("{}", run.summary.render());
    println!("\nLedger: {}", config.data.trades_path().display());
    Ok(())
}

/// Pre-announcement flow scan
pub fn front_run(config: &Config, source: Option<SignalSource>) -> Result<()> {
    let tester = Backtester::new(config);
    let events = tester.events()?;
    let signals = tester.signals(&events)?;
    let source = source.unwrap_or(config.backtest.signal_source);

    let rows = FrontRunScanner::new(&config.scan, source).scan(&events, &signals);
    write_csv(&config.data.front_run_path(), &rows)?;

    println!("\n=== FRONT-RUN SCAN ({} signal) ===\n", source);
    println!(
        "{:>8} {:>12} {:>10} {:>14} {:>10}",
        "Stock", "Announced", "Growth%", "SignalSum", "FrontRun"
    );
    for row in rows.iter().take(20) {
        println!(
            "{:>8} {:>12} {:>10.2} {:>14.0} {:>10}",
            row.stock_id,
            row.announcement_date,
            row.revenue_growth_pct,
            row.signal_sum,
            if row.is_front_run { "YES" } else { "" }
        );
    }

    let detected = rows.iter().filter(|r| r.is_front_run).count();
    println!("\n{} of {} events flagged", detected, rows.len());
    println!("\nBy stock:");
    for s in summarize_by_stock(&rows) {
        println!(
            "  {:>8}  {:>3} / {:<3} events  mean growth {:.2}%",
            s.stock_id, s.detected_events, s.events, s.mean_growth_pct
        );
    }
    println!("\nResults: {}", config.data.front_run_path().display());
    Ok(())
}

/// Signal profile around announcements
pub fn timing(config: &Config, source: Option<SignalSource>) -> Result<()> {
    let tester = Backtester::new(config);
    let events = tester.events()?;
    let signals = tester.signals(&events)?;
    let source = source.unwrap_or(config.backtest.signal_source);

    let p = profile(&events, &signals, config.scan.timing_lookback, source);
    println!();
    print!("{}", p.render());
    if let Some(peak) = p.peak() {
        println!("\nPeak accumulation at T{:+}", peak.offset);
    }
    Ok(())
}

/// Entry candidates and holding review for one date
pub fn daily(config: &Config, date: NaiveDate, source: Option<SignalSource>) -> Result<()> {
    let source = source.unwrap_or(config.backtest.signal_source);
    let signal_dir = config.data.output_dir.join("signals");
    let ids = list_stock_ids(&signal_dir)
        .with_context(|| format!("No signal files in {}", signal_dir.display()))?;
    let signals = load_signal_set(&config.data, &ids, config.batch.read_retry_ms)?;

    let candidates = scan_entries(
        date,
        &signals,
        config.scan.daily_window,
        config.scan.daily_min_qty,
        source,
    );

    println!("\n=== DAILY REPORT {} ===\n", date);
    if candidates.is_empty() {
        println!("No entry signals.");
    }
    for c in &candidates {
        println!(
            "BUY  {:>8} @ {:.2}  trailing {}-day flow {:.0}",
            c.stock_id, c.price, config.scan.daily_window, c.trailing_sum
        );
    }

    if let Some(path) = &config.scan.portfolio_file {
        let portfolio = load_portfolio(path)
            .with_context(|| format!("Failed to read portfolio {}", path.display()))?;
        let market = MarketData::load(&config.data, config.batch.read_retry_ms)?;

        let price_on = |stock_id: &str| {
            market
                .closes
                .get(stock_id)
                .and_then(|closes| closes.get(&date).copied())
                .or_else(|| {
                    signals.get(stock_id).and_then(|rows| {
                        rows.iter().find(|r| r.date == date).map(|r| r.price)
                    })
                })
        };
        let (reviews, unpriced) = review_holdings(
            &portfolio,
            price_on,
            config.backtest.stop_loss_pct,
            config.scan.take_profit_pct,
        );

        println!("\nHoldings:");
        for r in &reviews {
            println!(
                "  {:<18} {:>8} @ {:.2}  P&L {:+.2}%",
                r.action.to_string(),
                r.stock_id,
                r.price,
                r.pnl * 100.0
            );
        }
        for id in unpriced {
            warn!(stock = %id, %date, "No price for holding");
        }
    }
    Ok(())
}

/// Print the effective configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.display());
    Ok(())
}
