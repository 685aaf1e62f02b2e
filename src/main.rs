//! brokerflow - broker segmentation and order-flow signal research tool
//!
//! Typical session:
//! - `brokerflow batch` to write per-stock signal files
//! - `brokerflow backtest` to simulate announcement trades on them
//! - `brokerflow front-run` / `timing` / `daily` for research scans

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::error;

use broker_flow::cli::commands;
use broker_flow::config::Config;
use broker_flow::types::SignalSource;

/// Broker behavioral segmentation and order-flow replay
#[derive(Parser)]
#[command(name = "brokerflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "brokerflow.toml", env = "BROKERFLOW_CONFIG")]
    config: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster one stock's brokers and show the accumulator cluster
    Cluster {
        /// Stock id
        stock: String,
    },

    /// Write the original/smart signal file for one stock
    Signal {
        /// Stock id
        stock: String,
    },

    /// Write signal files for many stocks in parallel
    Batch {
        /// Stock ids (default: every transaction file)
        stocks: Vec<String>,

        /// File with one stock id per line
        #[arg(long, value_name = "FILE")]
        stocks_file: Option<PathBuf>,

        /// Keep only the N stocks with the most transaction rows
        #[arg(long, value_name = "N")]
        top: Option<usize>,
    },

    /// Simulate announcement trades on written signal files
    Backtest {
        /// Signal column driving entries: smart or original
        #[arg(long)]
        source: Option<SignalSource>,

        /// Run smart and original side by side
        #[arg(long, conflicts_with = "source")]
        compare: bool,
    },

    /// Flag announcements preceded by heavy one-sided flow
    FrontRun {
        #[arg(long)]
        source: Option<SignalSource>,
    },

    /// Mean signal at each offset before announcements
    Timing {
        #[arg(long)]
        source: Option<SignalSource>,
    },

    /// Entry candidates and holding review for a date
    Daily {
        /// Date (YYYY-MM-DD)
        date: NaiveDate,

        #[arg(long)]
        source: Option<SignalSource>,
    },

    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("broker_flow=info".parse()?),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Cluster { stock } => commands::cluster(&config, &stock),
        Commands::Signal { stock } => commands::signal(&config, &stock),
        Commands::Batch {
            stocks,
            stocks_file,
            top,
        } => commands::batch(&config, stocks, stocks_file.as_deref(), top),
        Commands::Backtest { source, compare } => commands::backtest(&config, source, compare),
        Commands::FrontRun { source } => commands::front_run(&config, source),
        Commands::Timing { source } => commands::timing(&config, source),
        Commands::Daily { date, source } => commands::daily(&config, date, source),
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
