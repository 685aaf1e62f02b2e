//! Tabular input loading
//!
//! Every table is a CSV file with a header row. Headers are checked before
//! any row is parsed so schema drift surfaces as `Error::Schema` instead of
//! silently coerced values. File opens retry transient I/O failures.

use backoff::ExponentialBackoff;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::DataConfig;
use crate::error::{Error, Result};
use crate::types::{AnnouncementEvent, MarketReturn, PriceBar, SignalRow, Transaction};

pub const TRANSACTION_COLUMNS: &[&str] = &["date", "stock_id", "broker_id", "price", "buy", "sell"];
pub const PRICE_COLUMNS: &[&str] = &["stock_id", "date", "close"];
pub const MARKET_RETURN_COLUMNS: &[&str] = &["date", "market_return"];
pub const ANNOUNCEMENT_COLUMNS: &[&str] = &["stock_id", "announcement_date", "revenue_growth_pct"];
pub const SIGNAL_COLUMNS: &[&str] = &["date", "price", "original_bps", "smart_bps"];

/// Daily close lookup for one stock
pub type CloseLookup = HashMap<NaiveDate, f64>;

/// Open a file, retrying transient failures with exponential backoff
pub fn open_with_retry(path: &Path, max_elapsed_ms: u64) -> Result<File> {
    let policy = ExponentialBackoff {
        initial_interval: Duration::from_millis(50),
        max_interval: Duration::from_millis(500),
        max_elapsed_time: Some(Duration::from_millis(max_elapsed_ms)),
        ..Default::default()
    };

    let result = backoff::retry(policy, || match File::open(path) {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(backoff::Error::permanent(
            Error::MissingData(path.display().to_string()),
        )),
        Err(e) => {
            let err = Error::from(e);
            if err.is_retryable() {
                warn!(path = %path.display(), error = %err, "Retrying read");
                Err(backoff::Error::transient(err))
            } else {
                Err(backoff::Error::permanent(err))
            }
        }
    });

    result.map_err(|e| match e {
        backoff::Error::Permanent(err) => err,
        backoff::Error::Transient { err, .. } => err,
    })
}

/// Read a whole table, rejecting files whose header lacks required columns
pub fn read_table<T: DeserializeOwned>(
    path: &Path,
    table: &str,
    required: &[&str],
    max_elapsed_ms: u64,
) -> Result<Vec<T>> {
    let file = open_with_retry(path, max_elapsed_ms)?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader.headers()?.clone();
    check_columns(table, headers.iter(), required)?;

    let mut rows = Vec::new();
    for (line, record) in reader.deserialize::<T>().enumerate() {
        let row = record.map_err(|e| Error::MalformedRow {
            table: table.to_string(),
            reason: format!("row {}: {}", line + 1, e),
        })?;
        rows.push(row);
    }

    debug!(table, rows = rows.len(), "Loaded table");
    Ok(rows)
}

/// Fail with the list of required columns missing from a header
pub fn check_columns<'a>(
    table: &str,
    headers: impl Iterator<Item = &'a str>,
    required: &[&str],
) -> Result<()> {
    let present: Vec<&str> = headers.collect();
    let missing: Vec<String> = required
        .iter()
        .filter(|col| !present.contains(col))
        .map(|col| col.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Schema {
            table: table.to_string(),
            missing,
        })
    }
}

/// Load one stock's transaction tape, ordered by date then broker
pub fn load_transactions(
    data: &DataConfig,
    stock_id: &str,
    max_elapsed_ms: u64,
) -> Result<Vec<Transaction>> {
    let path = data.transactions_path(stock_id);
    let mut rows: Vec<Transaction> =
        read_table(&path, "transactions", TRANSACTION_COLUMNS, max_elapsed_ms)?;

    rows.retain(|tx| tx.stock_id == stock_id);
    if rows.is_empty() {
        return Err(Error::MissingData(format!(
            "no transactions for {} in {}",
            stock_id,
            path.display()
        )));
    }

    rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.broker_id.cmp(&b.broker_id)));
    info!(stock = %stock_id, rows = rows.len(), "Loaded transactions");
    Ok(rows)
}

/// Read-only tables shared by every stock in a run
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    /// stock_id -> date -> close
    pub closes: HashMap<String, CloseLookup>,
    /// date -> fractional market return
    pub market_returns: HashMap<NaiveDate, f64>,
}

impl MarketData {
    /// Load close prices and market returns. Both tables are optional:
    /// missing closes fall back to the tape's VWAP, missing market returns
    /// mean alpha equals the raw trade return.
    pub fn load(data: &DataConfig, max_elapsed_ms: u64) -> Result<Self> {
        let closes = match read_table::<PriceBar>(
            &data.prices_path(),
            "prices",
            PRICE_COLUMNS,
            max_elapsed_ms,
        ) {
            Ok(bars) => group_closes(bars),
            Err(Error::MissingData(path)) => {
                warn!(%path, "Price table not found, valuing at tape VWAP");
                HashMap::new()
            }
            Err(e) => return Err(e),
        };

        let market_returns = match read_table::<MarketReturn>(
            &data.market_returns_path(),
            "market_returns",
            MARKET_RETURN_COLUMNS,
            max_elapsed_ms,
        ) {
            Ok(rows) => rows.into_iter().map(|r| (r.date, r.market_return)).collect(),
            Err(Error::MissingData(path)) => {
                warn!(%path, "Market return table not found, alpha equals raw return");
                HashMap::new()
            }
            Err(e) => return Err(e),
        };

        info!(
            stocks = closes.len(),
            market_days = market_returns.len(),
            "Loaded market data"
        );
        Ok(Self {
            closes,
            market_returns,
        })
    }

    /// Close lookup for a stock (empty when the stock has no price rows)
    pub fn closes_for(&self, stock_id: &str) -> CloseLookup {
        self.closes.get(stock_id).cloned().unwrap_or_default()
    }
}

fn group_closes(bars: Vec<PriceBar>) -> HashMap<String, CloseLookup> {
    let mut closes: HashMap<String, CloseLookup> = HashMap::new();
    for bar in bars {
        closes
            .entry(bar.stock_id)
            .or_default()
            .insert(bar.date, bar.close);
    }
    closes
}

/// Load announcements ordered by stock then date
pub fn load_announcements(data: &DataConfig, max_elapsed_ms: u64) -> Result<Vec<AnnouncementEvent>> {
    let mut events: Vec<AnnouncementEvent> = read_table(
        &data.announcements_path(),
        "announcements",
        ANNOUNCEMENT_COLUMNS,
        max_elapsed_ms,
    )?;
    events.sort_by(|a, b| {
        a.stock_id
            .cmp(&b.stock_id)
            .then_with(|| a.announcement_date.cmp(&b.announcement_date))
    });
    Ok(events)
}

/// Load a previously written signal file, ordered by date
pub fn load_signal_file(path: &Path, max_elapsed_ms: u64) -> Result<Vec<SignalRow>> {
    let mut rows: Vec<SignalRow> = read_table(path, "signals", SIGNAL_COLUMNS, max_elapsed_ms)?;
    rows.sort_by(|a, b| a.date.cmp(&b.date));
    Ok(rows)
}

/// Stock ids of the `*.csv` files in a directory, sorted
pub fn list_stock_ids(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(Error::MissingData(format!("{} is not a directory", dir.display())));
    }
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            ids.push(stem.to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

/// Number of data rows in a CSV file, header excluded
pub fn count_rows(path: &Path, max_elapsed_ms: u64) -> Result<usize> {
    let file = open_with_retry(path, max_elapsed_ms)?;
    let mut reader = csv::ReaderBuilder::new().from_reader(file);
    let mut rows = 0;
    for record in reader.records() {
        record?;
        rows += 1;
    }
    Ok(rows)
}

/// The `n` stocks with the longest transaction tapes, busiest first.
/// Equal row counts order by stock id.
pub fn most_active_stocks(
    data: &DataConfig,
    stock_ids: &[String],
    n: usize,
    max_elapsed_ms: u64,
) -> Result<Vec<(String, usize)>> {
    let mut counted = Vec::with_capacity(stock_ids.len());
    for stock_id in stock_ids {
        let rows = count_rows(&data.transactions_path(stock_id), max_elapsed_ms)?;
        counted.push((stock_id.clone(), rows));
    }
    counted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counted.truncate(n);
    debug!(selected = counted.len(), scanned = stock_ids.len(), "Ranked stocks by activity");
    Ok(counted)
}

/// Stock ids listed one per line; blank lines and `#` comments are ignored
pub fn read_stock_list(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Signal series for each stock that has a signal file. Stocks without
/// one are logged and left out.
pub fn load_signal_set(
    data: &DataConfig,
    stock_ids: &[String],
    max_elapsed_ms: u64,
) -> Result<BTreeMap<String, Vec<SignalRow>>> {
    let mut signals = BTreeMap::new();
    for stock_id in stock_ids {
        match load_signal_file(&data.signal_path(stock_id), max_elapsed_ms) {
            Ok(rows) => {
                signals.insert(stock_id.clone(), rows);
            }
            Err(Error::MissingData(path)) => {
                debug!(stock = %stock_id, %path, "No signal file");
            }
            Err(e) => return Err(e),
        }
    }
    info!(stocks = signals.len(), requested = stock_ids.len(), "Loaded signal files");
    Ok(signals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn data_config(dir: &Path) -> DataConfig {
        DataConfig {
            data_dir: dir.to_path_buf(),
            output_dir: dir.join("out"),
            ..DataConfig::default()
        }
    }

    #[test]
    fn test_load_transactions_sorted() {
        let dir = tempdir().unwrap();
        let data = data_config(dir.path());
        std::fs::create_dir_all(dir.path().join("transactions")).unwrap();
        std::fs::write(
            data.transactions_path("2330"),
            "date,stock_id,broker_id,price,buy,sell\n\
             2025-01-03,2330,B2,10.0,100,0\n\
             2025-01-02,2330,B9,10.0,0,50\n\
             2025-01-02,2330,B1,10.5,20,0\n\
             2025-01-02,9999,B1,99.0,1,0\n",
        )
        .unwrap();

        let rows = load_transactions(&data, "2330", 100).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].broker_id, "B1");
        assert_eq!(rows[1].broker_id, "B9");
        assert_eq!(rows[2].date, NaiveDate::from_ymd_opt(2025, 1, 3).unwrap());
        assert_eq!(rows[2].buy_qty, 100.0);
    }

    #[test]
    fn test_missing_column_is_schema_error() {
        let dir = tempdir().unwrap();
        let data = data_config(dir.path());
        std::fs::create_dir_all(dir.path().join("transactions")).unwrap();
        std::fs::write(
            data.transactions_path("2330"),
            "date,stock_id,broker_id,price,buy\n2025-01-02,2330,B1,10.0,5\n",
        )
        .unwrap();

        match load_transactions(&data, "2330", 100) {
            Err(Error::Schema { table, missing }) => {
                assert_eq!(table, "transactions");
                assert_eq!(missing, vec!["sell".to_string()]);
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_missing_data() {
        let dir = tempdir().unwrap();
        let data = data_config(dir.path());
        let err = load_transactions(&data, "0000", 100).unwrap_err();
        assert!(matches!(err, Error::MissingData(_)));
        assert!(err.is_stock_fatal());
    }

    #[test]
    fn test_market_data_optional_tables() {
        let dir = tempdir().unwrap();
        let data = data_config(dir.path());
        std::fs::write(
            data.prices_path(),
            "stock_id,date,close\n2330,2025-01-02,101.5\n2317,2025-01-02,50\n",
        )
        .unwrap();

        let market = MarketData::load(&data, 100).unwrap();
        assert!(market.market_returns.is_empty());
        let closes = market.closes_for("2330");
        assert_eq!(
            closes.get(&NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()),
            Some(&101.5)
        );
        assert!(market.closes_for("1101").is_empty());
    }

    #[test]
    fn test_signal_file_empty_smart_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sig.csv");
        std::fs::write(
            &path,
            "date,price,original_bps,smart_bps\n2025-01-03,10,5,\n2025-01-02,10,3,1\n",
        )
        .unwrap();

        let rows = load_signal_file(&path, 100).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].smart_bps, Some(1.0));
        assert_eq!(rows[1].smart_bps, None);
    }

    #[test]
    fn test_stock_lists() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("2330.csv"), "x").unwrap();
        std::fs::write(dir.path().join("1101.csv"), "x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        assert_eq!(list_stock_ids(dir.path()).unwrap(), vec!["1101", "2330"]);

        let list = dir.path().join("stocks.txt");
        std::fs::write(&list, "# watchlist\n2330\n\n 6215  # added later\n").unwrap();
        assert_eq!(read_stock_list(&list).unwrap(), vec!["2330", "6215"]);
    }

    #[test]
    fn test_most_active_stocks() {
        let dir = tempdir().unwrap();
        let data = data_config(dir.path());
        let header = "date,stock_id,broker_id,price,buy,sell\n";
        for (id, rows) in [("1101", 2), ("2330", 5), ("6215", 2), ("2454", 1)] {
            let path = data.transactions_path(id);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            let body: String = (0..rows)
                .map(|i| format!("2025-01-0{},{},B{},10,1,0\n", i + 1, id, i))
                .collect();
            std::fs::write(&path, format!("{}{}", header, body)).unwrap();
        }

        let ids: Vec<String> = ["1101", "2330", "6215", "2454"].iter().map(|s| s.to_string()).collect();
        let top = most_active_stocks(&data, &ids, 3, 100).unwrap();
        assert_eq!(
            top,
            vec![
                ("2330".to_string(), 5),
                ("1101".to_string(), 2),
                ("6215".to_string(), 2)
            ]
        );

        let missing = vec!["9999".to_string()];
        assert!(matches!(
            most_active_stocks(&data, &missing, 1, 100),
            Err(Error::MissingData(_))
        ));
    }

    #[test]
    fn test_signal_set_skips_missing_files() {
        let dir = tempdir().unwrap();
        let data = data_config(dir.path());
        let path = data.signal_path("2330");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "date,price,original_bps,smart_bps\n2025-01-02,10,3,1\n").unwrap();

        let ids = vec!["2330".to_string(), "1101".to_string()];
        let set = load_signal_set(&data, &ids, 100).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains_key("2330"));
    }
}
