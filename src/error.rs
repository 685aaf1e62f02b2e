//! Error types for the broker-flow engine

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for segmentation, replay and event simulation
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Input data errors
    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Schema error in {table}: missing columns {missing:?}")]
    Schema { table: String, missing: Vec<String> },

    #[error("Malformed row in {table}: {reason}")]
    MalformedRow { table: String, reason: String },

    // Segmentation errors
    #[error("Insufficient history for {stock_id}: {trading_days} trading days, need {required}")]
    InsufficientHistory {
        stock_id: String,
        trading_days: usize,
        required: usize,
    },

    #[error("Degenerate clustering for {stock_id}: {reason}")]
    DegenerateCluster { stock_id: String, reason: String },

    // Event errors
    #[error("Alignment failure for {stock_id} on {date}: {reason}")]
    AlignmentFailure {
        stock_id: String,
        date: chrono::NaiveDate,
        reason: String,
    },

    // Serialization errors
    #[error("CSV error: {0}")]
    Csv(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransientIo(_))
    }

    /// Smart-signal generation is skipped but the original signal still runs
    pub fn skips_smart_signal(&self) -> bool {
        matches!(
            self,
            Error::InsufficientHistory { .. } | Error::DegenerateCluster { .. }
        )
    }

    /// Aborts the whole stock's pipeline (reported, not fatal to a batch)
    pub fn is_stock_fatal(&self) -> bool {
        matches!(
            self,
            Error::MissingData(_)
                | Error::Schema { .. }
                | Error::MalformedRow { .. }
                | Error::Csv(_)
                | Error::Io(_)
                | Error::TransientIo(_)
        )
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::Csv(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                Error::TransientIo(e.to_string())
            }
            _ => Error::Io(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let degenerate = Error::DegenerateCluster {
            stock_id: "2330".to_string(),
            reason: "3 brokers < 4 clusters".to_string(),
        };
        assert!(degenerate.skips_smart_signal());
        assert!(!degenerate.is_stock_fatal());

        let missing = Error::MissingData("transactions/2330.csv".to_string());
        assert!(missing.is_stock_fatal());
        assert!(!missing.skips_smart_signal());
        assert!(!missing.is_retryable());
    }

    #[test]
    fn test_io_error_kinds() {
        let transient: Error = std::io::Error::new(std::io::ErrorKind::Interrupted, "eintr").into();
        assert!(transient.is_retryable());

        let permanent: Error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no").into();
        assert!(!permanent.is_retryable());
    }
}
