//! Persistence of detected opportunities.

mod csv_log;

pub use csv_log::{CsvSink, CSV_HEADER};

/// StorageError represents errors that can occur while opening or reading the log.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}
