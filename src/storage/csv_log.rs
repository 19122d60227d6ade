//! Append-only CSV log of opportunities.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::SecondsFormat;
use tracing::info;

use super::StorageError;
use crate::domain::OpportunityEvent;
use crate::notification::{OpportunitySink, SinkError};

/// First line of every opportunity log.
pub const CSV_HEADER: &str =
    "timestamp,buy_exchange,sell_exchange,buy_price,sell_price,profit_percentage,net_profit";

/// CsvSink appends one line per opportunity to a CSV file.
///
/// The header is written once, when the file is empty. Each record is
/// flushed as soon as it is written.
pub struct CsvSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl CsvSink {
    /// Opens (or creates) the log at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{}", CSV_HEADER)?;
            file.flush()?;
        }

        info!(path = %path.display(), "Opportunity log opened");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of records in the log, excluding the header.
    pub fn count(&self) -> Result<usize, StorageError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut lines = reader.lines();

        match lines.next().transpose()? {
            Some(header) if header == CSV_HEADER => {}
            Some(other) => {
                return Err(StorageError::InvalidData(format!(
                    "unexpected header {:?}",
                    other
                )));
            }
            None => return Ok(0),
        }

        let mut count = 0;
        for line in lines {
            if !line?.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Formats one CSV record (without the trailing newline).
pub fn format_record(event: &OpportunityEvent) -> String {
    format!(
        "{},{},{},{:.4},{:.4},{:.4},{:.4}",
        event.detected_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        event.buy_venue,
        event.sell_venue,
        event.buy_price.round_dp(4),
        event.sell_price.round_dp(4),
        event.profit_percent.round_dp(4),
        event.net_profit.round_dp(4)
    )
}

impl OpportunitySink for CsvSink {
    fn name(&self) -> &str {
        "csv"
    }

    fn handle(&self, event: &OpportunityEvent) -> Result<(), SinkError> {
        let record = format_record(event);
        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        writeln!(file, "{}", record)?;
        file.flush()?;
        Ok(())
    }
}
