//! Raw logger export parser.
//!
//! Raw files are positional CSV with no usable header. Column 0 is a naive
//! local timestamp, column 1 is a placeholder the loggers emit but nothing
//! consumes, and the eight measurement channels follow at fixed positions
//! (see [`Channel::raw_column`]).
//!
//! The logger clocks stay on standard time year-round, so every row carries
//! the fixed UTC−8 offset and rows at or after the spring-forward cutover
//! are shifted back one hour.

use std::path::Path;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{Channel, RawReading};

/// Timestamp pattern used in raw exports.
pub const RAW_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Lowest column count a row needs to carry every channel of interest.
const MIN_COLUMNS: usize = 10;

/// Fixed offset the logger clocks run on (PST, no DST adjustment).
pub fn source_offset() -> FixedOffset {
    FixedOffset::west_opt(8 * 3600).expect("valid offset")
}

/// Fixed offset used for all displayed/persisted timestamps.
pub fn display_offset() -> FixedOffset {
    FixedOffset::west_opt(7 * 3600).expect("valid offset")
}

/// Spring-forward instant after which logger timestamps run one hour fast.
pub fn dst_cutover() -> DateTime<FixedOffset> {
    NaiveDate::from_ymd_opt(2025, 3, 9)
        .expect("valid date")
        .and_hms_opt(2, 0, 0)
        .expect("valid time")
        .and_local_timezone(source_offset())
        .unwrap()
}

/// Result of ingesting one raw file.
#[derive(Debug, Default)]
pub struct IngestResult {
    pub readings: Vec<RawReading>,
    /// Rows rejected for an unparseable timestamp or too few columns.
    pub dropped_rows: usize,
}

impl IngestResult {
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Reads one raw export, keeping only the known channel positions.
///
/// Rows whose timestamp fails [`RAW_TIMESTAMP_FORMAT`], or that are too
/// short to carry every channel, are dropped and counted. Unparseable
/// numeric cells in an otherwise valid row become NaN so the model stage
/// can turn them into missing values. An empty result is not an error here;
/// the caller decides whether "no usable data" is worth a warning.
pub fn read_raw_file(path: &Path) -> Result<IngestResult> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut result = IngestResult::default();

    for (row_idx, record) in reader.records().enumerate() {
        let record = record?;

        match parse_row(&record, row_idx) {
            Ok(reading) => result.readings.push(reading),
            Err(err) => {
                result.dropped_rows += 1;
                debug!(path = %path.display(), %err, "Dropped malformed row");
            }
        }
    }

    if result.is_empty() {
        warn!(
            path = %path.display(),
            dropped = result.dropped_rows,
            "No usable data in raw file"
        );
    } else {
        debug!(
            path = %path.display(),
            rows = result.readings.len(),
            dropped = result.dropped_rows,
            "Raw file ingested"
        );
    }

    Ok(result)
}

fn parse_row(record: &csv::StringRecord, row_idx: usize) -> Result<RawReading> {
    if record.len() < MIN_COLUMNS {
        return Err(Error::MalformedTimestamp {
            raw: record.get(0).unwrap_or("").to_string(),
            row: row_idx,
        });
    }

    let raw_ts = record.get(0).unwrap_or("").trim();
    let naive = NaiveDateTime::parse_from_str(raw_ts, RAW_TIMESTAMP_FORMAT).map_err(|_| {
        Error::MalformedTimestamp {
            raw: raw_ts.to_string(),
            row: row_idx,
        }
    })?;

    let timestamp = naive
        .and_local_timezone(source_offset())
        .single()
        .ok_or_else(|| Error::MalformedTimestamp {
            raw: raw_ts.to_string(),
            row: row_idx,
        })?;
    let timestamp = apply_dst_shim(timestamp);

    let mut channels = [f64::NAN; 8];
    for channel in Channel::ALL {
        let cell = record.get(channel.raw_column()).unwrap_or("").trim();
        channels[channel.index()] = cell.parse::<f64>().unwrap_or(f64::NAN);
    }

    Ok(RawReading::new(timestamp, channels))
}

/// Shifts readings at or after the spring-forward cutover back one hour.
///
/// The logger clock does not follow DST, so from the cutover on its wall
/// clock runs one hour ahead of the fixed offset it reports in.
pub fn apply_dst_shim(timestamp: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    if timestamp >= dst_cutover() {
        timestamp - Duration::hours(1)
    } else {
        timestamp
    }
}
