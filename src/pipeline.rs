//! Per-sensor calibration runs: manifest, window accumulation, output.
//!
//! A run walks a sensor's raw files newest-first, calibrating one file at a
//! time until the accumulated history reaches back 24 hours, then filters
//! to exactly the trailing window, derives the rolling/index fields, and
//! writes one output file. Sensor-level failures are returned to the caller
//! so one sensor can never sink the rest of the run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aqhi;
use crate::error::{Error, Result};
use crate::ingest::{self, display_offset};
use crate::model::SensorArtifact;
use crate::output;
use crate::types::{CalibratedRecord, CalibratedRow, Pollutant, RawReading};

/// Length of the trailing window every output file covers.
pub const WINDOW_HOURS: i64 = 24;

/// One raw file attributed to a sensor and date.
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub date: NaiveDate,
    pub path: PathBuf,
}

/// Sensor → ordered raw-file list, built once per run by scanning the data
/// directory for `<sensor_id>_<YYYY-MM-DD>.csv` names. Files are kept
/// newest-first, the order the window accumulation consumes them in.
#[derive(Debug, Default)]
pub struct RawFileManifest {
    by_sensor: HashMap<String, Vec<ManifestEntry>>,
}

impl RawFileManifest {
    pub fn build(data_dir: &Path) -> Result<Self> {
        let mut by_sensor: HashMap<String, Vec<ManifestEntry>> = HashMap::new();

        for entry in std::fs::read_dir(data_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some((sensor_id, date)) = parse_raw_file_name(name) else {
                continue;
            };
            by_sensor
                .entry(sensor_id.to_string())
                .or_default()
                .push(ManifestEntry {
                    date,
                    path: entry.path(),
                });
        }

        for files in by_sensor.values_mut() {
            files.sort_by(|a, b| b.date.cmp(&a.date));
        }

        debug!(sensors = by_sensor.len(), "Raw file manifest built");
        Ok(Self { by_sensor })
    }

    pub fn files_for(&self, sensor_id: &str) -> &[ManifestEntry] {
        self.by_sensor
            .get(sensor_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn sensor_ids(&self) -> impl Iterator<Item = &str> {
        self.by_sensor.keys().map(String::as_str)
    }
}

/// Extracts `(sensor_id, date)` from `<sensor_id>_<YYYY-MM-DD>.csv`.
fn parse_raw_file_name(name: &str) -> Option<(&str, NaiveDate)> {
    let stem = name.strip_suffix(".csv")?;
    let (sensor_id, date_part) = stem.rsplit_once('_')?;
    if sensor_id.is_empty() {
        return None;
    }
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    Some((sensor_id, date))
}

/// What one successful sensor run produced.
#[derive(Debug, Serialize)]
pub struct SensorRunSummary {
    pub sensor_id: String,
    pub rows: usize,
    pub dropped_rows: usize,
    pub files_consumed: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub output_path: PathBuf,
}

/// Calibrates raw readings into per-pollutant values via the sensor's
/// hybrid models, converting timestamps to the display timezone.
///
/// Pollutants absent from the artifact come out missing across the board.
pub fn calibrate_readings(
    readings: &[RawReading],
    artifact: &SensorArtifact,
) -> Vec<CalibratedRow> {
    let mut rows: Vec<CalibratedRow> = readings
        .iter()
        .map(|r| CalibratedRow::new(r.timestamp.with_timezone(&display_offset())))
        .collect();

    for pollutant in Pollutant::ALL {
        let Some(model) = artifact.model_for(pollutant) else {
            debug!(%pollutant, "No model in artifact; column left missing");
            continue;
        };

        let features: Vec<Vec<f64>> = readings
            .iter()
            .map(|r| model.features.iter().map(|c| r.channel(*c)).collect())
            .collect();

        for (row, value) in rows.iter_mut().zip(model.apply(&features)) {
            row.set_value(pollutant, value);
        }
    }

    rows
}

/// Runs the full 24-hour calibration window for one sensor and writes its
/// output file. `now` is supplied by the caller so identical inputs always
/// reproduce identical output.
pub fn calibrate_sensor(
    sensor_id: &str,
    manifest: &RawFileManifest,
    artifact: &SensorArtifact,
    now: DateTime<Utc>,
    output_dir: &Path,
) -> Result<SensorRunSummary> {
    let files = manifest.files_for(sensor_id);
    if files.is_empty() {
        return Err(Error::EmptyRawFileSet(sensor_id.to_string()));
    }

    let cutoff = (now - Duration::hours(WINDOW_HOURS)).with_timezone(&display_offset());

    let mut rows: Vec<CalibratedRow> = Vec::new();
    let mut dropped_rows = 0usize;
    let mut dates_consumed: Vec<NaiveDate> = Vec::new();

    // Newest first: stop as soon as the accumulated history reaches the
    // cutoff, so no more history is calibrated than the window needs.
    for entry in files {
        let ingested = ingest::read_raw_file(&entry.path)?;
        dropped_rows += ingested.dropped_rows;
        dates_consumed.push(entry.date);

        rows.extend(calibrate_readings(&ingested.readings, artifact));

        let earliest = rows.iter().map(|r| r.timestamp).min();
        if earliest.is_some_and(|ts| ts <= cutoff) {
            break;
        }
    }

    rows.retain(|r| r.timestamp >= cutoff);
    rows.sort_by_key(|r| r.timestamp);

    if rows.is_empty() {
        return Err(Error::NoCalibratedRowsProduced(sensor_id.to_string()));
    }

    let index_rows = aqhi::annotate(&rows);
    let records: Vec<CalibratedRecord> = rows
        .iter()
        .zip(&index_rows)
        .map(|(row, idx)| CalibratedRecord::from_row(row, idx.aqhi, idx.top_contributor))
        .collect();

    let start_date = *dates_consumed.iter().min().expect("at least one file");
    let end_date = *dates_consumed.iter().max().expect("at least one file");

    std::fs::create_dir_all(output_dir)?;
    let output_path = output_dir.join(output::output_file_name(sensor_id, start_date, end_date));
    output::write_records(&output_path, &records)?;

    info!(
        sensor_id,
        rows = records.len(),
        dropped = dropped_rows,
        files = dates_consumed.len(),
        output = %output_path.display(),
        "Sensor calibrated"
    );

    Ok(SensorRunSummary {
        sensor_id: sensor_id.to_string(),
        rows: records.len(),
        dropped_rows,
        files_consumed: dates_consumed.len(),
        start_date,
        end_date,
        output_path,
    })
}

/// Emits the standard warning for a skipped sensor.
pub fn warn_skipped(sensor_id: &str, err: &Error) {
    warn!(sensor_id, cause = %err, "Sensor skipped");
}
