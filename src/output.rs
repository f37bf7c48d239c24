//! Output formatting and persistence for calibrated sensor tables.
//!
//! Each run replaces a sensor's output wholesale. Writes go to a sibling
//! temp file first and land via rename, so a crash mid-write never leaves a
//! half-written file visible to the dashboard that polls this directory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::types::CalibratedRecord;

/// Builds the deterministic output file name for one calibration window:
/// `<sensor_id>_calibrated_<start>_to_<end>.csv`, dates being the earliest
/// and latest source-file dates consumed.
pub fn output_file_name(sensor_id: &str, start: NaiveDate, end: NaiveDate) -> String {
    format!(
        "{}_calibrated_{}_to_{}.csv",
        sensor_id,
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    )
}

/// Writes the calibrated table to `path`, replacing any previous file.
///
/// Identical records produce byte-identical files; no run timestamp or
/// other varying sentinel is written.
pub fn write_records(path: &Path, records: &[CalibratedRecord]) -> Result<()> {
    let tmp_path = tmp_sibling(path);
    debug!(path = %path.display(), rows = records.len(), "Writing calibrated output");

    {
        let mut writer = csv::Writer::from_path(&tmp_path)?;
        for record in records {
            writer.serialize(record)?;
        }
        writer.flush()?;
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Logs a serializable run summary as pretty-printed JSON.
pub fn print_json(value: &impl Serialize) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::display_offset;
    use chrono::TimeZone;
    use std::env;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        PathBuf::from(format!("{}/{}", env::temp_dir().display(), name))
    }

    fn sample_record() -> CalibratedRecord {
        CalibratedRecord {
            date: display_offset()
                .with_ymd_and_hms(2025, 6, 10, 12, 0, 0)
                .unwrap(),
            co: Some(0.4),
            no: None,
            no2: Some(38.5),
            o3: Some(27.0),
            co2: Some(412.0),
            pm25: Some(12.0),
            aqhi: Some(4.0),
            top_contributor: Some(crate::types::Pollutant::No2),
        }
    }

    #[test]
    fn test_output_file_name() {
        let start = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        assert_eq!(
            output_file_name("2021", start, end),
            "2021_calibrated_2025-06-09_to_2025-06-10.csv"
        );
    }

    #[test]
    fn test_write_creates_file_with_header() {
        let path = temp_path("ramp_output_create.csv");
        let _ = fs::remove_file(&path);

        write_records(&path, &[sample_record()]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(
            lines.next().unwrap(),
            "date,co,no,no2,o3,co2,pm25,aqhi,top_contributor"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("2025-06-10T12:00:00-07:00,"));
        assert!(row.contains(",NO2"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_values_serialize_empty() {
        let path = temp_path("ramp_output_missing.csv");
        let _ = fs::remove_file(&path);

        let mut record = sample_record();
        record.aqhi = None;
        record.top_contributor = None;
        write_records(&path, &[record]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let row = content.lines().nth(1).unwrap();
        assert!(row.ends_with(",,"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_rewrite_replaces_content() {
        let path = temp_path("ramp_output_replace.csv");
        let _ = fs::remove_file(&path);

        write_records(&path, &[sample_record(), sample_record()]).unwrap();
        write_records(&path, &[sample_record()]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2); // header + one row

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_identical_records_identical_bytes() {
        let a = temp_path("ramp_output_idem_a.csv");
        let b = temp_path("ramp_output_idem_b.csv");
        let _ = fs::remove_file(&a);
        let _ = fs::remove_file(&b);

        write_records(&a, &[sample_record()]).unwrap();
        write_records(&b, &[sample_record()]).unwrap();

        assert_eq!(fs::read(&a).unwrap(), fs::read(&b).unwrap());

        fs::remove_file(&a).unwrap();
        fs::remove_file(&b).unwrap();
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let path = temp_path("ramp_output_tmp.csv");
        let _ = fs::remove_file(&path);

        write_records(&path, &[sample_record()]).unwrap();
        assert!(!tmp_sibling(&path).exists());

        fs::remove_file(&path).unwrap();
    }
}
