//! CLI entry point for the RAMP calibrator.
//!
//! Provides subcommands for calibrating a single sensor, running the whole
//! roster, and listing the raw files available per sensor.

mod infra;

use std::ffi::OsStr;
use std::path::Path;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::Instrument;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::infra::artifacts::{S3ArtifactStore, fetch_artifact};
use crate::infra::roster::SensorRoster;
use ramp_calibrator::model::SensorArtifact;
use ramp_calibrator::output::print_json;
use ramp_calibrator::pipeline::{self, RawFileManifest, SensorRunSummary};

#[derive(Parser)]
#[command(name = "ramp_calibrator")]
#[command(about = "Calibrates raw air-quality sensor exports", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calibrate one sensor with an explicit model artifact
    Calibrate {
        /// Sensor id as used in raw file names (`<id>_<YYYY-MM-DD>.csv`)
        sensor_id: String,

        /// Model artifact reference: local path, http(s) URL, or s3:// URI
        #[arg(short, long)]
        model: String,

        /// Directory containing raw exports
        #[arg(short, long, default_value = "data")]
        data_dir: String,

        /// Directory to write calibrated output to
        #[arg(short, long, default_value = "calibrated_data")]
        output_dir: String,
    },
    /// Calibrate every sensor in the roster
    Run {
        /// JSON roster mapping sensor ids to model artifact references
        #[arg(short, long, default_value = "sensor_roster.json")]
        roster: String,

        /// Directory containing raw exports
        #[arg(short, long, default_value = "data")]
        data_dir: String,

        /// Directory to write calibrated output to
        #[arg(short, long, default_value = "calibrated_data")]
        output_dir: String,
    },
    /// List sensors and raw file coverage found in the data directory
    ListSensors {
        /// Directory containing raw exports
        #[arg(short, long, default_value = "data")]
        data_dir: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/ramp_calibrator.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("ramp_calibrator.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Calibrate {
            sensor_id,
            model,
            data_dir,
            output_dir,
        } => {
            let s3 = if model.starts_with("s3://") {
                let config = aws_config::load_from_env().await;
                Some(S3ArtifactStore::new(&config))
            } else {
                None
            };
            let artifact = load_artifact(&sensor_id, &model, s3.as_ref()).await?;
            let manifest = RawFileManifest::build(Path::new(&data_dir))?;

            let summary = pipeline::calibrate_sensor(
                &sensor_id,
                &manifest,
                &artifact,
                Utc::now(),
                Path::new(&output_dir),
            )?;
            print_json(&summary)?;
        }
        Commands::Run {
            roster,
            data_dir,
            output_dir,
        } => {
            run_roster(&roster, &data_dir, &output_dir).await?;
        }
        Commands::ListSensors { data_dir } => {
            let manifest = RawFileManifest::build(Path::new(&data_dir))?;

            let mut sensor_ids: Vec<&str> = manifest.sensor_ids().collect();
            sensor_ids.sort();

            for &sensor_id in &sensor_ids {
                let files = manifest.files_for(sensor_id);
                let newest = files.first().map(|e| e.date);
                let oldest = files.last().map(|e| e.date);
                info!(
                    sensor_id,
                    files = files.len(),
                    ?newest,
                    ?oldest,
                    "Sensor"
                );
            }

            info!(sensors = sensor_ids.len(), data_dir = %data_dir, "Raw data summary");
        }
    }

    Ok(())
}

/// Calibrates every sensor in the roster, isolating per-sensor failures.
///
/// Exits successfully when at least one sensor produced output; fails only
/// on total failure so the scheduler can tell the two apart.
async fn run_roster(roster_path: &str, data_dir: &str, output_dir: &str) -> Result<()> {
    let roster = SensorRoster::load(roster_path)?;
    if roster.is_empty() {
        bail!("sensor roster '{roster_path}' is empty");
    }

    let manifest = RawFileManifest::build(Path::new(data_dir))?;

    // Initialize the S3 store only when some reference needs it
    let s3 = if roster.iter().any(|(_, r)| r.starts_with("s3://")) {
        let config = aws_config::load_from_env().await;
        Some(S3ArtifactStore::new(&config))
    } else {
        None
    };

    let now = Utc::now();
    let mut succeeded = 0usize;
    let mut skipped = 0usize;

    info!(sensors = roster.len(), data_dir, "Starting calibration run");

    for (sensor_id, reference) in roster.iter() {
        let span = tracing::info_span!("calibrate_sensor", sensor_id);

        let outcome = process_sensor(
            sensor_id,
            reference,
            &manifest,
            s3.as_ref(),
            now,
            Path::new(output_dir),
        )
        .instrument(span)
        .await;

        match outcome {
            Some(summary) => {
                succeeded += 1;
                print_json(&summary)?;
            }
            None => skipped += 1,
        }
    }

    info!(succeeded, skipped, "Calibration run complete");

    if succeeded == 0 {
        bail!("total failure: no sensor produced output");
    }
    Ok(())
}

/// Runs one sensor end to end. Any failure is logged and turned into a
/// skip; one sensor must never prevent the others from completing.
async fn process_sensor(
    sensor_id: &str,
    reference: &str,
    manifest: &RawFileManifest,
    s3: Option<&S3ArtifactStore>,
    now: DateTime<Utc>,
    output_dir: &Path,
) -> Option<SensorRunSummary> {
    let artifact = match load_artifact(sensor_id, reference, s3).await {
        Ok(artifact) => artifact,
        Err(err) => {
            warn!(sensor_id, cause = %err, "Sensor skipped");
            return None;
        }
    };

    match pipeline::calibrate_sensor(sensor_id, manifest, &artifact, now, output_dir) {
        Ok(summary) => Some(summary),
        Err(err) => {
            pipeline::warn_skipped(sensor_id, &err);
            None
        }
    }
}

/// Fetches and parses one sensor's model artifact. A missing or corrupt
/// artifact is fatal for that sensor's run only.
async fn load_artifact(
    sensor_id: &str,
    reference: &str,
    s3: Option<&S3ArtifactStore>,
) -> Result<SensorArtifact> {
    let bytes = fetch_artifact(reference, s3).await.map_err(|err| {
        ramp_calibrator::error::Error::MissingModelArtifact {
            sensor_id: sensor_id.to_string(),
            reason: err.to_string(),
        }
    })?;

    let artifact = SensorArtifact::from_json(&bytes).map_err(|err| {
        ramp_calibrator::error::Error::MissingModelArtifact {
            sensor_id: sensor_id.to_string(),
            reason: format!("corrupt artifact: {err}"),
        }
    })?;
    Ok(artifact)
}
