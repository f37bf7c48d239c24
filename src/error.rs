//! Error types for the calibration pipeline.
//!
//! Row-level problems (bad timestamps, short rows) are recovered inside
//! ingest and surface only as dropped-row counts. Sensor-level problems are
//! returned from [`crate::pipeline`] so the caller can skip that sensor and
//! keep the run going.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("model artifact unavailable for sensor {sensor_id}: {reason}")]
    MissingModelArtifact { sensor_id: String, reason: String },

    #[error("malformed timestamp {raw:?} at row {row}")]
    MalformedTimestamp { raw: String, row: usize },

    #[error(
        "ambiguous polynomial degree: {coefficients} coefficient(s) over {features} feature(s) \
         match more than one degree"
    )]
    AmbiguousPolynomialDegree {
        coefficients: usize,
        features: usize,
    },

    #[error(
        "{coefficients} coefficient(s) over {features} feature(s) match no degree up to {max}"
    )]
    UnresolvablePolynomialDegree {
        coefficients: usize,
        features: usize,
        max: usize,
    },

    #[error("least-squares solve failed: {0}")]
    LeastSquares(String),

    #[error("no raw files found for sensor {0}")]
    EmptyRawFileSet(String),

    #[error("no calibrated rows in the trailing window for sensor {0}")]
    NoCalibratedRowsProduced(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for conditions that skip one sensor but must not abort the run.
    pub fn is_sensor_skip(&self) -> bool {
        matches!(
            self,
            Error::MissingModelArtifact { .. }
                | Error::EmptyRawFileSet(_)
                | Error::NoCalibratedRowsProduced(_)
        )
    }
}
