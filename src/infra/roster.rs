//! Sensor roster configuration.
//!
//! [`SensorRoster`] maps sensor ids to model artifact references. The
//! roster is externally maintained; the pipeline never computes it.

use anyhow::{Context, Result};
use std::collections::BTreeMap;

/// Maps sensor ids to artifact references (s3 URI, URL, or local path).
///
/// Stored as a plain JSON object on disk:
/// ```json
/// {
///   "2021": "s3://aq-models/2021.json",
///   "2022": "models/2022.json"
/// }
/// ```
pub struct SensorRoster {
    entries: BTreeMap<String, String>,
}

impl SensorRoster {
    /// Loads the roster from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading sensor roster '{path}'"))?;
        let entries: BTreeMap<String, String> = serde_json::from_str(&content)
            .with_context(|| format!("parsing sensor roster '{path}'"))?;
        Ok(Self { entries })
    }

    /// Returns the artifact reference for `sensor_id`, if one is configured.
    pub fn get_ref(&self, sensor_id: &str) -> Option<&str> {
        self.entries.get(sensor_id).map(String::as_str)
    }

    /// Iterates over all `(sensor_id, reference)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
