//! Serialized per-sensor model artifact.
//!
//! One JSON document per sensor, produced by training and fetched from
//! object storage before a run. Loaded once, then shared read-only for the
//! whole run.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::model::hybrid::HybridModel;
use crate::types::Pollutant;

pub const SCHEMA_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorArtifact {
    pub schema_version: u8,
    pub sensor_id: String,
    pub pollutants: HashMap<Pollutant, HybridModel>,
}

impl SensorArtifact {
    /// Parses an artifact from JSON bytes and sanitizes its sub-models.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let mut artifact: SensorArtifact = serde_json::from_slice(bytes)?;
        artifact.sanitize();
        Ok(artifact)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_json(&bytes)
    }

    pub fn model_for(&self, pollutant: Pollutant) -> Option<&HybridModel> {
        self.pollutants.get(&pollutant)
    }

    /// Drops sub-model slots that fail validation (unresolvable or
    /// ambiguous polynomial degree). The failure is fatal for that slot
    /// only: its band yields missing values while everything else runs.
    fn sanitize(&mut self) {
        for (pollutant, model) in &mut self.pollutants {
            let n_features = model.features.len();

            for (slot_name, slot) in [
                ("bulk", &mut model.bulk),
                ("lower", &mut model.lower),
                ("upper", &mut model.upper),
            ] {
                let Some(sub) = slot.as_ref() else { continue };
                if let Err(err) = sub.validate(n_features) {
                    warn!(
                        pollutant = %pollutant,
                        slot = slot_name,
                        %err,
                        "Dropping sub-model that failed validation"
                    );
                    *slot = None;
                }
            }
        }

        debug!(
            sensor_id = %self.sensor_id,
            pollutants = self.pollutants.len(),
            "Model artifact loaded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::hybrid::{Bounds, SubModel};
    use crate::model::polynomial::PolynomialModel;
    use crate::types::Channel;

    fn identity_model(channel: Channel) -> HybridModel {
        HybridModel {
            features: vec![channel],
            bounds: Bounds::default(),
            bulk: Some(SubModel::Polynomial(PolynomialModel {
                degree: Some(1),
                coefficients: vec![0.0, 1.0],
            })),
            lower: None,
            upper: None,
        }
    }

    #[test]
    fn test_json_round_trip() {
        let artifact = SensorArtifact {
            schema_version: SCHEMA_VERSION,
            sensor_id: "2021".to_string(),
            pollutants: HashMap::from([
                (Pollutant::No2, identity_model(Channel::No2)),
                (Pollutant::O3, identity_model(Channel::O3)),
            ]),
        };

        let json = serde_json::to_vec(&artifact).unwrap();
        let back = SensorArtifact::from_json(&json).unwrap();
        assert_eq!(back, artifact);
    }

    #[test]
    fn test_sanitize_drops_broken_slot() {
        let mut broken = identity_model(Channel::No2);
        // Eight coefficients over one feature match no degree up to the cap.
        broken.lower = Some(SubModel::Polynomial(PolynomialModel {
            degree: None,
            coefficients: vec![1.0; 8],
        }));

        let artifact = SensorArtifact {
            schema_version: SCHEMA_VERSION,
            sensor_id: "2021".to_string(),
            pollutants: HashMap::from([(Pollutant::No2, broken)]),
        };

        let json = serde_json::to_vec(&artifact).unwrap();
        let back = SensorArtifact::from_json(&json).unwrap();
        let model = back.model_for(Pollutant::No2).unwrap();
        assert!(model.lower.is_none());
        assert!(model.bulk.is_some());
    }

    #[test]
    fn test_unknown_pollutant_is_none() {
        let artifact = SensorArtifact {
            schema_version: SCHEMA_VERSION,
            sensor_id: "2021".to_string(),
            pollutants: HashMap::new(),
        };
        assert!(artifact.model_for(Pollutant::Co).is_none());
    }

    #[test]
    fn test_corrupt_json_is_an_error() {
        assert!(SensorArtifact::from_json(b"{not json").is_err());
    }
}
