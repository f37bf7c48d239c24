//! Calibration model structures and apply paths.
//!
//! A sensor's trained model ships as one JSON [`artifact::SensorArtifact`]
//! holding, per pollutant, a [`hybrid::HybridModel`]: value-band bounds plus
//! up to three tagged sub-models ([`hybrid::SubModel`]). The tagged layout
//! keeps the artifact self-describing; there is no positional indexing to
//! get wrong.

pub mod artifact;
pub mod ensemble;
pub mod hybrid;
pub mod polynomial;

pub use artifact::SensorArtifact;
pub use ensemble::EnsembleModel;
pub use hybrid::{Bounds, HybridModel, SubModel};
pub use polynomial::PolynomialModel;
