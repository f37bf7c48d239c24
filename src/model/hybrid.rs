//! Three-band hybrid model: an ensemble for the bulk of the distribution,
//! polynomial tail models where it extrapolates poorly.
//!
//! The bulk sub-model runs on every row first. Rows whose estimate lands
//! below the lower bound are recomputed by the lower tail model, rows above
//! the upper bound by the upper tail model, and rows with no tail model on
//! their side become missing rather than keeping an estimate the ensemble
//! was never trusted to make.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::model::ensemble::EnsembleModel;
use crate::model::polynomial::PolynomialModel;
use crate::stats::percentile;
use crate::types::Channel;

/// One sub-model slot, tagged by kind so the artifact is self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubModel {
    Ensemble(EnsembleModel),
    Polynomial(PolynomialModel),
}

impl SubModel {
    pub fn apply(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        match self {
            SubModel::Ensemble(model) => Ok(model.apply(rows)),
            SubModel::Polynomial(model) => model.apply(rows),
        }
    }

    /// Validates anything that can be checked before apply time; currently
    /// that is polynomial degree resolution against the feature count.
    pub fn validate(&self, n_features: usize) -> Result<()> {
        match self {
            SubModel::Ensemble(_) => Ok(()),
            SubModel::Polynomial(model) => model.resolve_degree(n_features + 1).map(|_| ()),
        }
    }
}

/// Value-band thresholds. An absent side is unbounded: no boundary band and
/// no tail model there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
}

/// Percentile configuration for [`HybridModel::train`].
///
/// `lower_bound`/`upper_bound` set the application-time bands; the separate,
/// tighter `lower_train`/`upper_train` select the tail training subsets, so
/// the tail fits overlap the region where the bulk model is still trusted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainPercentiles {
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub lower_train: f64,
    pub upper_train: f64,
}

impl Default for TrainPercentiles {
    fn default() -> Self {
        Self {
            lower_bound: 0.10,
            upper_bound: 0.90,
            lower_train: 0.20,
            upper_train: 0.80,
        }
    }
}

/// Per-pollutant hybrid model as stored in a sensor artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridModel {
    /// Input channels, in the order the sub-models expect their features.
    pub features: Vec<Channel>,
    #[serde(default)]
    pub bounds: Bounds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk: Option<SubModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower: Option<SubModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<SubModel>,
}

impl HybridModel {
    /// Applies the three-band scheme to a batch of feature rows.
    ///
    /// Missing (`None`) outputs come from: no bulk model, an out-of-band
    /// estimate with no tail model on that side, a tail model that failed
    /// to load, or a non-finite result.
    pub fn apply(&self, rows: &[Vec<f64>]) -> Vec<Option<f64>> {
        let Some(bulk) = &self.bulk else {
            return vec![None; rows.len()];
        };

        let estimates = match bulk.apply(rows) {
            Ok(estimates) => estimates,
            Err(err) => {
                warn!(%err, "Bulk sub-model failed to apply");
                return vec![None; rows.len()];
            }
        };

        let mut out: Vec<Option<f64>> = estimates.iter().map(|v| Some(*v)).collect();

        if let Some(lower_bound) = self.bounds.lower {
            let band: Vec<usize> = estimates
                .iter()
                .enumerate()
                .filter(|(_, est)| **est < lower_bound)
                .map(|(i, _)| i)
                .collect();
            self.apply_tail(&mut out, &band, self.lower.as_ref(), rows, "lower");
        }

        if let Some(upper_bound) = self.bounds.upper {
            let band: Vec<usize> = estimates
                .iter()
                .enumerate()
                .filter(|(_, est)| **est > upper_bound)
                .map(|(i, _)| i)
                .collect();
            self.apply_tail(&mut out, &band, self.upper.as_ref(), rows, "upper");
        }

        for value in &mut out {
            if value.is_some_and(|v| !v.is_finite()) {
                *value = None;
            }
        }

        out
    }

    /// Recomputes the rows in `band` with the given tail model, or marks
    /// them missing when no usable tail model exists on that side.
    fn apply_tail(
        &self,
        out: &mut [Option<f64>],
        band: &[usize],
        tail: Option<&SubModel>,
        rows: &[Vec<f64>],
        side: &str,
    ) {
        if band.is_empty() {
            return;
        }

        let Some(tail) = tail else {
            for &i in band {
                out[i] = None;
            }
            return;
        };

        let subset: Vec<Vec<f64>> = band.iter().map(|&i| rows[i].clone()).collect();
        match tail.apply(&subset) {
            Ok(values) => {
                for (&i, value) in band.iter().zip(values) {
                    out[i] = Some(value);
                }
            }
            Err(err) => {
                warn!(side, %err, "Tail sub-model failed; band left missing");
                for &i in band {
                    out[i] = None;
                }
            }
        }
    }

    /// Training-time assembly: derives the application bounds from the
    /// target distribution and fits polynomial tail models on the tail
    /// slices. The bulk sub-model is trained elsewhere and passed in.
    ///
    /// A bound percentile at the domain extreme (0 or 1) leaves that side
    /// unbounded with no tail model.
    pub fn train(
        features: Vec<Channel>,
        bulk: SubModel,
        targets: &[f64],
        rows: &[Vec<f64>],
        tail_degree: usize,
        percentiles: TrainPercentiles,
    ) -> Result<Self> {
        if targets.len() != rows.len() {
            return Err(Error::LeastSquares(format!(
                "target length {} does not match row count {}",
                targets.len(),
                rows.len()
            )));
        }

        let mut model = Self {
            features,
            bounds: Bounds::default(),
            bulk: Some(bulk),
            lower: None,
            upper: None,
        };

        if percentiles.lower_bound > 0.0 {
            model.bounds.lower = Some(percentile(targets, percentiles.lower_bound));
            let cut = percentile(targets, percentiles.lower_train);
            model.lower = fit_tail(targets, rows, tail_degree, |t| t <= cut)?;
        }

        if percentiles.upper_bound < 1.0 {
            model.bounds.upper = Some(percentile(targets, percentiles.upper_bound));
            let cut = percentile(targets, percentiles.upper_train);
            model.upper = fit_tail(targets, rows, tail_degree, |t| t >= cut)?;
        }

        Ok(model)
    }
}

fn fit_tail(
    targets: &[f64],
    rows: &[Vec<f64>],
    degree: usize,
    keep: impl Fn(f64) -> bool,
) -> Result<Option<SubModel>> {
    let mut tail_targets = Vec::new();
    let mut tail_rows = Vec::new();
    for (target, row) in targets.iter().zip(rows) {
        if keep(*target) {
            tail_targets.push(*target);
            tail_rows.push(row.clone());
        }
    }

    if tail_targets.is_empty() {
        warn!("Empty tail training slice; side left without a tail model");
        return Ok(None);
    }

    let fitted = PolynomialModel::fit(&tail_targets, &tail_rows, degree)?;
    Ok(Some(SubModel::Polynomial(fitted)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ensemble::{Tree, TreeNode};

    /// A forest whose single tree maps inputs below 2 to 1.0, between 2 and
    /// 6 to 5.0, and above 6 to 9.0 on feature 0.
    fn banded_ensemble() -> SubModel {
        SubModel::Ensemble(EnsembleModel {
            trees: vec![Tree {
                nodes: vec![
                    TreeNode::Split {
                        feature: 0,
                        threshold: 2.0,
                        left: 1,
                        right: 2,
                    },
                    TreeNode::Leaf { value: 1.0 },
                    TreeNode::Split {
                        feature: 0,
                        threshold: 6.0,
                        left: 3,
                        right: 4,
                    },
                    TreeNode::Leaf { value: 5.0 },
                    TreeNode::Leaf { value: 9.0 },
                ],
            }],
        })
    }

    fn constant_poly(value: f64) -> SubModel {
        SubModel::Polynomial(PolynomialModel {
            degree: Some(1),
            coefficients: vec![value, 0.0],
        })
    }

    #[test]
    fn test_band_routing() {
        // Ensemble estimates 1.0 / 5.0 / 9.0 route to the lower tail, the
        // ensemble itself, and the upper tail under bounds 2.0 / 8.0.
        let model = HybridModel {
            features: vec![Channel::Co],
            bounds: Bounds {
                lower: Some(2.0),
                upper: Some(8.0),
            },
            bulk: Some(banded_ensemble()),
            lower: Some(constant_poly(-100.0)),
            upper: Some(constant_poly(100.0)),
        };

        let out = model.apply(&[vec![1.0], vec![5.0], vec![9.0]]);
        assert_eq!(out, vec![Some(-100.0), Some(5.0), Some(100.0)]);
    }

    #[test]
    fn test_missing_tail_model_drops_band() {
        let model = HybridModel {
            features: vec![Channel::Co],
            bounds: Bounds {
                lower: Some(2.0),
                upper: Some(8.0),
            },
            bulk: Some(banded_ensemble()),
            lower: None,
            upper: None,
        };

        let out = model.apply(&[vec![1.0], vec![5.0], vec![9.0]]);
        assert_eq!(out, vec![None, Some(5.0), None]);
    }

    #[test]
    fn test_unbounded_sides_keep_bulk_estimate() {
        let model = HybridModel {
            features: vec![Channel::Co],
            bounds: Bounds::default(),
            bulk: Some(banded_ensemble()),
            lower: None,
            upper: None,
        };

        let out = model.apply(&[vec![1.0], vec![9.0]]);
        assert_eq!(out, vec![Some(1.0), Some(9.0)]);
    }

    #[test]
    fn test_no_bulk_model_means_all_missing() {
        let model = HybridModel {
            features: vec![Channel::Co],
            bounds: Bounds::default(),
            bulk: None,
            lower: None,
            upper: None,
        };
        assert_eq!(model.apply(&[vec![1.0], vec![2.0]]), vec![None, None]);
    }

    #[test]
    fn test_nan_input_becomes_missing() {
        let model = HybridModel {
            features: vec![Channel::Co],
            bounds: Bounds {
                lower: Some(2.0),
                upper: Some(8.0),
            },
            bulk: Some(banded_ensemble()),
            lower: Some(constant_poly(-100.0)),
            upper: Some(constant_poly(100.0)),
        };
        assert_eq!(model.apply(&[vec![f64::NAN]]), vec![None]);
    }

    #[test]
    fn test_broken_tail_polynomial_leaves_band_missing() {
        // One coefficient over one feature matches no degree, so the tail
        // fails to resolve and its band degrades to missing.
        let model = HybridModel {
            features: vec![Channel::Co],
            bounds: Bounds {
                lower: Some(2.0),
                upper: None,
            },
            bulk: Some(banded_ensemble()),
            lower: Some(SubModel::Polynomial(PolynomialModel {
                degree: None,
                coefficients: vec![4.2],
            })),
            upper: None,
        };

        let out = model.apply(&[vec![1.0], vec![5.0]]);
        assert_eq!(out, vec![None, Some(5.0)]);
    }

    #[test]
    fn test_train_derives_bounds_and_tails() {
        let targets: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let rows: Vec<Vec<f64>> = targets.iter().map(|t| vec![*t]).collect();

        let model = HybridModel::train(
            vec![Channel::Co],
            banded_ensemble(),
            &targets,
            &rows,
            1,
            TrainPercentiles::default(),
        )
        .unwrap();

        let lower = model.bounds.lower.unwrap();
        let upper = model.bounds.upper.unwrap();
        assert!((lower - 9.9).abs() < 1e-9);
        assert!((upper - 89.1).abs() < 1e-9);
        assert!(model.lower.is_some());
        assert!(model.upper.is_some());

        // Tail fits are identity-like on this synthetic data.
        if let Some(SubModel::Polynomial(poly)) = &model.lower {
            let out = poly.apply(&[vec![5.0]]).unwrap();
            assert!((out[0] - 5.0).abs() < 1e-6);
        } else {
            panic!("expected polynomial lower tail");
        }
    }

    #[test]
    fn test_train_extreme_percentile_is_unbounded() {
        let targets: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let rows: Vec<Vec<f64>> = targets.iter().map(|t| vec![*t]).collect();

        let model = HybridModel::train(
            vec![Channel::Co],
            banded_ensemble(),
            &targets,
            &rows,
            1,
            TrainPercentiles {
                lower_bound: 0.0,
                upper_bound: 1.0,
                lower_train: 0.2,
                upper_train: 0.8,
            },
        )
        .unwrap();

        assert_eq!(model.bounds, Bounds::default());
        assert!(model.lower.is_none());
        assert!(model.upper.is_none());
    }
}
