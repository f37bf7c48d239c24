//! Low-degree polynomial regression over a feature vector.
//!
//! The design matrix is built from every multiset combination (with
//! repetition) of the augmented feature indices taken `degree` at a time.
//! Augmenting with a leading constant-one column makes that single scheme
//! produce the intercept, every pure power, and every cross-term up to the
//! requested degree.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Upper bound of the degree search when a model omits its degree.
pub const MAX_DEGREE: usize = 6;

/// Tolerance handed to the SVD solver; singular values below it are treated
/// as zero, which is what keeps rank-deficient designs from aborting a fit.
const SVD_EPS: f64 = 1e-12;

/// An ordered coefficient vector (intercept included) plus its degree.
///
/// Artifacts written by current training runs persist the degree explicitly;
/// older ones omit it and rely on [`PolynomialModel::resolve_degree`]'s
/// combination-count search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolynomialModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degree: Option<u32>,
    pub coefficients: Vec<f64>,
}

impl PolynomialModel {
    /// Fits an ordinary-least-squares polynomial of `degree` to the data.
    ///
    /// Coefficients that come back non-finite (rank-deficient design) are
    /// set to zero rather than failing the fit.
    pub fn fit(targets: &[f64], rows: &[Vec<f64>], degree: usize) -> Result<Self> {
        if targets.len() != rows.len() {
            return Err(Error::LeastSquares(format!(
                "target length {} does not match row count {}",
                targets.len(),
                rows.len()
            )));
        }
        if rows.is_empty() {
            return Err(Error::LeastSquares("empty training set".to_string()));
        }

        let n_features = rows[0].len();
        let combos = index_combinations(n_features + 1, degree);

        let design = DMatrix::from_fn(rows.len(), combos.len(), |r, c| {
            combo_term(&combos[c], &rows[r])
        });
        let b = DVector::from_column_slice(targets);

        let solution = design
            .svd(true, true)
            .solve(&b, SVD_EPS)
            .map_err(|e| Error::LeastSquares(e.to_string()))?;

        let coefficients = solution
            .iter()
            .map(|c| if c.is_finite() { *c } else { 0.0 })
            .collect();

        Ok(Self {
            degree: Some(degree as u32),
            coefficients,
        })
    }

    /// Applies the model, producing one value per input row.
    ///
    /// Empty input rows produce an empty output; an empty coefficient vector
    /// produces NaN per row. Columns whose coefficient is exactly zero are
    /// skipped on both sides of the dot product.
    pub fn apply(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        if self.coefficients.is_empty() {
            return Ok(vec![f64::NAN; rows.len()]);
        }

        let n_aug = rows[0].len() + 1;
        let degree = self.resolve_degree(n_aug)?;
        let combos = index_combinations(n_aug, degree);

        let active: Vec<(f64, &Vec<usize>)> = self
            .coefficients
            .iter()
            .zip(&combos)
            .filter(|(c, _)| **c != 0.0)
            .map(|(c, combo)| (*c, combo))
            .collect();

        Ok(rows
            .iter()
            .map(|row| {
                active
                    .iter()
                    .map(|(c, combo)| c * combo_term(combo, row))
                    .sum()
            })
            .collect())
    }

    /// Returns the polynomial degree for a design over `n_aug` augmented
    /// features, inferring it from the coefficient count when not stored.
    ///
    /// Inference searches increasing degrees until the combination count
    /// matches. With zero input features every degree produces a single
    /// term, so a match there is ambiguous and reported as such instead of
    /// silently picking one.
    pub fn resolve_degree(&self, n_aug: usize) -> Result<usize> {
        let len = self.coefficients.len();
        let features = n_aug.saturating_sub(1);

        if let Some(degree) = self.degree {
            let degree = degree as usize;
            if combination_count(n_aug, degree) == len {
                return Ok(degree);
            }
            return Err(Error::UnresolvablePolynomialDegree {
                coefficients: len,
                features,
                max: degree,
            });
        }

        let matches: Vec<usize> = (1..=MAX_DEGREE)
            .filter(|d| combination_count(n_aug, *d) == len)
            .collect();

        match matches.len() {
            0 => Err(Error::UnresolvablePolynomialDegree {
                coefficients: len,
                features,
                max: MAX_DEGREE,
            }),
            1 => Ok(matches[0]),
            _ => Err(Error::AmbiguousPolynomialDegree {
                coefficients: len,
                features,
            }),
        }
    }
}

/// Evaluates one design-matrix column: the product of the augmented feature
/// values selected by `combo`, where augmented index 0 is the constant 1.
fn combo_term(combo: &[usize], row: &[f64]) -> f64 {
    combo
        .iter()
        .map(|&i| if i == 0 { 1.0 } else { row[i - 1] })
        .product()
}

/// Number of multiset combinations of `n` items taken `degree` at a time:
/// C(n + degree - 1, degree).
pub fn combination_count(n: usize, degree: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let mut count = 1usize;
    for i in 0..degree {
        count = count * (n + i) / (i + 1);
    }
    count
}

/// All non-decreasing index tuples of length `degree` over `0..n`, in
/// lexicographic order. Fit and apply must agree on this ordering.
pub fn index_combinations(n: usize, degree: usize) -> Vec<Vec<usize>> {
    let mut combos = Vec::with_capacity(combination_count(n, degree));
    if n == 0 {
        return combos;
    }

    let mut current = vec![0usize; degree];
    loop {
        combos.push(current.clone());

        // Advance the rightmost index that still has room, then reset the
        // tail to that same value to keep tuples non-decreasing.
        let mut pos = degree;
        while pos > 0 {
            if current[pos - 1] + 1 < n {
                let next = current[pos - 1] + 1;
                for slot in &mut current[pos - 1..] {
                    *slot = next;
                }
                break;
            }
            pos -= 1;
        }
        if pos == 0 {
            break;
        }
    }

    combos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combination_count() {
        // C(n + d - 1, d)
        assert_eq!(combination_count(2, 1), 2);
        assert_eq!(combination_count(2, 2), 3);
        assert_eq!(combination_count(3, 2), 6);
        assert_eq!(combination_count(4, 3), 20);
        assert_eq!(combination_count(1, 4), 1);
    }

    #[test]
    fn test_index_combinations_degree_two() {
        assert_eq!(
            index_combinations(3, 2),
            vec![
                vec![0, 0],
                vec![0, 1],
                vec![0, 2],
                vec![1, 1],
                vec![1, 2],
                vec![2, 2],
            ]
        );
    }

    #[test]
    fn test_fit_recovers_quadratic() {
        // y = 2 + 3x + x^2
        let xs: Vec<f64> = (0..12).map(|i| i as f64 * 0.5).collect();
        let rows: Vec<Vec<f64>> = xs.iter().map(|x| vec![*x]).collect();
        let targets: Vec<f64> = xs.iter().map(|x| 2.0 + 3.0 * x + x * x).collect();

        let model = PolynomialModel::fit(&targets, &rows, 2).unwrap();
        assert_eq!(model.coefficients.len(), 3);
        assert!((model.coefficients[0] - 2.0).abs() < 1e-6);
        assert!((model.coefficients[1] - 3.0).abs() < 1e-6);
        assert!((model.coefficients[2] - 1.0).abs() < 1e-6);

        let applied = model.apply(&[vec![2.0]]).unwrap();
        assert!((applied[0] - 12.0).abs() < 1e-6);
    }

    #[test]
    fn test_fit_cross_terms() {
        // y = 1 + 2ab over two features requires the cross-term column
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![(i % 5) as f64, (i / 5) as f64])
            .collect();
        let targets: Vec<f64> = rows.iter().map(|r| 1.0 + 2.0 * r[0] * r[1]).collect();

        let model = PolynomialModel::fit(&targets, &rows, 2).unwrap();
        let applied = model.apply(&[vec![3.0, 4.0]]).unwrap();
        assert!((applied[0] - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_apply_infers_degree_without_metadata() {
        // 3 coefficients over 1 feature only fits degree 2
        let model = PolynomialModel {
            degree: None,
            coefficients: vec![2.0, 3.0, 1.0],
        };
        let out = model.apply(&[vec![1.0]]).unwrap();
        assert!((out[0] - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_feature_inference_is_ambiguous() {
        // With zero features every degree yields exactly one term.
        let model = PolynomialModel {
            degree: None,
            coefficients: vec![5.0],
        };
        let err = model.apply(&[vec![], vec![]]).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::AmbiguousPolynomialDegree { .. }
        ));
    }

    #[test]
    fn test_unmatched_coefficient_count_errors() {
        // Over two features the term counts run 3, 6, 10, ...; 7 matches none.
        let model = PolynomialModel {
            degree: None,
            coefficients: vec![1.0; 7],
        };
        let err = model.apply(&[vec![1.0, 2.0]]).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::UnresolvablePolynomialDegree { .. }
        ));
    }

    #[test]
    fn test_explicit_degree_overrides_search() {
        let model = PolynomialModel {
            degree: Some(1),
            coefficients: vec![1.0, 2.0],
        };
        let out = model.apply(&[vec![4.0]]).unwrap();
        assert!((out[0] - 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_explicit_degree_with_wrong_count_errors() {
        let model = PolynomialModel {
            degree: Some(2),
            coefficients: vec![1.0, 2.0],
        };
        assert!(model.apply(&[vec![4.0]]).is_err());
    }

    #[test]
    fn test_empty_inputs() {
        let model = PolynomialModel {
            degree: Some(1),
            coefficients: vec![1.0, 2.0],
        };
        assert!(model.apply(&[]).unwrap().is_empty());

        let empty = PolynomialModel {
            degree: None,
            coefficients: vec![],
        };
        let out = empty.apply(&[vec![1.0], vec![2.0]]).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_zero_coefficients_are_pruned() {
        // [5, 0] over one feature at degree 1: the zeroed slope column is
        // dropped, leaving a constant model.
        let model = PolynomialModel {
            degree: Some(1),
            coefficients: vec![5.0, 0.0],
        };
        let out = model.apply(&[vec![100.0], vec![-3.0]]).unwrap();
        assert_eq!(out, vec![5.0, 5.0]);
    }
}
