//! Apply path for tree-ensemble regression sub-models.
//!
//! Training happens outside this crate; the artifact carries the fitted
//! forest as index-addressed node arrays, and prediction is the mean of the
//! per-tree outputs. Anything malformed (dangling child index, feature out
//! of range, NaN input) degrades to NaN so the hybrid layer can turn it
//! into a missing value instead of a panic.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single regression tree; node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    /// Walks the tree for one feature row. Rows go left when the feature
    /// value is at or below the threshold.
    pub fn predict(&self, row: &[f64]) -> f64 {
        let mut index = 0usize;

        // A well-formed tree terminates in at most nodes.len() hops; the
        // step cap keeps corrupt artifacts from looping forever.
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(index) {
                Some(TreeNode::Leaf { value }) => return *value,
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    let Some(value) = row.get(*feature) else {
                        return f64::NAN;
                    };
                    if value.is_nan() {
                        return f64::NAN;
                    }
                    index = if *value <= *threshold { *left } else { *right };
                }
                None => return f64::NAN,
            }
        }

        f64::NAN
    }
}

/// A forest of regression trees applied by output averaging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleModel {
    pub trees: Vec<Tree>,
}

impl EnsembleModel {
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return f64::NAN;
        }
        let sum: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        sum / self.trees.len() as f64
    }

    pub fn apply(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|row| self.predict_row(row)).collect()
    }
}
