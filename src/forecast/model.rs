//! Scaler and regressor backends
//!
//! The predictor only ever talks to the two narrow traits below. Concrete
//! backends are deserialized from the artifact file; tests substitute fakes.

use serde::{Deserialize, Serialize};

use crate::forecast::PredictionError;

/// Pre-fitted transform applied to raw features before inference
pub trait FeatureScaler: Send + Sync {
    fn transform(&self, features: &[f64]) -> Result<Vec<f64>, PredictionError>;
}

/// Pre-trained model mapping scaled features to a single value
pub trait Regressor: Send + Sync {
    fn predict(&self, features: &[f64]) -> Result<f64, PredictionError>;
}

fn check_width(expected: usize, got: usize) -> Result<(), PredictionError> {
    if expected != got {
        return Err(PredictionError::FeatureCount { expected, got });
    }
    Ok(())
}

/// Scalers that can be stored in an artifact file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalerSpec {
    /// `(x - mean) / scale`
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    /// `x * scale + min`
    MinMax { min: Vec<f64>, scale: Vec<f64> },
}

impl FeatureScaler for ScalerSpec {
    fn transform(&self, features: &[f64]) -> Result<Vec<f64>, PredictionError> {
        match self {
            ScalerSpec::Standard { mean, scale } => {
                check_width(mean.len(), features.len())?;
                check_width(scale.len(), features.len())?;
                Ok(features
                    .iter()
                    .zip(mean.iter().zip(scale))
                    .map(|(x, (m, s))| {
                        // constant columns are stored with a zero scale
                        let s = if *s == 0.0 { 1.0 } else { *s };
                        (x - m) / s
                    })
                    .collect())
            }
            ScalerSpec::MinMax { min, scale } => {
                check_width(min.len(), features.len())?;
                check_width(scale.len(), features.len())?;
                Ok(features
                    .iter()
                    .zip(min.iter().zip(scale))
                    .map(|(x, (m, s))| x * s + m)
                    .collect())
            }
        }
    }
}

/// Single node of a regression tree. Root is index 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Leaf {
        leaf: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Walk from the root to a leaf. `x <= threshold` goes left.
    fn evaluate(&self, tree: usize, features: &[f64]) -> Result<f64, PredictionError> {
        let mut index = 0;
        // a well-formed tree reaches a leaf in fewer steps than it has nodes
        for _ in 0..=self.nodes.len() {
            let node = self
                .nodes
                .get(index)
                .ok_or(PredictionError::NodeIndex { tree, node: index })?;

            match node {
                TreeNode::Leaf { leaf } => return Ok(*leaf),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = features.get(*feature).ok_or(PredictionError::FeatureIndex {
                        feature: *feature,
                        len: features.len(),
                    })?;
                    index = if value <= threshold { *left } else { *right };
                }
            }
        }

        Err(PredictionError::UnterminatedTree { tree })
    }
}

/// Regressors that can be stored in an artifact file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegressorSpec {
    Linear {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    /// Additive ensemble of regression trees (gradient boosting)
    TreeEnsemble {
        #[serde(default)]
        base_score: f64,
        trees: Vec<RegressionTree>,
    },
}

impl Regressor for RegressorSpec {
    fn predict(&self, features: &[f64]) -> Result<f64, PredictionError> {
        match self {
            RegressorSpec::Linear {
                coefficients,
                intercept,
            } => {
                check_width(coefficients.len(), features.len())?;
                Ok(features
                    .iter()
                    .zip(coefficients)
                    .map(|(f, c)| f * c)
                    .sum::<f64>()
                    + intercept)
            }
            RegressorSpec::TreeEnsemble { base_score, trees } => {
                let mut total = *base_score;
                for (i, tree) in trees.iter().enumerate() {
                    total += tree.evaluate(i, features)?;
                }
                Ok(total)
            }
        }
    }
}
