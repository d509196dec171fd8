//! Random Forest Evaluator
//!
//! The trained forest ships as a JSON document. Every tree is a flat node list
//! in pre-order: node 0 is the root and children always sit after their
//! parent. Leaves hold the probability of the legitimate class; the forest
//! averages them and calls a row legitimate above 0.5.

use serde::{Deserialize, Serialize};

use crate::features::{FeatureRow, FEATURE_COUNT, FEATURE_LAYOUT};
use super::{Classifier, Label};

/// Mean leaf probability above which a row is legitimate
pub const DECISION_THRESHOLD: f64 = 0.5;

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// A tree node: either a split or a leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    /// Go left when `x[feature] <= threshold`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

/// Complete forest as stored in the bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestModel {
    /// Feature names the forest was trained on, if the exporter recorded them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<String>>,
    pub trees: Vec<Tree>,
}

// ============================================================================
// STRUCTURE CHECKS
// ============================================================================

impl ForestModel {
    /// Reject forests that would index out of bounds or never reach a leaf
    pub fn check(&self) -> Result<(), String> {
        if let Some(features) = &self.features {
            if features.len() != FEATURE_COUNT
                || features.iter().zip(FEATURE_LAYOUT).any(|(a, b)| a != b)
            {
                return Err("feature layout does not match the 30 expected URL features".to_string());
            }
        }

        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }

        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(format!("tree {} has no nodes", t));
            }

            for (i, node) in tree.nodes.iter().enumerate() {
                match *node {
                    Node::Split { feature, left, right, threshold } => {
                        if feature >= FEATURE_COUNT {
                            return Err(format!("tree {} node {}: feature index {} out of range", t, i, feature));
                        }
                        if !threshold.is_finite() {
                            return Err(format!("tree {} node {}: threshold is not finite", t, i));
                        }
                        for child in [left, right] {
                            if child <= i || child >= tree.nodes.len() {
                                return Err(format!("tree {} node {}: invalid child index {}", t, i, child));
                            }
                        }
                    }
                    Node::Leaf { value } => {
                        if !(0.0..=1.0).contains(&value) {
                            return Err(format!("tree {} node {}: leaf value {} outside [0, 1]", t, i, value));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Mean legitimate-class probability across all trees
    pub fn probability(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        let sum: f64 = self.trees.iter().map(|tree| eval_tree(tree, features)).sum();
        sum / self.trees.len() as f64
    }

    pub fn classify(&self, row: &FeatureRow) -> Label {
        if self.probability(&row.to_array()) > DECISION_THRESHOLD {
            Label::Legitimate
        } else {
            Label::Phishing
        }
    }
}

impl Classifier for ForestModel {
    fn predict(&self, rows: &[FeatureRow]) -> Vec<Label> {
        rows.iter().map(|row| self.classify(row)).collect()
    }
}

/// Walk one tree down to its leaf. Assumes `ForestModel::check` passed.
fn eval_tree(tree: &Tree, features: &[f64; FEATURE_COUNT]) -> f64 {
    let mut idx = 0usize;
    loop {
        match tree.nodes[idx] {
            Node::Leaf { value } => return value,
            Node::Split { feature, threshold, left, right } => {
                idx = if features[feature] <= threshold { left } else { right };
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn stump(feature: usize) -> ForestModel {
    // x[feature] <= 0 -> phishing, otherwise legitimate
    ForestModel {
        features: None,
        trees: vec![Tree {
            nodes: vec![
                Node::Split { feature, threshold: 0.0, left: 1, right: 2 },
                Node::Leaf { value: 0.0 },
                Node::Leaf { value: 1.0 },
            ],
        }],
    }
}
