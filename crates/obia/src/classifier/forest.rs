//! Random forest: bootstrapped CART trees with per-split feature sampling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use super::params::Params;
use super::tree::{DecisionTree, TreeOptions};
use super::{argmax, Classifier};
use crate::error::{ObiaError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
    Count(usize),
    Fraction(f64),
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            MaxFeatures::Sqrt => n.sqrt() as usize,
            MaxFeatures::Log2 => n.log2() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Count(c) => *c,
            MaxFeatures::Fraction(f) => (f * n) as usize,
        };
        k.clamp(1, n_features.max(1))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub oob_score: bool,
    pub random_state: Option<u64>,
    pub bootstrap: bool,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            oob_score: true,
            random_state: Some(42),
            bootstrap: true,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
        }
    }
}

impl ForestConfig {
    pub(crate) fn from_params(p: &Params<'_>) -> Result<Self> {
        let d = Self::default();
        let max_features = match p.value("max_features") {
            None if p.has_key("max_features") => MaxFeatures::All,
            None => d.max_features,
            Some(v) => match (v.as_str(), v.as_u64(), v.as_f64()) {
                (Some("sqrt" | "auto"), _, _) => MaxFeatures::Sqrt,
                (Some("log2"), _, _) => MaxFeatures::Log2,
                (_, Some(n), _) => MaxFeatures::Count(n as usize),
                (_, None, Some(f)) if f > 0.0 && f <= 1.0 => MaxFeatures::Fraction(f),
                _ => {
                    return Err(ObiaError::InvalidInput(format!(
                        "parameter 'max_features' must be sqrt, log2, an integer or a fraction, got {v}"
                    )))
                }
            },
        };
        let cfg = Self {
            n_estimators: p.usize_or("n_estimators", d.n_estimators)?,
            oob_score: p.bool_or("oob_score", d.oob_score)?,
            random_state: if p.has_key("random_state") { p.opt_u64("random_state")? } else { d.random_state },
            bootstrap: p.bool_or("bootstrap", d.bootstrap)?,
            max_depth: p.opt_usize("max_depth")?,
            min_samples_split: p.usize_or("min_samples_split", d.min_samples_split)?,
            min_samples_leaf: p.usize_or("min_samples_leaf", d.min_samples_leaf)?,
            max_features,
        };
        if cfg.n_estimators == 0 {
            return Err(ObiaError::InvalidInput("parameter 'n_estimators' must be at least 1".into()));
        }
        if cfg.oob_score && !cfg.bootstrap {
            return Err(ObiaError::InvalidInput("out-of-bag estimation requires bootstrap".into()));
        }
        Ok(cfg)
    }
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<DecisionTree>,
    n_classes: usize,
    importances: Vec<f64>,
    oob: Option<f64>,
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self { config, trees: Vec::new(), n_classes: 0, importances: Vec::new(), oob: None }
    }

    fn proba(&self, row: &[f64]) -> Vec<f64> {
        let mut acc = vec![0.0; self.n_classes];
        for t in &self.trees {
            for (a, p) in acc.iter_mut().zip(t.predict_proba(row)) {
                *a += p;
            }
        }
        acc
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: &[Vec<f64>], y: &[usize], n_classes: usize) -> Result<()> {
        let n = x.len();
        let n_features = x.first().map_or(0, Vec::len);
        let mut rng = match self.config.random_state {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let opts = TreeOptions {
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split,
            min_samples_leaf: self.config.min_samples_leaf,
            max_features: self.config.max_features.resolve(n_features),
        };

        self.n_classes = n_classes;
        self.trees.clear();
        let mut importances = vec![0.0; n_features];
        let mut oob_votes = vec![vec![0.0; n_classes]; n];

        for _ in 0..self.config.n_estimators {
            let weights: Vec<f64> = if self.config.bootstrap {
                let mut w = vec![0.0; n];
                for _ in 0..n {
                    w[rng.gen_range(0..n)] += 1.0;
                }
                w
            } else {
                vec![1.0; n]
            };

            let (tree, tree_imp) = DecisionTree::fit(x, y, &weights, n_classes, opts, &mut rng);
            let sum: f64 = tree_imp.iter().sum();
            if sum > 0.0 {
                for (acc, v) in importances.iter_mut().zip(&tree_imp) {
                    *acc += v / sum;
                }
            }
            if self.config.oob_score {
                for (i, votes) in oob_votes.iter_mut().enumerate().filter(|(i, _)| weights[*i] == 0.0) {
                    for (v, p) in votes.iter_mut().zip(tree.predict_proba(&x[i])) {
                        *v += p;
                    }
                }
            }
            self.trees.push(tree);
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        self.importances = importances;

        self.oob = if self.config.oob_score {
            let scored: Vec<bool> = oob_votes
                .iter()
                .zip(y)
                .filter(|(votes, _)| votes.iter().any(|&v| v > 0.0))
                .map(|(votes, &label)| argmax(votes) == label)
                .collect();
            if scored.is_empty() {
                warn!("no out-of-bag samples; too few trees for a reliable score");
                None
            } else {
                Some(scored.iter().filter(|&&ok| ok).count() as f64 / scored.len() as f64)
            }
        } else {
            None
        };

        debug!(
            trees = self.trees.len(),
            deepest = self.trees.iter().map(DecisionTree::depth).max().unwrap_or(0),
            oob = ?self.oob,
            "random forest fitted"
        );
        Ok(())
    }

    fn predict_one(&self, row: &[f64]) -> usize {
        argmax(&self.proba(row))
    }

    fn accuracy_estimate(&self) -> Option<f64> {
        self.oob
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        Some(self.importances.clone())
    }
}
