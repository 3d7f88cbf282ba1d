//! Supervised classifiers over segment feature vectors.

mod forest;
mod knn;
mod params;
mod svm;
mod tree;

use std::fmt;
use std::str::FromStr;

use geojson::JsonObject;
use serde::Serialize;

pub use forest::{ForestConfig, MaxFeatures, RandomForest};
pub use knn::{Knn, KnnConfig, Weights};
pub use svm::{Gamma, Kernel, Svc, SvcConfig};

use crate::error::{ObiaError, Result};
use params::Params;

/// A model trained on rows of `x` with class indexes `y` in `0..n_classes`.
pub trait Classifier: Send {
    fn fit(&mut self, x: &[Vec<f64>], y: &[usize], n_classes: usize) -> Result<()>;

    fn predict_one(&self, row: &[f64]) -> usize;

    fn predict(&self, x: &[Vec<f64>]) -> Vec<usize> {
        x.iter().map(|row| self.predict_one(row)).collect()
    }

    /// Held-out accuracy estimate, when the model produces one while fitting.
    fn accuracy_estimate(&self) -> Option<f64> {
        None
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }
}

/// Index of the first maximum.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ClassifierKind {
    RandomForest,
    Svc,
    Knn,
}

impl ClassifierKind {
    /// Build the classifier with its defaults overridden by `params`.
    pub fn build(self, params: &JsonObject) -> Result<Box<dyn Classifier>> {
        let p = Params::new(params);
        let model: Box<dyn Classifier> = match self {
            ClassifierKind::RandomForest => Box::new(RandomForest::new(ForestConfig::from_params(&p)?)),
            ClassifierKind::Svc => Box::new(Svc::new(SvcConfig::from_params(&p)?)),
            ClassifierKind::Knn => Box::new(Knn::new(KnnConfig::from_params(&p)?)),
        };
        p.warn_unused();
        Ok(model)
    }
}

impl FromStr for ClassifierKind {
    type Err = ObiaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "rf" | "randomforest" | "random_forest" | "random-forest" => Ok(ClassifierKind::RandomForest),
            "svm" | "svc" => Ok(ClassifierKind::Svc),
            "knn" | "k-nn" | "knearest" | "k-nearest" => Ok(ClassifierKind::Knn),
            other => Err(ObiaError::UnsupportedMethod(other.to_string())),
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClassifierKind::RandomForest => "Random Forest",
            ClassifierKind::Svc => "SVC",
            ClassifierKind::Knn => "KNN",
        })
    }
}
