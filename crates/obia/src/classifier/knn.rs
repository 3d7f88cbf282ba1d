use super::params::Params;
use super::{argmax, Classifier};
use crate::error::{ObiaError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Weights {
    Uniform,
    /// Inverse distance; exact matches take the whole vote.
    Distance,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnnConfig {
    pub n_neighbors: usize,
    pub weights: Weights,
    /// Minkowski exponent.
    pub p: f64,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self { n_neighbors: 5, weights: Weights::Uniform, p: 2.0 }
    }
}

impl KnnConfig {
    pub(crate) fn from_params(params: &Params<'_>) -> Result<Self> {
        let d = Self::default();
        let weights = match params.str_or("weights", "uniform")? {
            "uniform" => Weights::Uniform,
            "distance" => Weights::Distance,
            other => return Err(ObiaError::InvalidInput(format!("unsupported KNN weights '{other}'"))),
        };
        let cfg = Self {
            n_neighbors: params.usize_or("n_neighbors", d.n_neighbors)?,
            weights,
            p: params.f64_or("p", d.p)?,
        };
        if cfg.n_neighbors == 0 {
            return Err(ObiaError::InvalidInput("parameter 'n_neighbors' must be at least 1".into()));
        }
        if cfg.p < 1.0 {
            return Err(ObiaError::InvalidInput("parameter 'p' must be at least 1".into()));
        }
        Ok(cfg)
    }
}

/// Brute-force k-nearest-neighbours vote.
#[derive(Debug, Clone)]
pub struct Knn {
    config: KnnConfig,
    x: Vec<Vec<f64>>,
    y: Vec<usize>,
    n_classes: usize,
}

impl Knn {
    pub fn new(config: KnnConfig) -> Self {
        Self { config, x: Vec::new(), y: Vec::new(), n_classes: 0 }
    }

    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        let p = self.config.p;
        if p == 2.0 {
            a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f64>().sqrt()
        } else if p == 1.0 {
            a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
        } else {
            a.iter().zip(b).map(|(x, y)| (x - y).abs().powf(p)).sum::<f64>().powf(1.0 / p)
        }
    }
}

impl Classifier for Knn {
    fn fit(&mut self, x: &[Vec<f64>], y: &[usize], n_classes: usize) -> Result<()> {
        if self.config.n_neighbors > x.len() {
            return Err(ObiaError::InvalidInput(format!(
                "n_neighbors = {} exceeds the {} training samples",
                self.config.n_neighbors,
                x.len()
            )));
        }
        self.x = x.to_vec();
        self.y = y.to_vec();
        self.n_classes = n_classes;
        Ok(())
    }

    fn predict_one(&self, row: &[f64]) -> usize {
        let mut dists: Vec<(f64, usize)> = self
            .x
            .iter()
            .enumerate()
            .map(|(i, t)| (self.distance(t, row), i))
            .collect();
        let k = self.config.n_neighbors.min(dists.len());
        dists.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let nearest = &dists[..k];

        let mut votes = vec![0.0; self.n_classes];
        match self.config.weights {
            Weights::Uniform => nearest.iter().for_each(|&(_, i)| votes[self.y[i]] += 1.0),
            Weights::Distance if nearest.iter().any(|&(d, _)| d == 0.0) => {
                nearest.iter().filter(|&&(d, _)| d == 0.0).for_each(|&(_, i)| votes[self.y[i]] += 1.0)
            }
            Weights::Distance => nearest.iter().for_each(|&(d, i)| votes[self.y[i]] += 1.0 / d),
        }
        argmax(&votes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn train() -> (Vec<Vec<f64>>, Vec<usize>) {
        (vec![vec![0.0], vec![1.0], vec![2.0], vec![10.0], vec![11.0]], vec![0, 0, 0, 1, 1])
    }

    #[test]
    fn majority_of_neighbours() {
        let (x, y) = train();
        let mut knn = Knn::new(KnnConfig { n_neighbors: 3, ..KnnConfig::default() });
        knn.fit(&x, &y, 2).unwrap();
        assert_eq!(knn.predict_one(&[9.0]), 1);
        assert_eq!(knn.predict_one(&[1.5]), 0);
    }

    #[test]
    fn distance_weights_favour_close_points() {
        let (x, y) = train();
        // 5 neighbours: three of class 0 far away, two of class 1 close
        let mut knn = Knn::new(KnnConfig { weights: Weights::Distance, ..KnnConfig::default() });
        knn.fit(&x, &y, 2).unwrap();
        assert_eq!(knn.predict_one(&[9.5]), 1);

        let mut uniform = Knn::new(KnnConfig::default());
        uniform.fit(&x, &y, 2).unwrap();
        assert_eq!(uniform.predict_one(&[9.5]), 0);
    }

    #[test]
    fn too_few_samples() {
        let mut knn = Knn::new(KnnConfig::default());
        assert!(knn.fit(&[vec![0.0]], &[0], 1).is_err());
    }

    #[test]
    fn tie_goes_to_lower_class() {
        let mut knn = Knn::new(KnnConfig { n_neighbors: 2, ..KnnConfig::default() });
        knn.fit(&[vec![0.0], vec![2.0]], &[1, 0], 2).unwrap();
        assert_eq!(knn.predict_one(&[1.0]), 0);
    }
}
