//! C-support vector classification: SMO solver with second-order working
//! set selection, one-vs-one voting for more than two classes.

use tracing::{debug, warn};

use super::params::Params;
use super::{argmax, Classifier};
use crate::error::{ObiaError, Result};

const TAU: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gamma {
    /// `1 / (n_features * X.var())`
    Scale,
    /// `1 / n_features`
    Auto,
    Value(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    Linear,
    Poly { degree: i32, coef0: f64 },
    Rbf,
    Sigmoid { coef0: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SvcConfig {
    pub kernel: Kernel,
    pub c: f64,
    pub gamma: Gamma,
    pub tol: f64,
    /// Solver iteration cap; `None` picks a bound from the sample count.
    pub max_iter: Option<usize>,
}

impl Default for SvcConfig {
    fn default() -> Self {
        Self { kernel: Kernel::Rbf, c: 1.0, gamma: Gamma::Scale, tol: 1e-3, max_iter: None }
    }
}

impl SvcConfig {
    pub(crate) fn from_params(p: &Params<'_>) -> Result<Self> {
        let d = Self::default();
        let degree = p.usize_or("degree", 3)? as i32;
        let coef0 = p.f64_or("coef0", 0.0)?;
        let kernel = match p.str_or("kernel", "rbf")? {
            "rbf" => Kernel::Rbf,
            "linear" => Kernel::Linear,
            "poly" => Kernel::Poly { degree, coef0 },
            "sigmoid" => Kernel::Sigmoid { coef0 },
            other => return Err(ObiaError::InvalidInput(format!("unsupported SVC kernel '{other}'"))),
        };
        let gamma = match p.value("gamma") {
            None => d.gamma,
            Some(v) => match (v.as_str(), v.as_f64()) {
                (Some("scale"), _) => Gamma::Scale,
                (Some("auto"), _) => Gamma::Auto,
                (None, Some(g)) if g >= 0.0 => Gamma::Value(g),
                _ => return Err(ObiaError::InvalidInput(format!("parameter 'gamma' must be scale, auto or a number, got {v}"))),
            },
        };
        let c = p.f64_or("C", d.c)?;
        if c <= 0.0 {
            return Err(ObiaError::InvalidInput("parameter 'C' must be positive".into()));
        }
        // probability calibration is not offered; predictions are unaffected
        if p.bool_or("probability", false)? {
            warn!("SVC probability estimates are not supported; ignoring");
        }
        let max_iter = match p.value("max_iter").and_then(|v| v.as_i64()) {
            Some(n) if n > 0 => Some(n as usize),
            _ => None,
        };
        Ok(Self { kernel, c, gamma, tol: p.f64_or("tol", d.tol)?, max_iter })
    }
}

#[derive(Debug, Clone)]
struct BinaryModel {
    /// Class index voted for by a positive decision value.
    positive: usize,
    negative: usize,
    /// Indexes into the support vector table and their `alpha * y`.
    support: Vec<(usize, f64)>,
    rho: f64,
}

#[derive(Debug, Clone)]
pub struct Svc {
    config: SvcConfig,
    gamma: f64,
    vectors: Vec<Vec<f64>>,
    models: Vec<BinaryModel>,
    n_classes: usize,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn resolve_gamma(gamma: Gamma, x: &[Vec<f64>]) -> f64 {
    let n_features = x.first().map_or(1, Vec::len).max(1) as f64;
    match gamma {
        Gamma::Value(g) => g,
        Gamma::Auto => 1.0 / n_features,
        Gamma::Scale => {
            let count = x.len() as f64 * n_features;
            let mean = x.iter().flatten().sum::<f64>() / count;
            let var = x.iter().flatten().map(|v| (v - mean).powi(2)).sum::<f64>() / count;
            if var > 0.0 {
                1.0 / (n_features * var)
            } else {
                1.0
            }
        }
    }
}

impl Svc {
    pub fn new(config: SvcConfig) -> Self {
        Self { config, gamma: 0.0, vectors: Vec::new(), models: Vec::new(), n_classes: 0 }
    }

    fn kernel(&self, a: &[f64], b: &[f64]) -> f64 {
        match self.config.kernel {
            Kernel::Linear => dot(a, b),
            Kernel::Poly { degree, coef0 } => (self.gamma * dot(a, b) + coef0).powi(degree),
            Kernel::Rbf => {
                let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
                (-self.gamma * d2).exp()
            }
            Kernel::Sigmoid { coef0 } => (self.gamma * dot(a, b) + coef0).tanh(),
        }
    }

    /// Dual solve for one class pair; returns `(alpha, rho)`.
    fn solve(&self, rows: &[&[f64]], y: &[f64]) -> (Vec<f64>, f64) {
        let l = rows.len();
        let c = self.config.c;
        let q: Vec<Vec<f64>> = (0..l)
            .map(|i| (0..l).map(|j| y[i] * y[j] * self.kernel(rows[i], rows[j])).collect())
            .collect();

        let mut alpha = vec![0.0; l];
        let mut grad = vec![-1.0; l];
        let upper = |a: f64| a >= c;
        let lower = |a: f64| a <= 0.0;
        let max_iter = self.config.max_iter.unwrap_or_else(|| (100 * l).max(10_000_000));

        let mut iter = 0;
        while iter < max_iter {
            // maximal violating pair, second order
            let mut gmax = f64::NEG_INFINITY;
            let mut i_sel = None;
            for t in 0..l {
                let v = if y[t] > 0.0 {
                    (!upper(alpha[t])).then(|| -grad[t])
                } else {
                    (!lower(alpha[t])).then(|| grad[t])
                };
                if let Some(v) = v {
                    if v >= gmax {
                        gmax = v;
                        i_sel = Some(t);
                    }
                }
            }
            let Some(i) = i_sel else { break };

            let mut gmax2 = f64::NEG_INFINITY;
            let mut j_sel = None;
            let mut obj_min = f64::INFINITY;
            for t in 0..l {
                let (eligible, g) = if y[t] > 0.0 {
                    (!lower(alpha[t]), grad[t])
                } else {
                    (!upper(alpha[t]), -grad[t])
                };
                if !eligible {
                    continue;
                }
                gmax2 = gmax2.max(g);
                let diff = gmax + g;
                if diff > 0.0 {
                    let quad = q[i][i] + q[t][t] - 2.0 * y[i] * y[t] * q[i][t];
                    let obj = -(diff * diff) / if quad > 0.0 { quad } else { TAU };
                    if obj <= obj_min {
                        obj_min = obj;
                        j_sel = Some(t);
                    }
                }
            }
            let Some(j) = j_sel else { break };
            if gmax + gmax2 < self.config.tol {
                break;
            }
            iter += 1;

            let (old_i, old_j) = (alpha[i], alpha[j]);
            if y[i] != y[j] {
                let quad = q[i][i] + q[j][j] + 2.0 * q[i][j];
                let delta = (-grad[i] - grad[j]) / if quad > 0.0 { quad } else { TAU };
                let diff = alpha[i] - alpha[j];
                alpha[i] += delta;
                alpha[j] += delta;
                if diff > 0.0 {
                    if alpha[j] < 0.0 {
                        alpha[j] = 0.0;
                        alpha[i] = diff;
                    }
                } else if alpha[i] < 0.0 {
                    alpha[i] = 0.0;
                    alpha[j] = -diff;
                }
                if diff > 0.0 {
                    if alpha[i] > c {
                        alpha[i] = c;
                        alpha[j] = c - diff;
                    }
                } else if alpha[j] > c {
                    alpha[j] = c;
                    alpha[i] = c + diff;
                }
            } else {
                let quad = q[i][i] + q[j][j] - 2.0 * q[i][j];
                let delta = (grad[i] - grad[j]) / if quad > 0.0 { quad } else { TAU };
                let sum = alpha[i] + alpha[j];
                alpha[i] -= delta;
                alpha[j] += delta;
                if sum > c {
                    if alpha[i] > c {
                        alpha[i] = c;
                        alpha[j] = sum - c;
                    }
                } else if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = sum;
                }
                if sum > c {
                    if alpha[j] > c {
                        alpha[j] = c;
                        alpha[i] = sum - c;
                    }
                } else if alpha[i] < 0.0 {
                    alpha[i] = 0.0;
                    alpha[j] = sum;
                }
            }

            let (di, dj) = (alpha[i] - old_i, alpha[j] - old_j);
            for k in 0..l {
                grad[k] += q[i][k] * di + q[j][k] * dj;
            }
        }
        if iter >= max_iter {
            warn!(max_iter, "SVC solver hit the iteration limit");
        }

        // offset from free variables, else midpoint of the feasible range
        let (mut ub, mut lb) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut free, mut sum_free) = (0usize, 0.0);
        for t in 0..l {
            let yg = y[t] * grad[t];
            if upper(alpha[t]) {
                if y[t] < 0.0 {
                    ub = ub.min(yg);
                } else {
                    lb = lb.max(yg);
                }
            } else if lower(alpha[t]) {
                if y[t] > 0.0 {
                    ub = ub.min(yg);
                } else {
                    lb = lb.max(yg);
                }
            } else {
                free += 1;
                sum_free += yg;
            }
        }
        let rho = if free > 0 { sum_free / free as f64 } else { (ub + lb) / 2.0 };
        (alpha, rho)
    }

    fn decision(&self, model: &BinaryModel, row: &[f64]) -> f64 {
        model
            .support
            .iter()
            .map(|&(sv, coef)| coef * self.kernel(&self.vectors[sv], row))
            .sum::<f64>()
            - model.rho
    }
}

impl Classifier for Svc {
    fn fit(&mut self, x: &[Vec<f64>], y: &[usize], n_classes: usize) -> Result<()> {
        if n_classes < 2 {
            return Err(ObiaError::InvalidInput(format!(
                "SVC needs samples from at least two classes, got {n_classes}"
            )));
        }
        self.gamma = resolve_gamma(self.config.gamma, x);
        self.n_classes = n_classes;
        self.vectors = x.to_vec();
        self.models.clear();

        for a in 0..n_classes {
            for b in (a + 1)..n_classes {
                let idx: Vec<usize> = (0..x.len()).filter(|&i| y[i] == a || y[i] == b).collect();
                let rows: Vec<&[f64]> = idx.iter().map(|&i| x[i].as_slice()).collect();
                let signs: Vec<f64> = idx.iter().map(|&i| if y[i] == a { 1.0 } else { -1.0 }).collect();
                let (alpha, rho) = self.solve(&rows, &signs);
                let support = idx
                    .iter()
                    .zip(alpha.iter().zip(&signs))
                    .filter(|(_, (&al, _))| al > 0.0)
                    .map(|(&i, (&al, &s))| (i, al * s))
                    .collect();
                self.models.push(BinaryModel { positive: a, negative: b, support, rho });
            }
        }

        debug!(
            pairs = self.models.len(),
            gamma = self.gamma,
            support_vectors = self.models.iter().map(|m| m.support.len()).sum::<usize>(),
            "svc fitted"
        );
        Ok(())
    }

    fn predict_one(&self, row: &[f64]) -> usize {
        let mut votes = vec![0.0; self.n_classes];
        for m in &self.models {
            if self.decision(m, row) > 0.0 {
                votes[m.positive] += 1.0;
            } else {
                votes[m.negative] += 1.0;
            }
        }
        argmax(&votes)
    }
}
