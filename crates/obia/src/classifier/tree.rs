//! CART decision tree with Gini impurity over weighted samples.

use rand::seq::index::sample;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TreeOptions {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: usize,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf { proba: Vec<f64> },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

#[derive(Debug, Clone)]
pub(crate) struct DecisionTree {
    nodes: Vec<Node>,
}

struct Builder<'a, R> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    weights: &'a [f64],
    n_classes: usize,
    opts: TreeOptions,
    rng: &'a mut R,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

fn gini(counts: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / total).powi(2)).sum::<f64>()
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    /// Position in the sorted sample order where the right child starts.
    pos: usize,
    order: Vec<usize>,
    impurity_left: f64,
    impurity_right: f64,
    weight_left: f64,
}

impl<'a, R: Rng> Builder<'a, R> {
    fn class_counts(&self, samples: &[usize]) -> (Vec<f64>, f64) {
        let mut counts = vec![0.0; self.n_classes];
        for &s in samples {
            counts[self.y[s]] += self.weights[s];
        }
        let total = counts.iter().sum();
        (counts, total)
    }

    fn leaf(&mut self, counts: &[f64], total: f64) -> usize {
        let proba = counts.iter().map(|c| c / total).collect();
        self.nodes.push(Node::Leaf { proba });
        self.nodes.len() - 1
    }

    fn best_split(&mut self, samples: &[usize], parent_impurity: f64, total: f64) -> Option<BestSplit> {
        let n_features = self.x[0].len();
        let features = sample(&mut *self.rng, n_features, self.opts.max_features.clamp(1, n_features));
        let min_leaf = self.opts.min_samples_leaf.max(1);

        let mut best: Option<BestSplit> = None;
        let mut best_child_impurity = parent_impurity;

        for feature in features.iter() {
            let mut order = samples.to_vec();
            order.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));
            if self.x[order[0]][feature] == self.x[order[order.len() - 1]][feature] {
                continue;
            }

            let mut left = vec![0.0; self.n_classes];
            let (mut right, _) = self.class_counts(&order);
            let mut w_left = 0.0;
            for pos in 1..order.len() {
                let s = order[pos - 1];
                let w = self.weights[s];
                left[self.y[s]] += w;
                right[self.y[s]] -= w;
                w_left += w;

                let (v_prev, v_next) = (self.x[s][feature], self.x[order[pos]][feature]);
                if v_prev == v_next || pos < min_leaf || order.len() - pos < min_leaf {
                    continue;
                }
                let w_right = total - w_left;
                let (g_left, g_right) = (gini(&left, w_left), gini(&right, w_right));
                let child = (w_left * g_left + w_right * g_right) / total;
                if child < best_child_impurity - 1e-12 {
                    best_child_impurity = child;
                    let mut threshold = (v_prev + v_next) / 2.0;
                    if threshold == v_next {
                        threshold = v_prev;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        pos,
                        order: order.clone(),
                        impurity_left: g_left,
                        impurity_right: g_right,
                        weight_left: w_left,
                    });
                }
            }
        }
        best
    }

    fn grow(&mut self, samples: &[usize], depth: usize, total_weight: f64) -> usize {
        let (counts, total) = self.class_counts(samples);
        let impurity = gini(&counts, total);

        let depth_reached = self.opts.max_depth.is_some_and(|d| depth >= d);
        if impurity <= 0.0 || depth_reached || samples.len() < self.opts.min_samples_split.max(2) {
            return self.leaf(&counts, total);
        }

        let Some(split) = self.best_split(samples, impurity, total) else {
            return self.leaf(&counts, total);
        };

        let w_right = total - split.weight_left;
        self.importances[split.feature] += (total * impurity
            - split.weight_left * split.impurity_left
            - w_right * split.impurity_right)
            / total_weight;

        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { proba: Vec::new() });
        let (lo, hi) = split.order.split_at(split.pos);
        let left = self.grow(lo, depth + 1, total_weight);
        let right = self.grow(hi, depth + 1, total_weight);
        self.nodes[id] = Node::Split { feature: split.feature, threshold: split.threshold, left, right };
        id
    }
}

impl DecisionTree {
    /// Fit on rows with positive weight. Returns the tree and its
    /// unnormalised impurity decrease per feature.
    pub fn fit<R: Rng>(
        x: &[Vec<f64>],
        y: &[usize],
        weights: &[f64],
        n_classes: usize,
        opts: TreeOptions,
        rng: &mut R,
    ) -> (Self, Vec<f64>) {
        let samples: Vec<usize> = (0..x.len()).filter(|&i| weights[i] > 0.0).collect();
        let total_weight: f64 = samples.iter().map(|&i| weights[i]).sum();
        let mut b = Builder {
            x,
            y,
            weights,
            n_classes,
            opts,
            rng,
            nodes: Vec::new(),
            importances: vec![0.0; x.first().map_or(0, Vec::len)],
        };
        b.grow(&samples, 0, total_weight);
        (Self { nodes: b.nodes }, b.importances)
    }

    pub fn predict_proba(&self, row: &[f64]) -> &[f64] {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { proba } => return proba,
                Node::Split { feature, threshold, left, right } => {
                    id = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match &nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn opts(max_features: usize) -> TreeOptions {
        TreeOptions { max_depth: None, min_samples_split: 2, min_samples_leaf: 1, max_features }
    }

    #[test]
    fn separates_threshold() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let y: Vec<usize> = (0..10).map(|i| usize::from(i >= 5)).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let (tree, imp) = DecisionTree::fit(&x, &y, &[1.0; 10], 2, opts(1), &mut rng);

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict_proba(&[4.4]), &[1.0, 0.0]);
        assert_eq!(tree.predict_proba(&[4.6]), &[0.0, 1.0]);
        assert!((imp[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_weight_rows_are_ignored() {
        let x = vec![vec![0.0], vec![1.0], vec![2.0]];
        let y = vec![0, 1, 1];
        let mut rng = StdRng::seed_from_u64(1);
        let (tree, _) = DecisionTree::fit(&x, &y, &[0.0, 1.0, 2.0], 2, opts(1), &mut rng);
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.predict_proba(&[0.0]), &[0.0, 1.0]);
    }

    #[test]
    fn max_depth_limits_growth() {
        let x: Vec<Vec<f64>> = (0..8).map(|i| vec![i as f64]).collect();
        let y = vec![0, 1, 0, 1, 0, 1, 0, 1];
        let mut rng = StdRng::seed_from_u64(3);
        let o = TreeOptions { max_depth: Some(2), ..opts(1) };
        let (tree, _) = DecisionTree::fit(&x, &y, &[1.0; 8], 2, o, &mut rng);
        assert!(tree.depth() <= 2);
    }
}
